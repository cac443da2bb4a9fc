//! Layered configuration for folio.
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults.
//! 2. A configuration file: either the one passed explicitly, or
//!    `config.toml`, `config.yaml` and `config.json` in the platform
//!    configuration directory (whichever exist, later ones winning).
//! 3. `FOLIO_` environment variables, with `__` separating nested keys
//!    (`FOLIO_CACHE__MEMORY_CAPACITY=250`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
pub use folio_cache::CacheConfig;
pub use folio_pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "FOLIO_";
const DATABASE_FILE: &str = "render-cache.sqlite";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub pipeline: PipelineConfig,
    /// Location of the durable cache tier. Defaults to
    /// `render-cache.sqlite` in the platform cache directory.
    pub database: Option<PathBuf>,
}

impl Config {
    /// Load configuration from every source, using `file` instead of the
    /// platform configuration directory when given.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let figment = match file {
            Some(path) => Self::figment_with_file(path)?,
            None => Self::figment_with_defaults_dir(),
        };
        Self::extract(figment)
    }

    fn base() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
    }

    fn figment_with_file(path: &Path) -> Result<Figment> {
        if !path.is_file() {
            exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
        }
        let figment = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::base().merge(Toml::file_exact(path)),
            Some("yaml" | "yml") => Self::base().merge(Yaml::file_exact(path)),
            Some("json") => Self::base().merge(Json::file_exact(path)),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
        };
        tracing::debug!(path = %path.display(), "Loading configuration file");
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    fn figment_with_defaults_dir() -> Figment {
        let figment = match project_dirs() {
            Some(dirs) => {
                let dir = dirs.config_dir();
                tracing::debug!(dir = %dir.display(), "Looking for configuration files");
                Self::base()
                    .merge(Toml::file_exact(dir.join("config.toml")))
                    .merge(Yaml::file_exact(dir.join("config.yaml")))
                    .merge(Json::file_exact(dir.join("config.json")))
            },
            None => {
                tracing::warn!("No platform configuration directory; using defaults and environment only");
                Self::base()
            },
        };
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract().or_raise(|| ErrorKind::Invalid)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.cache.validate().or_raise(|| ErrorKind::Invalid)
    }

    /// Where the durable cache tier lives.
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.database {
            return Ok(path.clone());
        }
        let dirs = project_dirs().ok_or_raise(|| ErrorKind::NoProjectDirs)?;
        Ok(dirs.cache_dir().join(DATABASE_FILE))
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "folio", "folio")
}
