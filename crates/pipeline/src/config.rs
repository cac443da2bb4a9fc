use folio_cache::VisualConfig;
use serde::{Deserialize, Serialize};

/// Behaviour of an [`AsyncTaskManager`](crate::AsyncTaskManager).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Label shown in front of the message of an inline error marker.
    pub error_label: String,
    /// Visual settings folded into every cache key.
    pub visual: Option<VisualConfig>,
}
impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            error_label: "Rendering failed:".to_string(),
            visual: None,
        }
    }
}
