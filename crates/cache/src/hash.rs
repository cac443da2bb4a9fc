//! Content identity digests.
//!
//! Every cache key and every placeholder identity is a BLAKE3 digest over
//! `(kind, content, visual configuration)`. Fields are length-prefixed and
//! optional fields are tagged, so no two distinct inputs share an encoding.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Visual settings that change how an artifact looks without changing the
/// source content (a diagram rendered in a different font is a different
/// image).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualConfig {
    pub font_family: Option<String>,
    pub font_size: Option<f32>,
}
impl VisualConfig {
    pub fn new(font_family: impl Into<String>, font_size: f32) -> Self {
        Self {
            font_family: Some(font_family.into()),
            font_size: Some(font_size),
        }
    }
}

fn update_field(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn update_optional(hasher: &mut blake3::Hasher, bytes: Option<&[u8]>) {
    match bytes {
        Some(bytes) => {
            hasher.update(&[1]);
            update_field(hasher, bytes);
        },
        None => {
            hasher.update(&[0]);
        },
    }
}

/// Deterministic, collision-resistant identity of a rendering input.
///
/// Returns the lowercase hex encoding of a BLAKE3 hash (64 characters).
/// Changing `kind`, `content`, or any present field of `visual` changes the
/// result.
pub fn digest(kind: &str, content: &str, visual: Option<&VisualConfig>) -> String {
    let mut hasher = blake3::Hasher::new();
    update_field(&mut hasher, kind.as_bytes());
    update_field(&mut hasher, content.as_bytes());
    match visual {
        Some(visual) => {
            hasher.update(&[1]);
            update_optional(&mut hasher, visual.font_family.as_deref().map(str::as_bytes));
            let size = visual.font_size.map(|s| s.to_bits().to_le_bytes());
            update_optional(&mut hasher, size.as_ref().map(|b| b.as_slice()));
        },
        None => {
            hasher.update(&[0]);
        },
    }
    hasher.finalize().to_hex().to_string()
}

/// Compact JSON with object keys sorted at every depth.
///
/// Doesn't rely on `serde_json`'s map ordering, which flips to insertion
/// order when any crate in the build enables `preserve_order`.
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Serializing a plain string cannot fail.
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        },
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        },
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Identity of a task payload, independent of visual configuration.
pub fn source_hash(kind: &str, payload: &Value) -> String {
    digest(kind, &canonicalize(payload), None)
}
