//! Key Conversion Utilities
//!
//! Exporters sometimes nest the module prefix (`model.model.model.0.conv.weight`
//! for `model.0.conv.weight`). These helpers normalize keys and look records up
//! the way the device loader does.

use crate::container::{Container, TensorRecord};

/// Collapses a repeated leading `prefix` to a single occurrence.
///
/// `normalize_key("model.model.model.0.conv.weight", "model.")` is
/// `"model.0.conv.weight"`. Keys without the repetition are returned as-is.
#[must_use]
pub fn normalize_key(key: &str, prefix: &str) -> String {
    if prefix.is_empty() {
        return key.to_string();
    }
    let mut rest = key;
    let mut seen = 0;
    while let Some(stripped) = rest.strip_prefix(prefix) {
        rest = stripped;
        seen += 1;
    }
    if seen == 0 {
        key.to_string()
    } else {
        format!("{prefix}{rest}")
    }
}

/// Finds `key`, falling back to the doubled-prefix form.
///
/// A miss on `model.3.conv.weight` retries `model.model.3.conv.weight`.
#[must_use]
pub fn find_record<'a>(container: &'a Container, key: &str, prefix: &str) -> Option<&'a TensorRecord> {
    if let Some(record) = container.get(key) {
        return Some(record);
    }
    if !prefix.is_empty() && key.starts_with(prefix) {
        return container.get(&format!("{prefix}{key}"));
    }
    None
}

/// Key of the bias paired with a weight (`x.conv.weight` -> `x.conv.bias`).
#[must_use]
pub fn paired_bias_key(weight_key: &str, weight_suffix: &str) -> Option<String> {
    let stem = weight_key.strip_suffix(weight_suffix)?;
    let dot = if weight_suffix.starts_with('.') { "." } else { "" };
    Some(format!("{stem}{dot}bias"))
}

// =============================================================================
// Tests
// =============================================================================
