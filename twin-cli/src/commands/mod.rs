//! CLI command implementations.

use anyhow::{Context, Result};
use std::path::Path;
use twin_core::{PropertyTree, TwinDocument, TwinOptions};

pub mod merge;
pub mod show;
pub mod status;
pub mod validate;

/// Read a twin body from `path` into a fresh document.
pub fn load_document(path: &Path, options: TwinOptions) -> Result<TwinDocument> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read document {}", path.display()))?;
    let mut doc = TwinDocument::with_options(options);
    doc.ingest(&text)
        .with_context(|| format!("invalid twin document {}", path.display()))?;
    Ok(doc)
}

/// Read a JSON object from `path` as a property tree.
pub fn read_tree(path: &Path) -> Result<PropertyTree> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    PropertyTree::from_json_str(&text)
        .with_context(|| format!("invalid property tree in {}", path.display()))
}

/// Pretty-print a JSON text, falling back to the text itself.
pub fn pretty(json: &str) -> String {
    serde_json::from_str::<serde_json::Value>(json)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| json.to_string())
}
