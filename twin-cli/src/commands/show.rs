//! Print a twin document in canonical form.

use anyhow::Result;
use std::io::Write;
use std::path::Path;
use twin_core::TwinOptions;

use super::load_document;

/// Run the show command.
pub fn run(path: &Path, options: TwinOptions, out: &mut impl Write) -> Result<()> {
    let doc = load_document(path, options)?;
    writeln!(out, "{}", serde_json::to_string_pretty(&doc.to_value())?)?;
    Ok(())
}
