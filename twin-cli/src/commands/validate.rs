//! Check a property tree against the key and depth rules.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use twin_core::{validate, Limits};

use super::read_tree;

/// Run the validate command. `document` selects whole-document limits.
pub fn run(path: &Path, document: bool, out: &mut impl Write) -> Result<()> {
    let limits = if document {
        Limits::DOCUMENT
    } else {
        Limits::API
    };
    let tree = read_tree(path)?;
    validate(&tree, limits).with_context(|| format!("{} failed validation", path.display()))?;

    writeln!(
        out,
        "ok: {} keys at top level (max depth {})",
        tree.len(),
        limits.max_depth
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fixtures;

    #[test]
    fn valid_tree_passes() {
        let file = fixtures::file(r#"{"fan":{"speed":2},"mode":"eco"}"#);
        let mut out = Vec::new();
        run(file.path(), false, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().starts_with("ok: 2 keys"));
    }

    #[test]
    fn dollar_key_needs_document_mode() {
        let file = fixtures::file(r#"{"$version":3}"#);
        assert!(run(file.path(), false, &mut Vec::new()).is_err());
        assert!(run(file.path(), true, &mut Vec::new()).is_ok());
    }

    #[test]
    fn arrays_are_rejected() {
        let file = fixtures::file(r#"{"list":[1,2]}"#);
        let err = run(file.path(), true, &mut Vec::new()).unwrap_err();
        assert!(format!("{err:#}").contains("array"));
    }
}
