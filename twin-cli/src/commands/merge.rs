//! Apply property patches to a twin document and print the patch body.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use twin_core::TwinOptions;

use super::{load_document, pretty, read_tree};

/// Patch files to apply, one per bag.
#[derive(Debug, Default, Clone, Copy)]
pub struct Patches<'a> {
    /// Desired properties patch.
    pub desired: Option<&'a Path>,
    /// Reported properties patch.
    pub reported: Option<&'a Path>,
    /// Tags patch.
    pub tags: Option<&'a Path>,
}

/// Run the merge command.
pub fn run(
    path: &Path,
    options: TwinOptions,
    patches: Patches<'_>,
    out: &mut impl Write,
) -> Result<()> {
    let mut doc = load_document(path, options)?;

    let desired = patches.desired.map(read_tree).transpose()?;
    let reported = patches.reported.map(read_tree).transpose()?;
    let tags = patches.tags.map(read_tree).transpose()?;

    let patch = doc
        .update_twin(desired.as_ref(), reported.as_ref(), tags.as_ref())
        .context("patch rejected")?;

    match patch {
        Some(body) => {
            tracing::info!(document = %path.display(), "twin changed");
            writeln!(out, "{}", pretty(&body))?;
        }
        None => writeln!(out, "no change")?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fixtures;
    use serde_json::{json, Value};

    const BASE: &str = r#"{"deviceId":"d1","properties":{"desired":{"a":1},"reported":{}}}"#;

    fn output(out: Vec<u8>) -> String {
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn prints_patch_body() {
        let base = fixtures::file(BASE);
        let desired = fixtures::file(r#"{"a":2,"b":true}"#);
        let mut out = Vec::new();

        run(
            base.path(),
            TwinOptions::default(),
            Patches {
                desired: Some(desired.path()),
                ..Patches::default()
            },
            &mut out,
        )
        .unwrap();

        let value: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["deviceId"], json!("d1"));
        assert_eq!(value["properties"]["desired"], json!({"a": 2, "b": true}));
        assert_eq!(value["properties"]["reported"], json!({}));
    }

    #[test]
    fn identical_patch_is_no_change() {
        let base = fixtures::file(BASE);
        let desired = fixtures::file(r#"{"a":1}"#);
        let mut out = Vec::new();

        run(
            base.path(),
            TwinOptions::default(),
            Patches {
                desired: Some(desired.path()),
                ..Patches::default()
            },
            &mut out,
        )
        .unwrap();

        assert_eq!(output(out).trim(), "no change");
    }

    #[test]
    fn tags_need_config() {
        let base = fixtures::file(BASE);
        let tags = fixtures::file(r#"{"site":"north"}"#);
        let patches = Patches {
            tags: Some(tags.path()),
            ..Patches::default()
        };

        let err = run(base.path(), TwinOptions::default(), patches, &mut Vec::new()).unwrap_err();
        assert!(format!("{err:#}").contains("tags"));

        let enabled = TwinOptions {
            tags_enabled: true,
            ..TwinOptions::default()
        };
        let mut out = Vec::new();
        run(base.path(), enabled, patches, &mut out).unwrap();
        let value: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["tags"], json!({"site": "north"}));
    }

    #[test]
    fn invalid_patch_key_is_rejected() {
        let base = fixtures::file(BASE);
        let reported = fixtures::file(r#"{"bad.key":1}"#);
        let result = run(
            base.path(),
            TwinOptions::default(),
            Patches {
                reported: Some(reported.path()),
                ..Patches::default()
            },
            &mut Vec::new(),
        );
        assert!(result.is_err());
    }
}
