//! Run a status transition against a twin document.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use twin_core::{DeviceStatus, DeviceUpdate, TwinOptions};

use super::{load_document, pretty};

/// Run the status command.
pub fn run(
    path: &Path,
    options: TwinOptions,
    status: DeviceStatus,
    reason: Option<&str>,
    out: &mut impl Write,
) -> Result<()> {
    let mut doc = load_document(path, options)?;

    let changed = doc
        .update_device_manager(DeviceUpdate::status(status, reason))
        .with_context(|| format!("cannot set status to {status}"))?;

    match changed {
        Some(body) => writeln!(out, "{}", pretty(&body))?,
        None => writeln!(out, "no change")?,
    }
    Ok(())
}
