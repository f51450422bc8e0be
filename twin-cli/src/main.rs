//! # twin-cli
//!
//! CLI tool for inspecting and patching device twin documents offline.
//!
//! ## Commands
//!
//! - `show`: Print a twin body in canonical form
//! - `merge`: Apply desired/reported/tags patches and print the patch body
//! - `validate`: Check a property tree against the key and depth rules
//! - `status`: Run a status transition
//!
//! ## Example
//!
//! ```bash
//! # Normalize a body returned by the service
//! twin-cli show twin.json
//!
//! # Preview the patch for a desired change
//! twin-cli merge twin.json --desired fan.json
//!
//! # Disable a device
//! twin-cli status twin.json --set disabled --reason "maintenance"
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use twin_core::DeviceStatus;

mod commands;
mod config;

use commands::{merge, show, status, validate};
use config::Config;

/// CLI tool for inspecting and patching device twin documents.
#[derive(Parser, Debug)]
#[command(name = "twin-cli")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: twin.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a twin document in canonical form
    Show {
        /// Twin document (full or properties-only body)
        document: PathBuf,
    },

    /// Apply property patches and print the resulting patch body
    Merge {
        /// Base twin document
        document: PathBuf,

        /// Desired properties patch
        #[arg(long)]
        desired: Option<PathBuf>,

        /// Reported properties patch
        #[arg(long)]
        reported: Option<PathBuf>,

        /// Tags patch (requires tags_enabled)
        #[arg(long)]
        tags: Option<PathBuf>,
    },

    /// Check a property tree against the key and depth rules
    Validate {
        /// JSON object to check
        file: PathBuf,

        /// Use whole-document limits (depth 6, `$` allowed)
        #[arg(long)]
        document: bool,
    },

    /// Change the device status
    Status {
        /// Twin document
        document: PathBuf,

        /// New status: enabled, disabled or unspecified
        #[arg(long = "set")]
        set: DeviceStatus,

        /// Reason for the change (required when the status changes)
        #[arg(long)]
        reason: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    init_logging(&config.logging.level);

    let options = config.twin;
    let mut out = std::io::stdout().lock();

    match cli.command {
        Commands::Show { document } => {
            show::run(&document, options, &mut out)?;
        }
        Commands::Merge {
            document,
            desired,
            reported,
            tags,
        } => {
            let patches = merge::Patches {
                desired: desired.as_deref(),
                reported: reported.as_deref(),
                tags: tags.as_deref(),
            };
            if patches.desired.is_none() && patches.reported.is_none() && patches.tags.is_none() {
                anyhow::bail!("Must specify at least one of --desired, --reported or --tags");
            }
            merge::run(&document, options, patches, &mut out)?;
        }
        Commands::Validate { file, document } => {
            validate::run(&file, document, &mut out)?;
        }
        Commands::Status {
            document,
            set,
            reason,
        } => {
            status::run(&document, options, set, reason.as_deref(), &mut out)?;
        }
    }

    Ok(())
}

/// Log to stderr, filtered by `RUST_LOG` or else the configured level.
fn init_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
