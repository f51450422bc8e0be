//! # twin-core
//!
//! Pure logic for device twin documents (no I/O, instant tests).
//!
//! A twin pairs the properties a backend wants a device to have (desired)
//! with the properties the device says it has (reported), plus optional
//! tags and a small identity/status record. This crate implements merging,
//! diffing, validation and document ingestion without any network or disk
//! access; transports hand it text and ship the text it produces.
//!
//! ## Modules
//!
//! - [`store`] - one property bag and its merge/diff algorithm
//! - [`validator`] - key and nesting rules
//! - [`metadata`] - optional per-leaf timestamps
//! - [`notifier`] - single-slot change callbacks
//! - [`manager`] - identity and status state machine
//! - [`document`] - the composed [`TwinDocument`] and JSON ingestion
//! - [`clock`] - injectable time source

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod document;
pub mod manager;
pub mod metadata;
pub mod notifier;
pub mod store;
pub mod validator;

pub use clock::{epoch_clock, format_timestamp, system_clock, Clock};
pub use document::{TwinDocument, TwinOptions};
pub use manager::{DeviceManager, DeviceRecord, DeviceUpdate};
pub use metadata::MetadataNode;
pub use notifier::{Bag, ChangeHandler, ChangeNotifier, ChangeSlot};
pub use store::PropertyStore;
pub use validator::{validate, validate_key, Limits};

pub use twin_types::{ConnectionState, DeviceStatus, PropertyTree, TwinError, TwinValue};
