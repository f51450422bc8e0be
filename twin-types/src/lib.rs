//! # twin-types
//!
//! Value model and error types for device twin documents.
//!
//! This crate provides the foundational types used across the devtwin crates:
//! - [`PropertyTree`], [`TwinValue`] - Nested property bags and their values
//! - [`DeviceStatus`], [`ConnectionState`] - Device identity enums
//! - [`TwinError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod status;
mod value;

pub use error::TwinError;
pub use status::{ConnectionState, DeviceStatus};
pub use value::{json_type_name, PropertyTree, TwinValue};
