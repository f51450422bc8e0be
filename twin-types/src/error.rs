//! Error types for device twin operations.

use thiserror::Error;

/// Errors that can occur while validating, merging, or ingesting a twin.
///
/// Every variant is a synchronous rejection: the operation that produced it
/// made no change to the document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TwinError {
    /// JSON syntax error, wrong container type, or conflicting top-level shape.
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    /// A key failed the lexical rules.
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey {
        /// The offending key.
        key: String,
        /// Which rule it broke.
        reason: &'static str,
    },

    /// A value is not null, boolean, number, string, or a nested tree.
    #[error("invalid value type for key {key:?}: {found}")]
    InvalidValueType {
        /// Key holding the value.
        key: String,
        /// JSON type that was found.
        found: &'static str,
    },

    /// Nested trees go deeper than the active limit.
    #[error("key {key:?} exceeds maximum nesting depth of {limit}")]
    DepthExceeded {
        /// Key whose value crossed the limit.
        key: String,
        /// The active depth limit.
        limit: usize,
    },

    /// A tag operation was attempted on a document without tags enabled.
    #[error("{0} not enabled")]
    FeatureNotEnabled(&'static str),

    /// The status was changed without a reason.
    #[error("status change requires a reason")]
    MissingReasonOnStatusChange,
}

impl From<serde_json::Error> for TwinError {
    fn from(err: serde_json::Error) -> Self {
        TwinError::MalformedDocument(err.to_string())
    }
}
