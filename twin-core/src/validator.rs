//! Structural and lexical checks for property trees.
//!
//! Validation always runs over the complete input before anything is
//! mutated, so a rejected update leaves the document exactly as it was.
//!
//! Depth counts nested trees below the root: with a limit of 5 the root may
//! hold a tree, which may hold a tree, and so on five times, and the fifth
//! nested tree may only hold leaves.
//!
//! Keys are not limited to ASCII. Any Unicode text passes, and
//! [`MAX_KEY_LEN`] counts characters rather than bytes.

use twin_types::{PropertyTree, TwinError, TwinValue};

/// Maximum key length in characters.
pub const MAX_KEY_LEN: usize = 128;

/// Validation limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of nested tree levels below the root.
    pub max_depth: usize,
    /// Whether keys may contain `$`.
    pub allow_dollar: bool,
}

impl Limits {
    /// Limits for direct mutation calls.
    pub const API: Limits = Limits {
        max_depth: 5,
        allow_dollar: false,
    };

    /// Limits for bodies returned by the service, counted from the body
    /// root. Allows `$` for service-reflected keys.
    pub const DOCUMENT: Limits = Limits {
        max_depth: 6,
        allow_dollar: true,
    };
}

/// Validate every key and nesting level of `tree`.
///
/// # Errors
///
/// Returns the first [`TwinError::InvalidKey`] or
/// [`TwinError::DepthExceeded`] found.
pub fn validate(tree: &PropertyTree, limits: Limits) -> Result<(), TwinError> {
    validate_level(tree, 1, limits)
}

fn validate_level(tree: &PropertyTree, level: usize, limits: Limits) -> Result<(), TwinError> {
    for (key, value) in tree {
        validate_key(key, limits.allow_dollar)?;
        if let TwinValue::Tree(child) = value {
            if level > limits.max_depth {
                return Err(TwinError::DepthExceeded {
                    key: key.clone(),
                    limit: limits.max_depth,
                });
            }
            validate_level(child, level + 1, limits)?;
        }
    }
    Ok(())
}

/// Check a single key against the lexical rules.
pub fn validate_key(key: &str, allow_dollar: bool) -> Result<(), TwinError> {
    let reason = if key.is_empty() {
        "empty"
    } else if key.chars().count() > MAX_KEY_LEN {
        "longer than 128 characters"
    } else if key.contains('.') {
        "contains '.'"
    } else if key.contains(' ') {
        "contains a space"
    } else if !allow_dollar && key.contains('$') {
        "contains '$'"
    } else {
        return Ok(());
    };

    Err(TwinError::InvalidKey {
        key: key.to_string(),
        reason,
    })
}
