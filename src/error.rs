//! Error types for the cachesim library.
//!
//! ## Key Components
//!
//! - [`InvariantError`]: Returned when internal data-structure invariants are
//!   violated (`check_invariants` methods on lists, stores and policies).
//! - [`ConfigError`]: Returned when a policy cannot be built from its name and
//!   parameter string (unknown key, malformed number, missing oracle data).
//!
//! Configuration problems are load-time failures. The library reports them as
//! values and leaves process termination to the front-end; the `print`
//! parameter surfaces as [`ConfigError::PrintRequested`] so the caller can dump
//! the effective parameters and exit cleanly.
//!
//! ## Example Usage
//!
//! ```
//! use cachesim::builder::CacheBuilder;
//! use cachesim::error::ConfigError;
//!
//! let err = CacheBuilder::new(100).build("clock", Some("bogus=1")).unwrap_err();
//! assert!(matches!(err, ConfigError::UnknownParam { .. }));
//! assert!(err.to_string().contains("bogus"));
//! ```

use std::fmt;

use thiserror::Error;

// ---------------------------------------------------------------------------
// InvariantError
// ---------------------------------------------------------------------------

/// Error returned when internal cache invariants are violated.
///
/// Produced by `check_invariants` methods (e.g.
/// [`IntrusiveList::check_invariants`](crate::ds::IntrusiveList::check_invariants)).
/// Carries a human-readable description of which invariant failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantError(String);

impl InvariantError {
    /// Creates a new `InvariantError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InvariantError {}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when a policy cannot be constructed.
///
/// Every variant names the policy it came from so a driver comparing many
/// policies can report which one failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// The parameter key is not understood by this policy.
    #[error("{policy} does not have parameter {key}, example parameters {example}")]
    UnknownParam {
        policy: &'static str,
        key: String,
        example: String,
    },

    /// The value could not be parsed as the number the key expects.
    #[error("{policy}: cannot parse value \"{value}\" for parameter {key}")]
    MalformedValue {
        policy: &'static str,
        key: String,
        value: String,
    },

    /// The policy needs `next_access_vtime` on every request.
    #[error("{policy} requires a trace with next-access (oracle) information")]
    OracleRequired { policy: &'static str },

    /// No policy is registered under this name.
    #[error("unknown eviction algorithm {0}")]
    UnknownPolicy(String),

    /// The reserved `print` key was given; `params` holds the effective
    /// parameter string.
    #[error("current parameters: {params}")]
    PrintRequested { policy: &'static str, params: String },

    /// The parameters parse but describe an unusable configuration.
    #[error("{policy}: {reason}")]
    Invalid { policy: &'static str, reason: String },
}

impl ConfigError {
    /// Builds an [`ConfigError::Invalid`] error.
    #[inline]
    pub fn invalid(policy: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            policy,
            reason: reason.into(),
        }
    }

    /// Returns the policy name the error refers to, if any.
    pub fn policy(&self) -> Option<&'static str> {
        match self {
            Self::UnknownParam { policy, .. }
            | Self::MalformedValue { policy, .. }
            | Self::OracleRequired { policy }
            | Self::PrintRequested { policy, .. }
            | Self::Invalid { policy, .. } => Some(policy),
            Self::UnknownPolicy(_) => None,
        }
    }

    /// Returns `true` for the `print` escape hatch, which a front-end
    /// treats as a successful early exit rather than a failure.
    #[inline]
    pub fn is_print_request(&self) -> bool {
        matches!(self, Self::PrintRequested { .. })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
