//! Error types for ETL runs.
//!
//! Everything here is fatal to the strategy invocation that hit it, except
//! [`EtlError::LockHeld`], which makes a driver abort before doing any work.
//! Absent objects are not errors at this level: the coordinator and the
//! partition store turn `NotFound` into empty ledgers and absent partitions.

use thiserror::Error;

/// Result type alias for ETL operations.
pub type Result<T> = std::result::Result<T, EtlError>;

/// Errors that can occur during ETL runs.
#[derive(Debug, Error)]
pub enum EtlError {
    /// Another run holds the run lock (or a crashed run left it behind).
    #[error("run lock is held by {}", .holder.as_deref().unwrap_or("an unknown holder"))]
    LockHeld {
        /// Holder ID recorded in the lock sentinel, if readable.
        holder: Option<String>,
    },

    /// A source file could not be decoded.
    #[error("decode error: {message}")]
    Decode {
        /// Description of the decode failure.
        message: String,
    },

    /// Columnar encoding or decoding failed.
    #[error("columnar codec error: {message}")]
    Codec {
        /// Description of the codec failure.
        message: String,
    },

    /// An object store operation failed.
    #[error(transparent)]
    Storage(#[from] strata_core::Error),

    /// The configuration is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the configuration problem.
        message: String,
    },
}

impl EtlError {
    /// Creates a decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates a columnar codec error.
    #[must_use]
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Prefixes decode and codec messages with the object they came from.
    #[must_use]
    pub fn in_object(self, path: &str) -> Self {
        match self {
            Self::Decode { message } => Self::Decode {
                message: format!("{path}: {message}"),
            },
            Self::Codec { message } => Self::Codec {
                message: format!("{path}: {message}"),
            },
            other => other,
        }
    }

    /// Returns true if this error reports an absent object.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_not_found())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_held_message_names_holder() {
        let err = EtlError::LockHeld {
            holder: Some("01HOLDER".into()),
        };
        assert_eq!(err.to_string(), "run lock is held by 01HOLDER");

        let err = EtlError::LockHeld { holder: None };
        assert_eq!(err.to_string(), "run lock is held by an unknown holder");
    }

    #[test]
    fn in_object_prefixes_decode_errors_only() {
        let err = EtlError::decode("bad gzip header").in_object("src/a.gz");
        assert_eq!(err.to_string(), "decode error: src/a.gz: bad gzip header");

        let err = EtlError::from(strata_core::Error::NotFound("x".into())).in_object("src/a.gz");
        assert!(err.is_not_found());
    }
}
