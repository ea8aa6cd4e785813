//! Error types for the quickpromise core

use crate::runtime::Value;
use std::rc::Rc;
use thiserror::Error;

/// Main error type for quickpromise
#[derive(Error, Debug)]
pub enum Error {
    /// A value that had to be invoked (an executor, a handler) is not callable
    #[error("TypeMismatch: {0}")]
    TypeMismatch(String),

    /// Unwrapping a value led back to a promise or thenable already being followed
    #[error("ResolutionCycleError: chaining cycle detected through object #{object_id}")]
    ResolutionCycle {
        /// Identity of the promise or thenable that was revisited
        object_id: u64,
    },

    /// A user-supplied value raised by an executor, handler or thenable
    #[error("Uncaught {0}")]
    Thrown(Value),
}

/// Failure to load an [`EventLoopConfig`](crate::EventLoopConfig).
///
/// Kept apart from [`Error`], which carries `Rc`-backed values and so is
/// neither `Send` nor `Sync`.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration could not be parsed
    #[error("ConfigError: {0}")]
    Parse(#[from] serde_json::Error),

    /// IO error
    #[error("IOError: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    /// Create a TypeMismatch error
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Error::TypeMismatch(message.into())
    }

    /// Wrap an arbitrary value as a thrown error
    pub fn thrown(value: impl Into<Value>) -> Self {
        Error::Thrown(value.into())
    }

    /// Check if this is a TypeMismatch
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, Error::TypeMismatch(_))
    }

    /// Check if this is a ResolutionCycleError
    pub fn is_resolution_cycle(&self) -> bool {
        matches!(self, Error::ResolutionCycle { .. })
    }

    /// Convert the error into the value a promise is rejected with.
    ///
    /// A thrown value is handed back unchanged; errors synthesized by the core
    /// become [`Value::Error`].
    pub fn into_reason(self) -> Value {
        match self {
            Error::Thrown(value) => value,
            other => Value::Error(Rc::new(other)),
        }
    }
}

/// Result type alias for quickpromise
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thrown_reason_is_unwrapped() {
        let reason = Error::thrown(5).into_reason();
        assert_eq!(reason, Value::Number(5.0));
    }

    #[test]
    fn test_core_error_becomes_error_value() {
        let reason = Error::ResolutionCycle { object_id: 7 }.into_reason();
        match reason {
            Value::Error(err) => assert!(err.is_resolution_cycle()),
            other => panic!("Expected error value, got {:?}", other),
        }
    }

    #[test]
    fn test_config_error_is_thread_safe() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<ConfigError>();

        let err: anyhow::Error = ConfigError::from(serde_json::from_str::<u8>("x").unwrap_err()).into();
        assert!(err.to_string().starts_with("ConfigError: "));
    }

    #[test]
    fn test_error_display() {
        let err = Error::type_mismatch("executor is not a function");
        assert_eq!(err.to_string(), "TypeMismatch: executor is not a function");

        let err = Error::thrown("boom");
        assert_eq!(err.to_string(), "Uncaught boom");
    }
}
