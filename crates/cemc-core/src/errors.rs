//! Structured error types shared across CEMC crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`CemcError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (input paths, indices, sizes, etc.).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for the CEMC engine.
///
/// Families follow the propagation policy: `Config` aborts before any
/// run starts, `Consistency` and `Numeric` abort the current run, `Io`
/// covers results persistence, and `Cancelled` is the cooperative stop
/// observed at sample boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum CemcError {
    /// Malformed input documents (unknown key, missing field, bad shape).
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// Prim/supercell/occupation/conditions mismatches detected at run time.
    #[error("consistency error: {0}")]
    Consistency(ErrorInfo),
    /// Non-finite energies, negative rates, NaN samples.
    #[error("numeric error: {0}")]
    Numeric(ErrorInfo),
    /// Results persistence failures.
    #[error("io error: {0}")]
    Io(ErrorInfo),
    /// Cooperative cancellation, observed at sample boundaries.
    #[error("cancelled: {0}")]
    Cancelled(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl CemcError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            CemcError::Config(info)
            | CemcError::Consistency(info)
            | CemcError::Numeric(info)
            | CemcError::Io(info)
            | CemcError::Cancelled(info) => info,
        }
    }

    /// Returns true for the cooperative cancellation condition, which a
    /// sweep treats as a normal stop rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CemcError::Cancelled(_))
    }
}

/// Shorthand for an `Io` error wrapping a `std::io::Error` with a path.
pub fn io_error(code: &str, err: std::io::Error, path: impl Display) -> CemcError {
    CemcError::Io(
        ErrorInfo::new(code, err.to_string()).with_context("path", path.to_string()),
    )
}
