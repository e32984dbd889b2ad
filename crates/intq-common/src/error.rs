//! Error and status model for primitive creation and execution.
//!
//! Every fallible operation in the workspace returns [`Result`]. The
//! [`Status`] enum mirrors the coarse status codes expected by FFI-style
//! callers; [`IntqError`] carries the structured detail.

use thiserror::Error;

/// Errors reported by primitive creation, planning, and execution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntqError {
    /// The requested descriptor/attribute combination is not supported by
    /// this implementation. Creation aborts; no partial primitive exists.
    #[error("unimplemented: {what}")]
    Unimplemented { what: String },

    /// A caller-supplied argument or buffer does not match the validated
    /// configuration.
    #[error("invalid arguments: {reason}")]
    InvalidArguments { reason: String },

    /// A scratchpad or temporary allocation could not be satisfied.
    #[error("out of memory: allocation of {requested} bytes failed")]
    OutOfMemory { requested: usize },

    /// A creation-time build step or an execution-time collaborator failed.
    #[error("runtime error: {reason}")]
    Runtime { reason: String },
}

impl IntqError {
    /// Reject a descriptor at validation time.
    pub fn unimplemented(what: impl Into<String>) -> Self {
        IntqError::Unimplemented { what: what.into() }
    }

    /// Reject malformed call arguments.
    pub fn invalid_args(reason: impl Into<String>) -> Self {
        IntqError::InvalidArguments { reason: reason.into() }
    }

    /// Report a failed build step or collaborator failure.
    pub fn runtime(reason: impl Into<String>) -> Self {
        IntqError::Runtime { reason: reason.into() }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, IntqError>;

// ---------------------------------------------------------------------------
// Status codes
// ---------------------------------------------------------------------------

/// Coarse status code for every creation/validation/execution operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    Unimplemented,
    InvalidArguments,
    OutOfMemory,
    RuntimeError,
}

impl Status {
    /// Collapse a `Result` into its status code.
    pub fn of<T>(result: &Result<T>) -> Status {
        match result {
            Ok(_) => Status::Success,
            Err(e) => e.status(),
        }
    }
}

impl IntqError {
    /// The status code this error maps to.
    pub fn status(&self) -> Status {
        match self {
            IntqError::Unimplemented { .. } => Status::Unimplemented,
            IntqError::InvalidArguments { .. } => Status::InvalidArguments,
            IntqError::OutOfMemory { .. } => Status::OutOfMemory,
            IntqError::Runtime { .. } => Status::RuntimeError,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Success => write!(f, "success"),
            Status::Unimplemented => write!(f, "unimplemented"),
            Status::InvalidArguments => write!(f, "invalid_arguments"),
            Status::OutOfMemory => write!(f, "out_of_memory"),
            Status::RuntimeError => write!(f, "runtime_error"),
        }
    }
}
