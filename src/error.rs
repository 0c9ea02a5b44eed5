use std::fmt;

use thiserror::Error;

/// The closed set of failure kinds a sandbox execution can produce.
///
/// Every failure anywhere in compile or run collapses into exactly one of
/// these at the driver boundary. The variant names render in the error
/// string the caller sees (`"<kind> <message>"`), so they are part of the
/// output contract and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Script text rejected by the restricted grammar, before any execution.
    RestrictionViolation,
    /// Module import rejected by the allowlist.
    ImportNotAllowed,
    /// A mediated operation was invoked on an unsupported target,
    /// with a bad arity, or with an unrecognized operator token.
    CapabilityInvocation,
    /// Column type string outside the supported enumeration.
    ColumnType,
    /// A downstream host service (query lookup, data-source run) failed.
    HostService,
    /// Any other failure raised while running the script body.
    UncaughtRuntime,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::RestrictionViolation => "RestrictionViolation",
            ErrorKind::ImportNotAllowed => "ImportNotAllowed",
            ErrorKind::CapabilityInvocation => "CapabilityInvocationError",
            ErrorKind::ColumnType => "ColumnTypeError",
            ErrorKind::HostService => "HostServiceError",
            ErrorKind::UncaughtRuntime => "UncaughtRuntimeError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sandbox failure: one kind, one message.
///
/// Messages are embedded verbatim, including host-service error text.
/// This is a deliberate debuggability trade-off; all rendering goes through
/// this single Display impl so a redaction pass has one choke point.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} {message}")]
pub struct SandboxError {
    pub kind: ErrorKind,
    pub message: String,
}

impl SandboxError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Compile-time grammar rejection, with a source location.
    pub fn restriction(line: usize, col: usize, reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::RestrictionViolation,
            format!("line {line}:{col}: {reason}"),
        )
    }

    pub fn import_not_allowed(module: &str) -> Self {
        Self::new(
            ErrorKind::ImportNotAllowed,
            format!("'{module}' is not configured as a supported import module"),
        )
    }

    pub fn capability(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CapabilityInvocation, message)
    }

    pub fn column_type(type_str: &str) -> Self {
        Self::new(
            ErrorKind::ColumnType,
            format!("'{type_str}' is not a supported column type"),
        )
    }

    pub fn host(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::HostService, message)
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UncaughtRuntime, message)
    }
}
