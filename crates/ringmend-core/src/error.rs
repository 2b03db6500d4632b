//! Error taxonomy shared by every layer.

use std::fmt;

/// The four failure classes a repair run distinguishes.
///
/// Each crate keeps its own error enum; `ErrorClass` is what callers
/// branch on when deciding whether to retry, continue, or abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Timeouts and connection failures. Retried by the channel.
    Transport,
    /// Non-2xx responses and payloads that do not match the API contract.
    Protocol,
    /// Operator or environment mistakes. Fatal before any work starts.
    Configuration,
    /// A run-level circuit breaker tripped. Fatal.
    Policy,
}

impl ErrorClass {
    /// Whether an error of this class must stop the whole run.
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorClass::Configuration | ErrorClass::Policy)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorClass::Transport => "transport",
            ErrorClass::Protocol => "protocol",
            ErrorClass::Configuration => "configuration",
            ErrorClass::Policy => "policy",
        };
        f.write_str(name)
    }
}

/// Implemented by every crate-level error so callers can ask for its class.
pub trait Classify {
    fn class(&self) -> ErrorClass;
}
