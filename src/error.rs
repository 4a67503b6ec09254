use thiserror::Error;

/// Errors surfaced by fallible world operations.
///
/// Solver-internal numeric failures are never reported here; they are
/// absorbed into [`crate::world::StepStats`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum WorldError {
    /// A mutating call was made while the world is mid-step. The call
    /// had no effect.
    #[error("world is locked: entities cannot be created or destroyed during a step")]
    Locked,

    /// A definition or parameter was outside its allowed range.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A creation call would exceed one of the configured entity maxima.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(&'static str),
}
