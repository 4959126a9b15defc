use thiserror::Error;

use crate::simvar::Unit;

/// Failures raised by the viewer core.
///
/// `ElementNotFound` is a mount-time defect and aborts attaching. Everything
/// else is a frame-level error that the safe-call wrapper logs and swallows.
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("#{0} not found")]
    ElementNotFound(String),

    #[error("sim variable {name:?} has not been published")]
    UnknownVariable { name: String },

    #[error("sim variable {name:?} cannot be read as {unit}")]
    UnitMismatch { name: String, unit: Unit },

    #[error("viewer is not attached")]
    NotAttached,

    #[error("{0}")]
    Handler(String),
}

pub type Result<T, E = ViewerError> = std::result::Result<T, E>;
