//! Error kinds shared by the screen generator, the session loop and the renderer.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Degenerate screen parameters (zero distance, no subdivisions, NaN input).
    #[error("invalid screen geometry: {0}")]
    InvalidGeometry(String),

    /// Tracking session, camera or graphics device could not be opened.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Tracking session was invalidated while running.
    #[error("tracking session lost")]
    SessionLost,

    #[error("frame submission failed: {0}")]
    SubmissionFailure(#[from] SubmitError),

    #[error("graphics error: {0}")]
    Graphics(String),

    #[error("config error: {0}")]
    Config(String),
}

/// Rejection reported by the display compositor for one submitted frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The headset went away; the session can be recreated later.
    #[error("display lost")]
    DisplayLost,

    #[error("frame rejected: {0}")]
    Rejected(String),
}

impl SubmitError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SubmitError::DisplayLost)
    }
}
