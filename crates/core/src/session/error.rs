use thiserror::Error;

use crate::surface::SurfaceError;

/// Errors that can occur during session operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session failed to reach the ready state
    #[error("Session failed to reach ready state: {0}")]
    Launch(String),

    /// Command was submitted but never accepted by the entry surface
    #[error("Command was not accepted: {0}")]
    Send(String),

    /// No matching reply appeared before the hard deadline
    #[error("No reply from target before deadline")]
    NoReply,

    /// Underlying surface failure
    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceError),
}

/// Result type alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;
