// Domain error taxonomy for session, join and draw operations.

use thiserror::Error;

/// Minimum number of participants a session needs before it can be drawn.
pub const MIN_PARTICIPANTS: usize = 3;

/// Errors surfaced by the session core.
///
/// Every variant except [`SantaError::Storage`] is an expected outcome of
/// user input and is rendered back to the user as a message. Storage errors
/// are logged by the caller and reported as a generic failure.
#[derive(Debug, Error)]
pub enum SantaError {
    #[error("no game found with that code")]
    SessionNotFound,

    #[error("the draw for this game has already taken place")]
    AlreadyDrawn,

    #[error("you have already joined this game")]
    DuplicateParticipant,

    #[error("invalid {field}: {message}")]
    InvalidInput { field: &'static str, message: String },

    #[error(
        "at least {min} participants are needed for the draw, this game has {count}",
        min = MIN_PARTICIPANTS
    )]
    InsufficientParticipants { count: usize },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl SantaError {
    /// Whether this error is caused by user input or game state rather than
    /// by the storage layer.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SantaError::Storage(_))
    }
}

pub type Result<T, E = SantaError> = std::result::Result<T, E>;
