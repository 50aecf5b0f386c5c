// Errors - Player error taxonomy

use std::fmt;

/// What the caller tried to do while the transport was locked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockedAction {
    LoadNotes,
    LoadFile,
    Play,
}

impl fmt::Display for LockedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockedAction::LoadNotes => write!(f, "change notes"),
            LockedAction::LoadFile => write!(f, "change file"),
            LockedAction::Play => write!(f, "play"),
        }
    }
}

/// Player-related errors
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("Tried to {0} while locked")]
    Locked(LockedAction),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to decode audio: {0}")]
    Decode(String),

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("RON serialization error: {0}")]
    RonWrite(#[from] ron::Error),
}

impl PlayerError {
    /// True for the `Locked` family, whatever the action
    pub fn is_locked(&self) -> bool {
        matches!(self, PlayerError::Locked(_))
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
