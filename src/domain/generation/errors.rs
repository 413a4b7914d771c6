//! Generation Context - Errors

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("prompt is empty")]
    Empty,

    #[error("prompt is {chars} characters long, maximum is {max}")]
    TooLong { chars: usize, max: usize },

    #[error("duration must be between {min} and {max} seconds, got {secs}")]
    DurationOutOfRange { secs: u32, min: u32, max: u32 },
}
