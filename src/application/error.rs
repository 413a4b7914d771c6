//! 应用层错误定义
//!
//! 生成会话的统一错误分类。瞬时类错误在会话内部按预算重试，
//! 其余错误直接以 `Failed` 终态暴露给调用方。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{BufferError, PromptError};

/// 生成会话错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ComposerError {
    #[error("Invalid prompt: {0}")]
    InvalidPrompt(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Quota exceeded: {0}")]
    Quota(String),

    #[error("Transient service error: {0}")]
    TransientService(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Stream desync: expected chunk {expected}, received {received}")]
    StreamDesync { expected: u64, received: u64 },

    #[error("Generation is not complete; finalize as partial to keep what was received")]
    IncompleteGeneration,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Buffer has no audio to finalize")]
    EmptyBuffer,

    #[error("IO error: {0}")]
    Io(String),
}

/// 错误类别编码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidPrompt,
    MissingCredential,
    Auth,
    Quota,
    TransientService,
    Protocol,
    StreamDesync,
    IncompleteGeneration,
    InvalidState,
    EmptyBuffer,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidPrompt => "INVALID_PROMPT",
            ErrorKind::MissingCredential => "MISSING_CREDENTIAL",
            ErrorKind::Auth => "AUTH",
            ErrorKind::Quota => "QUOTA",
            ErrorKind::TransientService => "TRANSIENT_SERVICE",
            ErrorKind::Protocol => "PROTOCOL",
            ErrorKind::StreamDesync => "STREAM_DESYNC",
            ErrorKind::IncompleteGeneration => "INCOMPLETE_GENERATION",
            ErrorKind::InvalidState => "INVALID_STATE",
            ErrorKind::EmptyBuffer => "EMPTY_BUFFER",
            ErrorKind::Io => "IO",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 展示给用户的建议操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// 检查 API 凭据
    CheckCredential,
    /// 稍后重试
    Retry,
    /// 接受已生成的部分
    AcceptPartial,
    /// 修改提示词
    EditPrompt,
    /// 检查输出目录
    CheckStorage,
    None,
}

impl ComposerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPrompt(_) => ErrorKind::InvalidPrompt,
            Self::MissingCredential(_) => ErrorKind::MissingCredential,
            Self::Auth(_) => ErrorKind::Auth,
            Self::Quota(_) => ErrorKind::Quota,
            Self::TransientService(_) => ErrorKind::TransientService,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::StreamDesync { .. } => ErrorKind::StreamDesync,
            Self::IncompleteGeneration => ErrorKind::IncompleteGeneration,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::EmptyBuffer => ErrorKind::EmptyBuffer,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// 是否可以通过重试恢复
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientService(_) | Self::StreamDesync { .. })
    }

    pub fn suggested_action(&self) -> SuggestedAction {
        match self {
            Self::MissingCredential(_) | Self::Auth(_) | Self::Quota(_) => {
                SuggestedAction::CheckCredential
            }
            Self::TransientService(_) | Self::Protocol(_) | Self::StreamDesync { .. } => {
                SuggestedAction::Retry
            }
            Self::IncompleteGeneration => SuggestedAction::AcceptPartial,
            Self::InvalidPrompt(_) => SuggestedAction::EditPrompt,
            Self::Io(_) => SuggestedAction::CheckStorage,
            Self::InvalidState(_) | Self::EmptyBuffer => SuggestedAction::None,
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientService(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

impl From<PromptError> for ComposerError {
    fn from(err: PromptError) -> Self {
        Self::InvalidPrompt(err.to_string())
    }
}

impl From<BufferError> for ComposerError {
    fn from(err: BufferError) -> Self {
        match err {
            BufferError::Desync { expected, received } => Self::StreamDesync { expected, received },
            BufferError::Frozen => Self::invalid_state("buffer is frozen"),
        }
    }
}

impl From<std::io::Error> for ComposerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ComposerError::transient("timeout").is_transient());
        assert!(ComposerError::StreamDesync {
            expected: 1,
            received: 2
        }
        .is_transient());
        assert!(!ComposerError::Auth("bad key".into()).is_transient());
        assert!(!ComposerError::Quota("billing".into()).is_transient());
        assert!(!ComposerError::protocol("garbage").is_transient());
    }

    #[test]
    fn test_buffer_error_conversion() {
        let err: ComposerError = BufferError::Desync {
            expected: 3,
            received: 5,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::StreamDesync);

        let err: ComposerError = BufferError::Frozen.into();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_suggested_actions() {
        assert_eq!(
            ComposerError::Auth("x".into()).suggested_action(),
            SuggestedAction::CheckCredential
        );
        assert_eq!(
            ComposerError::IncompleteGeneration.suggested_action(),
            SuggestedAction::AcceptPartial
        );
        assert_eq!(
            ComposerError::Io("disk full".into()).suggested_action(),
            SuggestedAction::CheckStorage
        );
    }

    #[test]
    fn test_kind_codes() {
        assert_eq!(ErrorKind::TransientService.as_str(), "TRANSIENT_SERVICE");
        assert_eq!(ComposerError::EmptyBuffer.kind().to_string(), "EMPTY_BUFFER");
    }
}
