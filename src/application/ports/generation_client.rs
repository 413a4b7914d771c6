//! Generation Client Port - 远程音乐生成服务抽象
//!
//! 把远程服务的请求/流式响应统一为异步块流，具体实现在 infrastructure/adapters 层

use async_trait::async_trait;
use futures_util::Stream;
use std::pin::Pin;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::application::error::ComposerError;
use crate::domain::{AudioChunk, Prompt, SessionId};

use super::Credential;

/// 生成客户端错误
///
/// 传输层的所有失败都必须归入以下类别之一
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("Transient service error: {0}")]
    TransientService(String),

    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Quota exceeded: {0}")]
    Quota(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// 服务端拒绝或过滤了提示词
    #[error("Prompt rejected: {0}")]
    Rejected(String),
}

impl From<ClientError> for ComposerError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::TransientService(m) => ComposerError::TransientService(m),
            ClientError::Auth(m) => ComposerError::Auth(m),
            ClientError::Quota(m) => ComposerError::Quota(m),
            ClientError::Protocol(m) => ComposerError::Protocol(m),
            ClientError::Rejected(m) => ComposerError::InvalidPrompt(m),
        }
    }
}

/// 生成请求
///
/// 发出后不可变；续传时派生新的请求值
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// 同时作为幂等键
    pub session_id: SessionId,
    pub prompt: Prompt,
    pub credential: Credential,
    /// 下一个期望的块序号，仅在客户端支持续传时使用
    pub resume_from: Option<u64>,
}

impl GenerationRequest {
    pub fn new(session_id: SessionId, prompt: Prompt, credential: Credential) -> Self {
        Self {
            session_id,
            prompt,
            credential,
            resume_from: None,
        }
    }

    /// 从指定块序号续传
    pub fn resume_from(&self, sequence: u64) -> Self {
        Self {
            resume_from: Some(sequence),
            ..self.clone()
        }
    }

    /// 从头重新生成
    pub fn from_scratch(&self) -> Self {
        Self {
            resume_from: None,
            ..self.clone()
        }
    }
}

/// 流中的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationEvent {
    Chunk(AudioChunk),
    /// 服务端确认生成结束
    Completed,
}

pub type ChunkStream =
    Pin<Box<dyn Stream<Item = Result<GenerationEvent, ClientError>> + Send + 'static>>;

/// Generation Client Port
#[async_trait]
pub trait GenerationClientPort: Send + Sync {
    /// 发起生成并返回块流
    ///
    /// `cancel` 被触发后，流必须在下一次 poll 时结束并中止底层调用
    async fn generate(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<ChunkStream, ClientError>;

    /// 是否支持从块序号续传
    fn supports_resume(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resume_derives_new_request() {
        let request = GenerationRequest::new(
            SessionId::new(),
            Prompt::new("ambient pads"),
            Credential::new("sk-test"),
        );
        let resumed = request.resume_from(4);
        assert_eq!(resumed.resume_from, Some(4));
        assert_eq!(resumed.session_id, request.session_id);
        assert_eq!(request.resume_from, None);
        assert_eq!(resumed.from_scratch().resume_from, None);
    }

    #[test]
    fn test_rejected_maps_to_invalid_prompt() {
        let err: ComposerError = ClientError::Rejected("filtered".into()).into();
        assert_eq!(err, ComposerError::InvalidPrompt("filtered".into()));
        assert!(!err.is_transient());

        let err: ComposerError = ClientError::TransientService("503".into()).into();
        assert!(err.is_transient());
    }
}
