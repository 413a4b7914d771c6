//! HTTP Generation Client - 调用远程音乐生成服务
//!
//! 实现 GenerationClientPort trait
//!
//! 远程 API:
//! POST {base_url}/v1/music/generate
//! Request: {"session_id": "...", "prompt": "...", "duration_secs": 30, ...}  (JSON)
//! Headers: Authorization: Bearer <key>, Idempotency-Key: <session_id>
//! Response: 二进制帧流（见 frame_codec）

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    ChunkStream, ClientError, GenerationClientPort, GenerationEvent, GenerationRequest,
};
use crate::domain::AudioChunk;

use super::frame_codec::{Frame, FrameCodec, DEFAULT_MAX_FRAME_BYTES};

const MAX_ERROR_BODY_CHARS: usize = 200;

/// 生成请求体 (JSON)
#[derive(Debug, Serialize)]
struct GenerateHttpRequest<'a> {
    session_id: String,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    style: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resume_from: Option<u64>,
}

/// HTTP 生成客户端配置
#[derive(Debug, Clone)]
pub struct HttpGenerationClientConfig {
    /// 服务基础 URL
    pub base_url: String,
    /// 等待响应头的超时时间（秒）
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// 服务是否支持从块序号续传
    pub supports_resume: bool,
    pub max_frame_bytes: usize,
}

impl Default for HttpGenerationClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 30,
            connect_timeout_secs: 10,
            supports_resume: false,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl HttpGenerationClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_resume(mut self, supports_resume: bool) -> Self {
        self.supports_resume = supports_resume;
        self
    }
}

/// HTTP 生成客户端
pub struct HttpGenerationClient {
    client: Client,
    config: HttpGenerationClientConfig,
}

impl HttpGenerationClient {
    pub fn new(config: HttpGenerationClientConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| ClientError::Protocol(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1/music/generate",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

/// HTTP 状态码分类
pub fn classify_status(status: StatusCode, body: &str) -> ClientError {
    let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    let message = format!("HTTP {}: {}", status.as_u16(), body.trim());
    match status.as_u16() {
        401 | 403 => ClientError::Auth(message),
        402 => ClientError::Quota(message),
        408 | 429 => ClientError::TransientService(message),
        400 | 422 => ClientError::Rejected(message),
        _ if status.is_server_error() => ClientError::TransientService(message),
        _ => ClientError::Protocol(message),
    }
}

/// 传输层错误分类
fn classify_transport(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::TransientService(format!("request timed out: {}", err))
    } else if err.is_connect() {
        ClientError::TransientService(format!("cannot connect to generation service: {}", err))
    } else if err.is_body() || err.is_request() {
        ClientError::TransientService(err.to_string())
    } else {
        ClientError::Protocol(err.to_string())
    }
}

fn frame_to_event(frame: Frame) -> Result<GenerationEvent, ClientError> {
    match frame {
        Frame::Chunk { sequence, payload } => {
            Ok(GenerationEvent::Chunk(AudioChunk::new(sequence, payload)))
        }
        Frame::FinalChunk { sequence, payload } => Ok(GenerationEvent::Chunk(
            AudioChunk::final_chunk(sequence, payload),
        )),
        Frame::End => Ok(GenerationEvent::Completed),
        Frame::Filtered(reason) => Err(ClientError::Rejected(reason)),
        Frame::ServiceError(message) => Err(ClientError::TransientService(message)),
    }
}

#[async_trait]
impl GenerationClientPort for HttpGenerationClient {
    async fn generate(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<ChunkStream, ClientError> {
        let session_id = request.session_id.to_string();
        let body = GenerateHttpRequest {
            session_id: session_id.clone(),
            prompt: request.prompt.text(),
            duration_secs: request.prompt.duration_secs(),
            style: request.prompt.style(),
            seed: request.prompt.seed(),
            resume_from: request.resume_from,
        };

        tracing::debug!(
            url = %self.generate_url(),
            session_id = %session_id,
            prompt_len = body.prompt.len(),
            resume_from = ?body.resume_from,
            "Sending generation request"
        );

        let send = self
            .client
            .post(self.generate_url())
            .bearer_auth(request.credential.expose())
            .header("Idempotency-Key", &session_id)
            .json(&body)
            .send();
        let timeout = Duration::from_secs(self.config.timeout_secs);

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(ClientError::TransientService("request cancelled".to_string()));
            }
            result = tokio::time::timeout(timeout, send) => match result {
                Ok(result) => result.map_err(classify_transport)?,
                Err(_) => {
                    return Err(ClientError::TransientService(format!(
                        "no response within {}s",
                        timeout.as_secs()
                    )));
                }
            },
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let err = classify_status(status, &text);
            tracing::warn!(session_id = %session_id, status = status.as_u16(), error = %err, "Generation request rejected");
            return Err(err);
        }

        tracing::debug!(session_id = %session_id, "Generation stream opened");

        let body = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        let frames = FramedRead::new(
            StreamReader::new(body),
            FrameCodec::new(self.config.max_frame_bytes),
        );
        // 取消后流在下一次 poll 结束，响应被丢弃即断开连接
        let events = frames
            .map(|frame| frame.map_err(ClientError::from).and_then(frame_to_event))
            .take_until(cancel.cancelled_owned());

        Ok(Box::pin(events))
    }

    fn supports_resume(&self) -> bool {
        self.config.supports_resume
    }
}
