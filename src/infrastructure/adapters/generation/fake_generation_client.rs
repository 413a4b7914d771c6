//! Fake Generation Client - 用于测试与演示的脚本化客户端
//!
//! 不调用远程服务，按脚本产生音频块、错误、序号缺口或挂起

use async_trait::async_trait;
use futures_util::stream;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    ChunkStream, ClientError, GenerationClientPort, GenerationEvent, GenerationRequest,
};
use crate::domain::AudioChunk;

/// 脚本配置
#[derive(Debug, Clone)]
pub struct FakeGenerationScript {
    /// 一次完整生成的块数
    pub chunk_count: u64,
    pub chunk_bytes: usize,
    /// 每个块之前的等待
    pub chunk_delay: Duration,
    /// 前 k 次尝试在打开流时失败
    pub fail_first: u32,
    pub failure: ClientError,
    /// 前 k 次尝试在发出 n 个块后中断
    pub interrupt: Option<(u64, u32)>,
    /// 首次尝试在该序号处跳过一个块
    pub gap_at: Option<u64>,
    /// 流结束时不发送完成标记
    pub end_without_marker: bool,
    /// 用最后一块的 final 标志代替结束事件
    pub final_flag: bool,
    /// 发出 n 个块后挂起，直到被取消
    pub hang_after: Option<u64>,
    pub supports_resume: bool,
}

impl Default for FakeGenerationScript {
    fn default() -> Self {
        Self {
            chunk_count: 5,
            chunk_bytes: 4800,
            chunk_delay: Duration::ZERO,
            fail_first: 0,
            failure: ClientError::TransientService("service unavailable".to_string()),
            interrupt: None,
            gap_at: None,
            end_without_marker: false,
            final_flag: false,
            hang_after: None,
            supports_resume: false,
        }
    }
}

/// 脚本化生成客户端
pub struct FakeGenerationClient {
    script: Arc<FakeGenerationScript>,
    attempts: AtomicU32,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl FakeGenerationClient {
    pub fn new(script: FakeGenerationScript) -> Self {
        Self {
            script: Arc::new(script),
            attempts: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 产生 n 个块后正常完成
    pub fn with_chunks(chunk_count: u64) -> Self {
        Self::new(FakeGenerationScript {
            chunk_count,
            ..Default::default()
        })
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 已调用 generate 的次数
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 可预测的块内容
    pub fn payload_for(&self, sequence: u64) -> Vec<u8> {
        vec![(sequence % 251) as u8; self.script.chunk_bytes]
    }
}

struct Emission {
    script: Arc<FakeGenerationScript>,
    cancel: CancellationToken,
    attempt: u32,
    next: u64,
    emitted: u64,
    done: bool,
}

impl Emission {
    async fn step(mut self) -> Option<(Result<GenerationEvent, ClientError>, Self)> {
        if self.done || self.cancel.is_cancelled() {
            return None;
        }
        let script = self.script.clone();

        if script.hang_after == Some(self.emitted) {
            self.cancel.cancelled().await;
            return None;
        }

        if let Some((after, attempts)) = script.interrupt {
            if self.attempt <= attempts && self.emitted == after {
                self.done = true;
                return Some((
                    Err(ClientError::TransientService("connection reset".to_string())),
                    self,
                ));
            }
        }

        if self.next >= script.chunk_count {
            self.done = true;
            if script.end_without_marker || script.final_flag {
                return None;
            }
            return Some((Ok(GenerationEvent::Completed), self));
        }

        if !script.chunk_delay.is_zero() {
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = tokio::time::sleep(script.chunk_delay) => {}
            }
        }

        let mut sequence = self.next;
        if self.attempt == 1 && script.gap_at == Some(sequence) {
            sequence += 1;
        }
        let payload = vec![(sequence % 251) as u8; script.chunk_bytes];
        let is_last = sequence + 1 >= script.chunk_count;
        let chunk = if script.final_flag && is_last {
            AudioChunk::final_chunk(sequence, payload)
        } else {
            AudioChunk::new(sequence, payload)
        };

        self.next = sequence + 1;
        self.emitted += 1;
        Some((Ok(GenerationEvent::Chunk(chunk)), self))
    }
}

#[async_trait]
impl GenerationClientPort for FakeGenerationClient {
    async fn generate(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<ChunkStream, ClientError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let start = request.resume_from.unwrap_or(0);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        tracing::debug!(
            attempt = attempt,
            resume_from = start,
            "FakeGenerationClient: opening scripted stream"
        );

        if attempt <= self.script.fail_first {
            return Err(self.script.failure.clone());
        }

        let emission = Emission {
            script: self.script.clone(),
            cancel,
            attempt,
            next: start,
            emitted: 0,
            done: false,
        };
        Ok(Box::pin(stream::unfold(emission, Emission::step)))
    }

    fn supports_resume(&self) -> bool {
        self.script.supports_resume
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::Credential;
    use crate::domain::{Prompt, SessionId};
    use futures_util::StreamExt;

    fn request() -> GenerationRequest {
        GenerationRequest::new(SessionId::new(), Prompt::new("lofi"), Credential::new("k"))
    }

    async fn collect(client: &FakeGenerationClient, request: GenerationRequest) -> Vec<Result<GenerationEvent, ClientError>> {
        let stream = client
            .generate(request, CancellationToken::new())
            .await
            .unwrap();
        stream.collect().await
    }

    #[tokio::test]
    async fn test_emits_chunks_then_completion() {
        let client = FakeGenerationClient::with_chunks(3);
        let events = collect(&client, request()).await;
        assert_eq!(events.len(), 4);
        assert!(matches!(events[3], Ok(GenerationEvent::Completed)));
        assert_eq!(client.attempts(), 1);
    }

    #[tokio::test]
    async fn test_fail_first_attempts() {
        let client = FakeGenerationClient::new(FakeGenerationScript {
            fail_first: 1,
            ..Default::default()
        });
        assert!(client
            .generate(request(), CancellationToken::new())
            .await
            .is_err());
        assert!(client
            .generate(request(), CancellationToken::new())
            .await
            .is_ok());
        assert_eq!(client.attempts(), 2);
    }

    #[tokio::test]
    async fn test_resume_and_gap() {
        let client = FakeGenerationClient::new(FakeGenerationScript {
            chunk_count: 4,
            gap_at: Some(1),
            ..Default::default()
        });
        let first = collect(&client, request()).await;
        let sequences: Vec<u64> = first
            .iter()
            .filter_map(|e| match e {
                Ok(GenerationEvent::Chunk(c)) => Some(c.sequence),
                _ => None,
            })
            .collect();
        assert_eq!(sequences, vec![0, 2, 3]);

        let resumed = collect(&client, request().resume_from(2)).await;
        assert!(matches!(&resumed[0], Ok(GenerationEvent::Chunk(c)) if c.sequence == 2));
        assert_eq!(client.requests()[1].resume_from, Some(2));
    }

    #[tokio::test]
    async fn test_hang_stops_on_cancel() {
        let client = FakeGenerationClient::new(FakeGenerationScript {
            hang_after: Some(0),
            ..Default::default()
        });
        let cancel = CancellationToken::new();
        let mut stream = client.generate(request(), cancel.clone()).await.unwrap();
        cancel.cancel();
        assert!(stream.next().await.is_none());
    }
}
