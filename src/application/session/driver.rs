//! 会话驱动任务
//!
//! 每个会话一个后台任务: 调用生成客户端、按序追加音频块、
//! 对瞬时错误执行带退避的重试。所有等待点都会响应取消。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;

use crate::application::error::ComposerError;
use crate::application::ports::{GenerationEvent, GenerationRequest};
use crate::domain::{BufferError, SessionState};

use super::handle::SessionInner;

/// 单次尝试的结果
enum Attempt {
    /// 服务端确认完成
    Completed,
    /// 会话已被取消或冻结
    Stopped,
}

pub(super) async fn run(inner: Arc<SessionInner>, request: GenerationRequest) {
    let policy = inner.deps.settings.retry;
    let mut retries = 0u32;
    let mut current = request.clone();

    loop {
        let attempt = stream_once(&inner, current.clone()).await;

        let err = match attempt {
            Ok(Attempt::Completed) => {
                complete(&inner);
                return;
            }
            Ok(Attempt::Stopped) => {
                tracing::debug!(session_id = %inner.id, "Generation task stopped");
                return;
            }
            Err(_) if inner.cancel.is_cancelled() => return,
            Err(err) => err,
        };

        if !err.is_transient() || !policy.allows(retries) {
            fail(&inner, err, retries);
            return;
        }

        retries += 1;
        let delay = policy.delay_for_attempt(retries);
        tracing::warn!(
            session_id = %inner.id,
            slot = %inner.slot,
            attempt = retries,
            max_retries = policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Transient generation failure, retrying"
        );
        let message = err.to_string();
        inner.status.send_modify(|status| {
            status.retry_count = retries;
            status.last_error = Some(err);
        });
        inner.deps.events.publish_retry_scheduled(
            inner.id,
            &inner.slot,
            retries,
            delay.as_millis() as u64,
            &message,
        );

        tokio::select! {
            _ = inner.cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        let resume_at = inner.buffer.next_sequence();
        if resume_at > 0 && inner.deps.client.supports_resume() {
            tracing::info!(
                session_id = %inner.id,
                resume_from = resume_at,
                "Resuming generation"
            );
            current = request.resume_from(resume_at);
            continue;
        }

        if resume_at > 0 {
            match inner.buffer.reset() {
                Ok(epoch) => {
                    tracing::info!(
                        session_id = %inner.id,
                        slot = %inner.slot,
                        epoch = epoch,
                        discarded_chunks = resume_at,
                        "Restarting generation from scratch"
                    );
                    inner.sync_buffer_stats();
                    inner.deps.events.publish_restarted(inner.id, &inner.slot, epoch);
                }
                // 冻结说明会话已被取消或正在写出
                Err(BufferError::Frozen) => return,
                Err(e) => {
                    fail(&inner, e.into(), retries);
                    return;
                }
            }
        }
        current = request.from_scratch();
    }
}

/// 拉取一次生成流
async fn stream_once(
    inner: &SessionInner,
    request: GenerationRequest,
) -> Result<Attempt, ComposerError> {
    let idle = inner.deps.settings.stream_idle_timeout;
    let token = inner.cancel.child_token();

    let opened = tokio::select! {
        _ = inner.cancel.cancelled() => return Ok(Attempt::Stopped),
        opened = within(idle, inner.deps.client.generate(request, token)) => opened,
    };
    let mut stream = match opened {
        Some(result) => result?,
        None => return Err(idle_error(idle)),
    };

    loop {
        let next = tokio::select! {
            _ = inner.cancel.cancelled() => return Ok(Attempt::Stopped),
            next = within(idle, stream.next()) => next,
        };

        let event = match next {
            None => return Err(idle_error(idle)),
            Some(None) => {
                return Err(ComposerError::transient(
                    "stream ended without a completion marker",
                ))
            }
            Some(Some(event)) => event?,
        };

        match event {
            GenerationEvent::Chunk(chunk) => {
                if !mark_streaming(inner) {
                    return Ok(Attempt::Stopped);
                }
                let sequence = chunk.sequence;
                let is_final = chunk.is_final;
                let playable = match inner.buffer.append(chunk) {
                    Ok(playable) => playable,
                    Err(BufferError::Frozen) => return Ok(Attempt::Stopped),
                    Err(e) => return Err(e.into()),
                };
                inner.sync_buffer_stats();
                tracing::debug!(
                    session_id = %inner.id,
                    sequence = sequence,
                    playable_bytes = playable,
                    is_final = is_final,
                    "Audio chunk appended"
                );
                inner
                    .deps
                    .events
                    .publish_chunk_appended(inner.id, &inner.slot, sequence, playable);
                if is_final {
                    return Ok(Attempt::Completed);
                }
            }
            GenerationEvent::Completed => {
                if !mark_streaming(inner) {
                    return Ok(Attempt::Stopped);
                }
                return Ok(Attempt::Completed);
            }
        }
    }
}

/// 首个音频块到达时进入 Streaming；会话已离开活跃状态时返回 false
fn mark_streaming(inner: &SessionInner) -> bool {
    match inner.state() {
        SessionState::Streaming => true,
        SessionState::Requesting => inner.transition(SessionState::Streaming).is_ok(),
        _ => false,
    }
}

/// 流完成: 设置完成标志并冻结，会话停留在 Streaming 等待 finalize
fn complete(inner: &SessionInner) {
    let buffer = &inner.buffer;
    let marked = inner.status.send_if_modified(|status| {
        if status.state != SessionState::Streaming {
            return false;
        }
        buffer.mark_complete();
        status.stream_complete = true;
        status.touch();
        true
    });
    if !marked {
        return;
    }
    inner.sync_buffer_stats();

    let chunk_count = buffer.chunk_count();
    tracing::info!(
        session_id = %inner.id,
        slot = %inner.slot,
        chunks = chunk_count,
        playable_bytes = buffer.playable_bytes(),
        "Generation stream completed"
    );
    inner
        .deps
        .events
        .publish_stream_completed(inner.id, &inner.slot, chunk_count);
}

fn fail(inner: &SessionInner, err: ComposerError, retries: u32) {
    tracing::error!(
        session_id = %inner.id,
        slot = %inner.slot,
        retries = retries,
        kind = %err.kind(),
        error = %err,
        "Generation session failed"
    );
    let recorded = err.clone();
    if inner
        .transition_with(SessionState::Failed, |status| {
            status.last_error = Some(recorded);
        })
        .is_ok()
    {
        inner.buffer.freeze();
    }
}

async fn within<F: Future>(limit: Option<Duration>, fut: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}

fn idle_error(idle: Option<Duration>) -> ComposerError {
    let secs = idle.map(|d| d.as_secs_f64()).unwrap_or_default();
    ComposerError::transient(format!("no audio received for {:.1}s", secs))
}
