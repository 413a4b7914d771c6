//! 会话句柄
//!
//! 状态迁移通过 `watch::Sender::send_if_modified` 原子完成；
//! 宿主侧的 start / cancel / finalize / dispose 由 `ops` 互斥串行化，
//! 驱动任务从不持有该锁。

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::{watch, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::error::ComposerError;
use crate::application::ports::{
    AssetFinalizerPort, AssetProvenance, AssetRecord, CredentialProviderPort,
    GenerationClientPort, GenerationRequest,
};
use crate::domain::{
    AudioSpec, ChunkBuffer, PlayableAudio, PreviewSlice, Prompt, PromptLimits, SessionId,
    SessionState, SlotId,
};
use crate::infrastructure::events::EventPublisher;

use super::driver;
use super::{RetryPolicy, SessionStatus};

/// 会话运行参数
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub retry: RetryPolicy,
    /// 取消后等待驱动任务退出的时间，超时则强制中止
    pub cancel_grace: Duration,
    /// 等待下一个音频块的上限
    pub stream_idle_timeout: Option<Duration>,
    pub prompt_limits: PromptLimits,
    pub audio: AudioSpec,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            cancel_grace: Duration::from_millis(2000),
            stream_idle_timeout: Some(Duration::from_secs(30)),
            prompt_limits: PromptLimits::default(),
            audio: AudioSpec::default(),
        }
    }
}

/// 会话依赖
#[derive(Clone)]
pub struct SessionDependencies {
    pub client: Arc<dyn GenerationClientPort>,
    pub credentials: Arc<dyn CredentialProviderPort>,
    pub finalizer: Arc<dyn AssetFinalizerPort>,
    pub events: Arc<EventPublisher>,
    pub settings: SessionSettings,
}

/// finalize 参数
#[derive(Debug, Clone, Default)]
pub struct FinalizeOptions {
    /// 允许写出未完成的结果
    pub partial: bool,
    /// 输出目录，默认由 finalizer 决定
    pub destination: Option<PathBuf>,
    /// 文件名提示，默认使用提示词文本
    pub name_hint: Option<String>,
    pub timeout: Option<Duration>,
}

impl FinalizeOptions {
    pub fn complete() -> Self {
        Self::default()
    }

    pub fn partial() -> Self {
        Self {
            partial: true,
            ..Self::default()
        }
    }

    pub fn with_destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn with_name_hint(mut self, hint: impl Into<String>) -> Self {
        self.name_hint = Some(hint.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

pub(super) struct SessionInner {
    pub(super) id: SessionId,
    pub(super) slot: SlotId,
    pub(super) deps: SessionDependencies,
    pub(super) buffer: Arc<ChunkBuffer>,
    pub(super) status: watch::Sender<SessionStatus>,
    pub(super) cancel: CancellationToken,
    prompt: OnceLock<Prompt>,
    driver: Mutex<Option<JoinHandle<()>>>,
    ops: Mutex<()>,
    disposed: AtomicBool,
}

impl SessionInner {
    pub(super) fn state(&self) -> SessionState {
        self.status.borrow().state
    }

    /// 原子迁移，返回迁移前的状态
    pub(super) fn transition_with(
        &self,
        next: SessionState,
        update: impl FnOnce(&mut SessionStatus),
    ) -> Result<SessionState, ComposerError> {
        let mut outcome = Err(SessionState::Idle);
        self.status.send_if_modified(|status| {
            if status.state.can_transition_to(next) {
                outcome = Ok(status.state);
                status.state = next;
                update(status);
                status.touch();
                true
            } else {
                outcome = Err(status.state);
                false
            }
        });

        match outcome {
            Ok(from) => {
                let error = self
                    .status
                    .borrow()
                    .last_error
                    .as_ref()
                    .filter(|_| matches!(next, SessionState::Failed))
                    .map(|e| e.to_string());
                tracing::debug!(
                    session_id = %self.id,
                    slot = %self.slot,
                    from = %from,
                    to = %next,
                    "Session state changed"
                );
                self.deps
                    .events
                    .publish_state_changed(self.id, &self.slot, from, next, error);
                Ok(from)
            }
            Err(current) => Err(ComposerError::invalid_state(format!(
                "cannot move session from {} to {}",
                current, next
            ))),
        }
    }

    pub(super) fn transition(&self, next: SessionState) -> Result<SessionState, ComposerError> {
        self.transition_with(next, |_| {})
    }

    /// 把缓冲区计数同步到状态快照
    pub(super) fn sync_buffer_stats(&self) {
        let chunk_count = self.buffer.chunk_count();
        let playable_bytes = self.buffer.playable_bytes();
        let epoch = self.buffer.epoch();
        self.status.send_modify(|status| {
            status.chunk_count = chunk_count;
            status.playable_bytes = playable_bytes;
            status.epoch = epoch;
            status.touch();
        });
    }

    /// 等待驱动任务退出，超过宽限期则强制中止
    async fn join_driver(&self) {
        let handle = self.driver.lock().await.take();
        let Some(mut handle) = handle else {
            return;
        };
        let grace = self.deps.settings.cancel_grace;
        if tokio::time::timeout(grace, &mut handle).await.is_err() {
            tracing::warn!(
                session_id = %self.id,
                grace_ms = grace.as_millis() as u64,
                "Generation task did not stop within grace period, aborting"
            );
            handle.abort();
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

/// 会话句柄
///
/// 克隆得到的句柄指向同一会话
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.inner.id)
            .field("slot", &self.inner.slot)
            .field("state", &self.inner.state())
            .finish()
    }
}

impl SessionHandle {
    /// 创建处于 `Idle` 状态的会话
    pub fn new(slot: SlotId, deps: SessionDependencies) -> Self {
        let id = SessionId::new();
        let buffer = Arc::new(ChunkBuffer::new(deps.settings.audio));
        let (status, _) = watch::channel(SessionStatus::new(id, slot.clone()));
        Self {
            inner: Arc::new(SessionInner {
                id,
                slot,
                deps,
                buffer,
                status,
                cancel: CancellationToken::new(),
                prompt: OnceLock::new(),
                driver: Mutex::new(None),
                ops: Mutex::new(()),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    pub fn slot(&self) -> &SlotId {
        &self.inner.slot
    }

    pub fn prompt(&self) -> Option<&Prompt> {
        self.inner.prompt.get()
    }

    /// 是否与另一个句柄指向同一会话
    pub fn same_session(&self, other: &SessionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.status.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    /// 订阅状态快照
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status.subscribe()
    }

    /// 等待会话进入终态或流完成
    pub async fn wait_until_settled(&self) -> SessionStatus {
        let mut rx = self.inner.status.subscribe();
        let settled = rx.wait_for(SessionStatus::is_settled).await.map(|s| s.clone());
        settled.unwrap_or_else(|_| self.status())
    }

    /// 当前可播放的一致前缀
    pub fn read_playable_through(&self) -> Result<PlayableAudio, ComposerError> {
        self.ensure_live()?;
        Ok(self.inner.buffer.read_playable_through())
    }

    /// 读取字节偏移之后的新音频
    pub fn read_since(&self, offset: u64) -> Result<PreviewSlice, ComposerError> {
        self.ensure_live()?;
        Ok(self.inner.buffer.read_since(offset))
    }

    pub fn audio_spec(&self) -> AudioSpec {
        self.inner.buffer.spec()
    }

    fn ensure_live(&self) -> Result<(), ComposerError> {
        if self.inner.is_disposed() {
            return Err(ComposerError::invalid_state("session has been disposed"));
        }
        Ok(())
    }

    async fn lock_live(&self) -> Result<MutexGuard<'_, ()>, ComposerError> {
        self.ensure_live()?;
        let guard = self.inner.ops.lock().await;
        self.ensure_live()?;
        Ok(guard)
    }

    /// 开始生成
    ///
    /// 仅允许在 `Idle` 状态调用；提示词与凭据检查失败时状态不变
    pub async fn start(&self, prompt: Prompt) -> Result<(), ComposerError> {
        let _ops = self.lock_live().await?;
        let request = self.prepare_request(prompt)?;
        self.launch_locked(request).await
    }

    /// 只做 `start` 的前置检查（状态、提示词、凭据），不改变状态
    ///
    /// 注册表在替换旧会话之前调用，检查失败时旧会话不受影响
    pub fn prepare(&self, prompt: Prompt) -> Result<GenerationRequest, ComposerError> {
        self.ensure_live()?;
        self.prepare_request(prompt)
    }

    /// 用 `prepare` 得到的请求启动驱动任务
    pub async fn launch(&self, request: GenerationRequest) -> Result<(), ComposerError> {
        let _ops = self.lock_live().await?;
        if request.session_id != self.inner.id {
            return Err(ComposerError::invalid_state(
                "request was prepared for a different session",
            ));
        }
        self.ensure_idle()?;
        self.launch_locked(request).await
    }

    fn ensure_idle(&self) -> Result<(), ComposerError> {
        let state = self.inner.state();
        if state != SessionState::Idle {
            return Err(ComposerError::invalid_state(format!(
                "cannot start a session that is {}; create a new session instead",
                state
            )));
        }
        Ok(())
    }

    fn prepare_request(&self, prompt: Prompt) -> Result<GenerationRequest, ComposerError> {
        let inner = &self.inner;
        self.ensure_idle()?;
        prompt.validate(&inner.deps.settings.prompt_limits)?;
        let credential = inner.deps.credentials.get_credential()?;
        Ok(GenerationRequest::new(inner.id, prompt, credential))
    }

    async fn launch_locked(&self, request: GenerationRequest) -> Result<(), ComposerError> {
        let inner = &self.inner;
        let prompt = &request.prompt;

        if inner.prompt.set(prompt.clone()).is_err() {
            return Err(ComposerError::invalid_state("session was already started"));
        }
        inner.transition(SessionState::Requesting)?;

        tracing::info!(
            session_id = %inner.id,
            slot = %inner.slot,
            prompt_len = prompt.text().len(),
            duration_secs = ?prompt.duration_secs(),
            "Generation session started"
        );

        let task = tokio::spawn(driver::run(inner.clone(), request));
        *inner.driver.lock().await = Some(task);
        Ok(())
    }

    /// 取消进行中的生成
    ///
    /// 缓冲区被冻结但保留，之后仍可 `finalize(partial = true)`
    pub async fn cancel(&self) -> Result<(), ComposerError> {
        let _ops = self.lock_live().await?;
        self.cancel_locked().await
    }

    async fn cancel_locked(&self) -> Result<(), ComposerError> {
        let inner = &self.inner;
        inner.transition(SessionState::Cancelled)?;
        inner.cancel.cancel();
        let playable = inner.buffer.freeze();
        inner.join_driver().await;
        inner.sync_buffer_stats();

        tracing::info!(
            session_id = %inner.id,
            slot = %inner.slot,
            chunks = inner.buffer.chunk_count(),
            playable_bytes = playable,
            "Generation session cancelled"
        );
        Ok(())
    }

    pub async fn finalize(&self, partial: bool) -> Result<AssetRecord, ComposerError> {
        self.finalize_with(FinalizeOptions {
            partial,
            ..FinalizeOptions::default()
        })
        .await
    }

    /// 写出资产
    ///
    /// 仍在拉流时先取消再冻结；写出失败时回到之前的状态并记录错误，不自动重试
    pub async fn finalize_with(
        &self,
        options: FinalizeOptions,
    ) -> Result<AssetRecord, ComposerError> {
        let _ops = self.lock_live().await?;
        let inner = &self.inner;

        let status = self.status();
        if !matches!(
            status.state,
            SessionState::Streaming | SessionState::Cancelled
        ) {
            return Err(ComposerError::invalid_state(format!(
                "cannot finalize a session that is {}",
                status.state
            )));
        }
        if !options.partial && !inner.buffer.is_complete() {
            return Err(ComposerError::IncompleteGeneration);
        }
        if inner.buffer.chunk_count() == 0 {
            return Err(ComposerError::EmptyBuffer);
        }

        let from = inner.transition(SessionState::Finalizing)?;
        // 被中途打断的流回退到 Cancelled
        let restore = if from == SessionState::Streaming && !status.stream_complete {
            SessionState::Cancelled
        } else {
            from
        };

        inner.cancel.cancel();
        inner.buffer.freeze();
        inner.join_driver().await;
        inner.sync_buffer_stats();

        let prompt = inner
            .prompt
            .get()
            .cloned()
            .ok_or_else(|| ComposerError::invalid_state("session was never started"))?;
        let destination = options
            .destination
            .unwrap_or_else(|| inner.deps.finalizer.default_destination());
        let name_hint = options
            .name_hint
            .unwrap_or_else(|| prompt.text().to_string());
        let provenance = AssetProvenance {
            session_id: inner.id,
            prompt,
        };

        let finalizer = inner.deps.finalizer.clone();
        let buffer = inner.buffer.clone();
        let mut write = tokio::spawn(async move {
            finalizer
                .finalize(&buffer, &destination, &name_hint, &provenance)
                .await
        });
        let joined = match options.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut write).await {
                Ok(joined) => Some(joined),
                Err(_) => {
                    // 等写入任务真正退出，未交付的文件由其 drop guard 清理
                    write.abort();
                    match write.await {
                        Err(e) if e.is_cancelled() => None,
                        finished => Some(finished),
                    }
                }
            },
            None => Some(write.await),
        };
        let result = match joined {
            Some(Ok(written)) => written.map_err(ComposerError::from),
            Some(Err(e)) => Err(ComposerError::Io(format!("asset writer task failed: {}", e))),
            None => Err(ComposerError::Io(format!(
                "writing the asset timed out after {} ms",
                options.timeout.unwrap_or_default().as_millis()
            ))),
        };

        match result {
            Ok(record) => {
                let asset = record.clone();
                inner.transition_with(SessionState::Completed, |status| {
                    status.asset = Some(asset);
                })?;
                tracing::info!(
                    session_id = %inner.id,
                    slot = %inner.slot,
                    path = %record.path.display(),
                    duration_secs = record.duration_secs,
                    truncated = record.truncated,
                    "Asset finalized"
                );
                inner.deps.events.publish_finalized(
                    inner.id,
                    &inner.slot,
                    record.path.clone(),
                    record.truncated,
                );
                Ok(record)
            }
            Err(err) => {
                tracing::error!(
                    session_id = %inner.id,
                    slot = %inner.slot,
                    error = %err,
                    "Failed to finalize asset"
                );
                let recorded = err.clone();
                inner.transition_with(restore, |status| {
                    status.last_error = Some(recorded);
                })?;
                Err(err)
            }
        }
    }

    /// 销毁会话
    ///
    /// 进行中的生成先被取消；之后句柄上的操作都返回 `InvalidState`
    pub async fn dispose(&self) {
        let _ops = self.inner.ops.lock().await;
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        if self.inner.state().is_active() {
            if let Err(e) = self.cancel_locked().await {
                tracing::debug!(session_id = %self.inner.id, error = %e, "Cancel during dispose skipped");
            }
        }
        self.inner.cancel.cancel();
        self.inner.join_driver().await;
        self.inner.buffer.release();

        tracing::info!(
            session_id = %self.inner.id,
            slot = %self.inner.slot,
            state = %self.inner.state(),
            "Session disposed"
        );
    }
}
