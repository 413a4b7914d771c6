//! Generation Query Handlers

use std::sync::Arc;

use crate::application::error::{ComposerError, ErrorKind, SuggestedAction};
use crate::application::ports::{AssetRecord, SessionRegistryPort, SlotHistoryEntry};
use crate::application::queries::{GetSessionStatus, GetSlotHistory, ReadPreview};
use crate::domain::{SessionId, SessionState, SlotId};

// ============================================================================
// Response DTOs
// ============================================================================

/// 会话状态响应
#[derive(Debug, Clone)]
pub struct SessionStatusResponse {
    pub session_id: SessionId,
    pub slot: SlotId,
    pub state: SessionState,
    pub retry_count: u32,
    /// 原样展示给用户的错误
    pub last_error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub suggested_action: SuggestedAction,
    pub stream_complete: bool,
    pub chunk_count: usize,
    pub playable_bytes: u64,
    /// 已接收音频时长（秒）
    pub playable_secs: f64,
    pub epoch: u64,
    pub asset: Option<AssetRecord>,
    pub updated_at: String,
}

/// 预览切片响应
#[derive(Debug, Clone)]
pub struct PreviewResponse {
    pub epoch: u64,
    /// 调用方持有的 epoch 已过期，data 从 0 开始
    pub restarted: bool,
    pub offset: u64,
    pub data: Vec<u8>,
    pub playable_bytes: u64,
    pub complete: bool,
}

impl PreviewResponse {
    /// 下一次读取的偏移
    pub fn next_offset(&self) -> u64 {
        self.offset + self.data.len() as u64
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GetSessionStatus Handler
pub struct GetSessionStatusHandler {
    registry: Arc<dyn SessionRegistryPort>,
}

impl GetSessionStatusHandler {
    pub fn new(registry: Arc<dyn SessionRegistryPort>) -> Self {
        Self { registry }
    }

    pub fn handle(&self, query: GetSessionStatus) -> Result<SessionStatusResponse, ComposerError> {
        let session = self.registry.get(&query.slot).ok_or_else(|| {
            ComposerError::invalid_state(format!("no session in slot {}", query.slot))
        })?;
        let status = session.status();
        let spec = session.audio_spec();

        Ok(SessionStatusResponse {
            session_id: status.session_id,
            slot: status.slot,
            state: status.state,
            retry_count: status.retry_count,
            last_error: status.last_error.as_ref().map(|e| e.to_string()),
            error_kind: status.last_error.as_ref().map(ComposerError::kind),
            suggested_action: status
                .last_error
                .as_ref()
                .map(ComposerError::suggested_action)
                .unwrap_or(SuggestedAction::None),
            stream_complete: status.stream_complete,
            chunk_count: status.chunk_count,
            playable_bytes: status.playable_bytes,
            playable_secs: spec.duration_secs(status.playable_bytes),
            epoch: status.epoch,
            asset: status.asset,
            updated_at: status.updated_at.to_rfc3339(),
        })
    }
}

/// ReadPreview Handler - 增量读取可播放音频
pub struct ReadPreviewHandler {
    registry: Arc<dyn SessionRegistryPort>,
}

impl ReadPreviewHandler {
    pub fn new(registry: Arc<dyn SessionRegistryPort>) -> Self {
        Self { registry }
    }

    pub fn handle(&self, query: ReadPreview) -> Result<PreviewResponse, ComposerError> {
        let session = self.registry.get(&query.slot).ok_or_else(|| {
            ComposerError::invalid_state(format!("no session in slot {}", query.slot))
        })?;

        let mut slice = session.read_since(query.offset)?;
        let restarted = query.epoch.is_some_and(|epoch| epoch != slice.epoch);
        if restarted && query.offset > 0 {
            slice = session.read_since(0)?;
        }

        Ok(PreviewResponse {
            epoch: slice.epoch,
            restarted,
            offset: slice.offset,
            data: slice.data,
            playable_bytes: slice.playable_bytes,
            complete: slice.complete,
        })
    }
}

/// GetSlotHistory Handler
pub struct GetSlotHistoryHandler {
    registry: Arc<dyn SessionRegistryPort>,
}

impl GetSlotHistoryHandler {
    pub fn new(registry: Arc<dyn SessionRegistryPort>) -> Self {
        Self { registry }
    }

    pub fn handle(&self, query: GetSlotHistory) -> Vec<SlotHistoryEntry> {
        self.registry.history(&query.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::session::{
        FinalizeOptions, RetryPolicy, SessionDependencies, SessionSettings,
    };
    use crate::domain::Prompt;
    use crate::infrastructure::adapters::{
        FakeGenerationClient, FakeGenerationScript, StaticCredentialProvider, WavAssetFinalizer,
    };
    use crate::infrastructure::events::EventPublisher;
    use crate::infrastructure::memory::InMemorySessionRegistry;
    use std::time::Duration;

    fn registry(script: FakeGenerationScript) -> Arc<InMemorySessionRegistry> {
        InMemorySessionRegistry::new(SessionDependencies {
            client: FakeGenerationClient::new(script).arc(),
            credentials: Arc::new(StaticCredentialProvider::new("sk-test")),
            finalizer: Arc::new(WavAssetFinalizer::default()),
            events: EventPublisher::new().arc(),
            settings: SessionSettings {
                retry: RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2)),
                ..Default::default()
            },
        })
        .arc()
    }

    #[tokio::test]
    async fn test_status_reports_error_and_action() {
        let registry = registry(FakeGenerationScript {
            fail_first: 1,
            failure: crate::application::ports::ClientError::Quota("billing".to_string()),
            ..Default::default()
        });
        let slot = SlotId::new("track-1");
        let session = registry
            .begin_session(slot.clone(), Prompt::new("lofi"))
            .await
            .unwrap();
        session.wait_until_settled().await;

        let handler = GetSessionStatusHandler::new(registry.clone());
        let status = handler
            .handle(GetSessionStatus { slot: slot.clone() })
            .unwrap();
        assert_eq!(status.state, SessionState::Failed);
        assert_eq!(status.error_kind, Some(ErrorKind::Quota));
        assert_eq!(status.suggested_action, SuggestedAction::CheckCredential);
        assert!(status.last_error.unwrap().contains("billing"));

        assert!(matches!(
            handler.handle(GetSessionStatus {
                slot: SlotId::new("missing")
            }),
            Err(ComposerError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_preview_reads_incrementally_and_detects_restart() {
        let registry = registry(FakeGenerationScript {
            chunk_count: 4,
            interrupt: Some((2, 1)),
            ..Default::default()
        });
        let slot = SlotId::new("track-1");
        let session = registry
            .begin_session(slot.clone(), Prompt::new("lofi"))
            .await
            .unwrap();
        let status = session.wait_until_settled().await;
        assert_eq!(status.epoch, 1);

        let handler = ReadPreviewHandler::new(registry.clone());

        // 调用方还停留在 epoch 0 的中途
        let preview = handler
            .handle(ReadPreview {
                slot: slot.clone(),
                offset: 4800,
                epoch: Some(0),
            })
            .unwrap();
        assert!(preview.restarted);
        assert_eq!(preview.offset, 0);
        assert_eq!(preview.data.len() as u64, status.playable_bytes);

        let next = handler
            .handle(ReadPreview {
                slot,
                offset: preview.next_offset(),
                epoch: Some(preview.epoch),
            })
            .unwrap();
        assert!(!next.restarted);
        assert!(next.data.is_empty());
        assert!(next.complete);
    }

    #[tokio::test]
    async fn test_history_lists_replaced_sessions() {
        let registry = registry(FakeGenerationScript::default());
        let slot = SlotId::new("track-1");
        let first = registry
            .begin_session(slot.clone(), Prompt::new("lofi"))
            .await
            .unwrap();
        first.wait_until_settled().await;
        let dir = tempfile::tempdir().unwrap();
        first
            .finalize_with(FinalizeOptions::complete().with_destination(dir.path()))
            .await
            .unwrap();
        registry
            .begin_session(slot.clone(), Prompt::new("jazz"))
            .await
            .unwrap();

        let history = GetSlotHistoryHandler::new(registry.clone())
            .handle(GetSlotHistory { slot: slot.clone() });
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].outcome, SessionState::Completed);
        assert!(history[0].message.starts_with("saved to"));
        assert_eq!(history[0].asset, first.status().asset);
        assert_eq!(history[1].prompt.text(), "jazz");
        registry.dispose(&slot).await.unwrap();
    }
}
