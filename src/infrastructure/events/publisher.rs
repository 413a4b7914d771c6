//! Event Publisher Implementation
//!
//! 会话事件广播，宿主 UI 订阅后无需轮询

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::domain::{SessionId, SessionState, SlotId};

const DEFAULT_CAPACITY: usize = 256;

/// 会话事件类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SessionEvent {
    /// 状态迁移
    StateChanged {
        session_id: SessionId,
        slot: SlotId,
        from: SessionState,
        to: SessionState,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// 追加了音频块
    ChunkAppended {
        session_id: SessionId,
        slot: SlotId,
        sequence: u64,
        playable_bytes: u64,
    },
    /// 瞬时错误，稍后重试
    RetryScheduled {
        session_id: SessionId,
        slot: SlotId,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    /// 已丢弃缓冲区从头生成，预览需要重新开始
    Restarted {
        session_id: SessionId,
        slot: SlotId,
        epoch: u64,
    },
    /// 服务端确认生成完成
    StreamCompleted {
        session_id: SessionId,
        slot: SlotId,
        chunk_count: usize,
    },
    /// 资产已写出
    Finalized {
        session_id: SessionId,
        slot: SlotId,
        path: PathBuf,
        truncated: bool,
    },
    /// 槽位上的旧会话被新会话替换
    SessionEvicted { session_id: SessionId, slot: SlotId },
}

impl SessionEvent {
    pub fn slot(&self) -> &SlotId {
        match self {
            SessionEvent::StateChanged { slot, .. }
            | SessionEvent::ChunkAppended { slot, .. }
            | SessionEvent::RetryScheduled { slot, .. }
            | SessionEvent::Restarted { slot, .. }
            | SessionEvent::StreamCompleted { slot, .. }
            | SessionEvent::Finalized { slot, .. }
            | SessionEvent::SessionEvicted { slot, .. } => slot,
        }
    }
}

/// 事件发布器
pub struct EventPublisher {
    /// slot -> broadcast sender（槽位相关事件）
    slot_channels: DashMap<SlotId, broadcast::Sender<SessionEvent>>,
    /// 全局广播通道
    global_channel: broadcast::Sender<SessionEvent>,
    capacity: usize,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (global_tx, _) = broadcast::channel(capacity);
        Self {
            slot_channels: DashMap::new(),
            global_channel: global_tx,
            capacity,
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 订阅所有槽位的事件
    pub fn subscribe_global(&self) -> broadcast::Receiver<SessionEvent> {
        self.global_channel.subscribe()
    }

    /// 订阅单个槽位的事件（跨会话保持有效）
    pub fn subscribe_slot(&self, slot: &SlotId) -> broadcast::Receiver<SessionEvent> {
        self.slot_channels
            .entry(slot.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// 取消槽位通道
    pub fn unregister_slot(&self, slot: &SlotId) {
        self.slot_channels.remove(slot);
    }

    pub fn publish_state_changed(
        &self,
        session_id: SessionId,
        slot: &SlotId,
        from: SessionState,
        to: SessionState,
        error: Option<String>,
    ) {
        self.publish(SessionEvent::StateChanged {
            session_id,
            slot: slot.clone(),
            from,
            to,
            error,
        });
    }

    pub fn publish_chunk_appended(
        &self,
        session_id: SessionId,
        slot: &SlotId,
        sequence: u64,
        playable_bytes: u64,
    ) {
        self.publish(SessionEvent::ChunkAppended {
            session_id,
            slot: slot.clone(),
            sequence,
            playable_bytes,
        });
    }

    pub fn publish_retry_scheduled(
        &self,
        session_id: SessionId,
        slot: &SlotId,
        attempt: u32,
        delay_ms: u64,
        error: &str,
    ) {
        self.publish(SessionEvent::RetryScheduled {
            session_id,
            slot: slot.clone(),
            attempt,
            delay_ms,
            error: error.to_string(),
        });
    }

    pub fn publish_restarted(&self, session_id: SessionId, slot: &SlotId, epoch: u64) {
        self.publish(SessionEvent::Restarted {
            session_id,
            slot: slot.clone(),
            epoch,
        });
    }

    pub fn publish_stream_completed(&self, session_id: SessionId, slot: &SlotId, chunk_count: usize) {
        self.publish(SessionEvent::StreamCompleted {
            session_id,
            slot: slot.clone(),
            chunk_count,
        });
    }

    pub fn publish_finalized(
        &self,
        session_id: SessionId,
        slot: &SlotId,
        path: PathBuf,
        truncated: bool,
    ) {
        self.publish(SessionEvent::Finalized {
            session_id,
            slot: slot.clone(),
            path,
            truncated,
        });
    }

    pub fn publish_session_evicted(&self, session_id: SessionId, slot: &SlotId) {
        self.publish(SessionEvent::SessionEvicted {
            session_id,
            slot: slot.clone(),
        });
    }

    /// 发布到全局通道与对应槽位通道
    fn publish(&self, event: SessionEvent) {
        if let Some(sender) = self.slot_channels.get(event.slot()) {
            if let Err(e) = sender.send(event.clone()) {
                tracing::trace!(
                    slot = %e.0.slot(),
                    "Failed to publish slot event (no receivers)"
                );
            }
        }
        if let Err(e) = self.global_channel.send(event) {
            tracing::trace!(
                slot = %e.0.slot(),
                "Failed to publish event (no receivers)"
            );
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_slot_and_global_delivery() {
        let publisher = EventPublisher::new();
        let slot = SlotId::new("track-1");
        let other = SlotId::new("track-2");
        let mut global = publisher.subscribe_global();
        let mut slot_rx = publisher.subscribe_slot(&slot);

        let session_id = SessionId::new();
        publisher.publish_restarted(session_id, &other, 1);
        publisher.publish_chunk_appended(session_id, &slot, 0, 4096);

        assert!(matches!(
            global.recv().await.unwrap(),
            SessionEvent::Restarted { epoch: 1, .. }
        ));
        assert!(matches!(
            global.recv().await.unwrap(),
            SessionEvent::ChunkAppended { sequence: 0, .. }
        ));
        // 槽位通道只收到本槽位事件
        assert!(matches!(
            slot_rx.recv().await.unwrap(),
            SessionEvent::ChunkAppended { playable_bytes: 4096, .. }
        ));
        assert!(slot_rx.try_recv().is_err());
    }

    #[test]
    fn test_publish_without_receivers_is_silent() {
        let publisher = EventPublisher::with_capacity(4);
        publisher.publish_session_evicted(SessionId::new(), &SlotId::new("a"));
    }

    #[test]
    fn test_event_serialization() {
        let event = SessionEvent::StateChanged {
            session_id: SessionId::new(),
            slot: SlotId::new("a"),
            from: SessionState::Requesting,
            to: SessionState::Streaming,
            error: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "StateChanged");
        assert_eq!(json["data"]["to"], "streaming");
        assert!(json["data"].get("error").is_none());
    }
}
