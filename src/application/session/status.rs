//! 会话状态快照

use chrono::{DateTime, Utc};

use crate::application::error::ComposerError;
use crate::application::ports::AssetRecord;
use crate::domain::{SessionId, SessionState, SlotId};

/// 会话状态快照
///
/// 通过 `watch` 通道发布，每次状态迁移或追加音频块后更新
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub session_id: SessionId,
    pub slot: SlotId,
    pub state: SessionState,
    /// 已执行的自动重试次数
    pub retry_count: u32,
    /// 最近一次错误（重试中的瞬时错误或终态原因）
    pub last_error: Option<ComposerError>,
    /// 服务端已确认生成完成，等待 finalize
    pub stream_complete: bool,
    pub chunk_count: usize,
    pub playable_bytes: u64,
    pub epoch: u64,
    pub asset: Option<AssetRecord>,
    pub updated_at: DateTime<Utc>,
}

impl SessionStatus {
    pub fn new(session_id: SessionId, slot: SlotId) -> Self {
        Self {
            session_id,
            slot,
            state: SessionState::Idle,
            retry_count: 0,
            last_error: None,
            stream_complete: false,
            chunk_count: 0,
            playable_bytes: 0,
            epoch: 0,
            asset: None,
            updated_at: Utc::now(),
        }
    }

    /// 终态，或流已完成等待 finalize
    pub fn is_settled(&self) -> bool {
        self.state.is_terminal() || (self.state == SessionState::Streaming && self.stream_complete)
    }

    pub(super) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settled() {
        let mut status = SessionStatus::new(SessionId::new(), SlotId::new("track-1"));
        assert!(!status.is_settled());

        status.state = SessionState::Streaming;
        assert!(!status.is_settled());

        status.stream_complete = true;
        assert!(status.is_settled());

        status.state = SessionState::Cancelled;
        status.stream_complete = false;
        assert!(status.is_settled());
    }
}
