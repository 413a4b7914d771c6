//! Session Registry Port - 按槽位管理生成会话

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::application::error::ComposerError;
use crate::application::ports::AssetRecord;
use crate::application::session::{SessionHandle, SessionStatus};
use crate::domain::{Prompt, SessionId, SessionState, SlotId};

/// 槽位历史中的一条记录：一次提示词及其结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotHistoryEntry {
    pub session_id: SessionId,
    pub prompt: Prompt,
    pub outcome: SessionState,
    /// 展示给用户的结果说明
    pub message: String,
    pub asset: Option<AssetRecord>,
    pub recorded_at: DateTime<Utc>,
}

impl SlotHistoryEntry {
    pub fn from_status(prompt: Prompt, status: &SessionStatus) -> Self {
        let message = match (&status.asset, &status.last_error) {
            (Some(asset), _) => format!("saved to {}", asset.path.display()),
            (None, Some(err)) if status.state == SessionState::Failed => err.to_string(),
            _ => format!("{} with {} chunks", status.state, status.chunk_count),
        };
        Self {
            session_id: status.session_id,
            prompt,
            outcome: status.state,
            message,
            asset: status.asset.clone(),
            recorded_at: Utc::now(),
        }
    }
}

/// Session Registry Port
///
/// 每个槽位同时最多一个活跃会话
#[async_trait]
pub trait SessionRegistryPort: Send + Sync {
    /// 在槽位上开始新会话，已有会话先被取消
    ///
    /// 新会话的前置检查失败时已有会话保持不变
    async fn begin_session(&self, slot: SlotId, prompt: Prompt)
        -> Result<SessionHandle, ComposerError>;

    fn get(&self, slot: &SlotId) -> Option<SessionHandle>;

    /// 释放会话缓冲区并使句柄失效
    async fn dispose(&self, slot: &SlotId) -> Result<(), ComposerError>;

    /// 当前被占用的槽位
    fn slots(&self) -> Vec<SlotId>;

    /// 槽位上最近的提示词与结果，旧的在前，当前会话在最后
    fn history(&self, slot: &SlotId) -> Vec<SlotHistoryEntry>;
}
