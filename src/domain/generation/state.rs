//! Generation Context - Session State
//!
//! 状态流转:
//! Idle → Requesting → Streaming → {Completed | Cancelled | Failed}
//! Streaming → Finalizing → Completed
//! Cancelled → Finalizing → Completed（保存部分结果）

use serde::{Deserialize, Serialize};

/// 生成会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// 尚未发起请求
    #[default]
    Idle,
    /// 请求已发出，等待首个音频块
    Requesting,
    /// 正在接收音频块
    Streaming,
    /// 正在写出音频文件
    Finalizing,
    /// 已生成资产
    Completed,
    /// 已取消，缓冲区保留
    Cancelled,
    /// 失败
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Requesting => "requesting",
            SessionState::Streaming => "streaming",
            SessionState::Finalizing => "finalizing",
            SessionState::Completed => "completed",
            SessionState::Cancelled => "cancelled",
            SessionState::Failed => "failed",
        }
    }

    /// 终态不再接受 start
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Cancelled | SessionState::Failed
        )
    }

    /// 是否仍有进行中的远程调用
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Requesting | SessionState::Streaming)
    }

    /// 状态机允许的迁移
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Requesting)
                | (Requesting, Streaming)
                | (Requesting, Cancelled)
                | (Requesting, Failed)
                | (Streaming, Cancelled)
                | (Streaming, Failed)
                | (Streaming, Finalizing)
                | (Cancelled, Finalizing)
                | (Finalizing, Completed)
                | (Finalizing, Streaming)
                | (Finalizing, Cancelled)
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Cancelled.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::Streaming.is_terminal());
        assert!(!SessionState::Finalizing.is_terminal());
    }

    #[test]
    fn test_transitions() {
        assert!(SessionState::Idle.can_transition_to(SessionState::Requesting));
        assert!(SessionState::Requesting.can_transition_to(SessionState::Cancelled));
        assert!(SessionState::Cancelled.can_transition_to(SessionState::Finalizing));
        assert!(!SessionState::Requesting.can_transition_to(SessionState::Finalizing));
        assert!(!SessionState::Completed.can_transition_to(SessionState::Requesting));
        assert!(!SessionState::Failed.can_transition_to(SessionState::Finalizing));
        assert!(!SessionState::Cancelled.can_transition_to(SessionState::Streaming));
    }
}
