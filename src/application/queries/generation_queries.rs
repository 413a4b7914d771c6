//! Generation Queries - 会话状态与预览读取

use crate::domain::SlotId;

/// 查询槽位上会话的状态
#[derive(Debug, Clone)]
pub struct GetSessionStatus {
    pub slot: SlotId,
}

/// 读取偏移之后的可播放音频
#[derive(Debug, Clone)]
pub struct ReadPreview {
    pub slot: SlotId,
    /// 上次读取结束的字节偏移
    pub offset: u64,
    /// 上次读取时的 epoch
    pub epoch: Option<u64>,
}

/// 查询槽位上最近的提示词与结果
#[derive(Debug, Clone)]
pub struct GetSlotHistory {
    pub slot: SlotId,
}
