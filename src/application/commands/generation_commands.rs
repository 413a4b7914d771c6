//! Generation Commands - 生成会话相关命令

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::{SessionId, SessionState, SlotId};

/// 开始生成命令 - 槽位上已有的会话会被取消并替换
#[derive(Debug, Clone)]
pub struct StartGenerationCommand {
    pub slot: SlotId,
    pub text: String,
    pub duration_secs: Option<u32>,
    pub style: Option<String>,
    pub seed: Option<u64>,
}

impl StartGenerationCommand {
    pub fn new(slot: impl Into<SlotId>, text: impl Into<String>) -> Self {
        Self {
            slot: slot.into(),
            text: text.into(),
            duration_secs: None,
            style: None,
            seed: None,
        }
    }

    pub fn with_duration_secs(mut self, secs: u32) -> Self {
        self.duration_secs = Some(secs);
        self
    }
}

/// 开始生成响应
#[derive(Debug, Clone)]
pub struct StartGenerationResponse {
    pub session_id: SessionId,
    pub slot: SlotId,
    pub state: SessionState,
}

/// 取消生成命令
#[derive(Debug, Clone)]
pub struct CancelGenerationCommand {
    pub slot: SlotId,
}

/// 取消生成响应
#[derive(Debug, Clone)]
pub struct CancelGenerationResponse {
    pub session_id: SessionId,
    pub chunk_count: usize,
    pub playable_bytes: u64,
}

/// 写出资产命令
#[derive(Debug, Clone)]
pub struct FinalizeGenerationCommand {
    pub slot: SlotId,
    /// 允许写出未完成的结果
    pub partial: bool,
    pub destination: Option<PathBuf>,
    pub name_hint: Option<String>,
    pub timeout: Option<Duration>,
}

impl FinalizeGenerationCommand {
    pub fn new(slot: impl Into<SlotId>, partial: bool) -> Self {
        Self {
            slot: slot.into(),
            partial,
            destination: None,
            name_hint: None,
            timeout: None,
        }
    }

    pub fn with_destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = Some(destination.into());
        self
    }
}

/// 释放槽位命令
#[derive(Debug, Clone)]
pub struct DisposeSlotCommand {
    pub slot: SlotId,
}
