//! Asset Finalizer Port - 把缓冲区写出为音频资产

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::application::error::ComposerError;
use crate::domain::{ChunkBuffer, Prompt, SessionId};

/// 写出错误
#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error("buffer has no chunks")]
    EmptyBuffer,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid audio: {0}")]
    InvalidAudio(String),
}

impl From<FinalizeError> for ComposerError {
    fn from(err: FinalizeError) -> Self {
        match err {
            FinalizeError::EmptyBuffer => ComposerError::EmptyBuffer,
            FinalizeError::Io(e) => ComposerError::Io(e.to_string()),
            FinalizeError::InvalidAudio(m) => ComposerError::Io(m),
        }
    }
}

/// 资产来源信息
#[derive(Debug, Clone)]
pub struct AssetProvenance {
    pub session_id: SessionId,
    pub prompt: Prompt,
}

/// 已写出的音频资产
///
/// 返回后所有权交给宿主
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub path: PathBuf,
    /// 元数据文件（未启用时为 None）
    pub sidecar_path: Option<PathBuf>,
    pub duration_secs: f64,
    pub prompt: Prompt,
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    /// 完成标志未设置时写出的为截断结果
    pub truncated: bool,
    pub chunk_count: usize,
    pub byte_len: u64,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Asset Finalizer Port
#[async_trait]
pub trait AssetFinalizerPort: Send + Sync {
    /// 写出缓冲区内容
    ///
    /// 失败时不得留下部分文件
    async fn finalize(
        &self,
        buffer: &ChunkBuffer,
        destination: &Path,
        name_hint: &str,
        provenance: &AssetProvenance,
    ) -> Result<AssetRecord, FinalizeError>;

    /// 调用方未指定目录时使用
    fn default_destination(&self) -> PathBuf;
}
