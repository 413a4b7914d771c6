//! Audio Context - 音频块与流格式

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// PCM 流格式（交错、小端、有符号整数）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl Default for AudioSpec {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            bits_per_sample: 16,
        }
    }
}

impl AudioSpec {
    /// 单帧字节数（所有声道的一个采样）
    pub fn block_align(&self) -> u64 {
        self.channels as u64 * (self.bits_per_sample as u64 / 8)
    }

    pub fn byte_rate(&self) -> u64 {
        self.sample_rate as u64 * self.block_align()
    }

    /// 向下对齐到完整帧边界
    pub fn align_down(&self, bytes: u64) -> u64 {
        let align = self.block_align();
        if align == 0 {
            return 0;
        }
        bytes - bytes % align
    }

    /// 给定字节数对应的时长（秒）
    pub fn duration_secs(&self, bytes: u64) -> f64 {
        let rate = self.byte_rate();
        if rate == 0 {
            return 0.0;
        }
        bytes as f64 / rate as f64
    }
}

/// 流式音频块
///
/// 不变量: 追加进缓冲区后不再修改
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub sequence: u64,
    pub payload: Bytes,
    pub is_final: bool,
}

impl AudioChunk {
    pub fn new(sequence: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence,
            payload: payload.into(),
            is_final: false,
        }
    }

    pub fn final_chunk(sequence: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence,
            payload: payload.into(),
            is_final: true,
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_spec() {
        let spec = AudioSpec::default();
        assert_eq!(spec.block_align(), 4);
        assert_eq!(spec.byte_rate(), 192_000);
        assert!((spec.duration_secs(192_000) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_align_down() {
        let spec = AudioSpec::default();
        assert_eq!(spec.align_down(10), 8);
        assert_eq!(spec.align_down(12), 12);
        assert_eq!(spec.align_down(3), 0);
    }
}
