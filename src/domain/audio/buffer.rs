//! Chunk Buffer - 流式音频块缓冲区
//!
//! 单写多读:
//! - 只有会话驱动任务追加
//! - 预览读取方拿到的是一致前缀（块在加锁前已完整构建）
//! - `playable_bytes` / `epoch` 通过原子变量无锁读取

use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

use super::{AudioChunk, AudioSpec};

/// 缓冲区错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("chunk sequence out of order: expected {expected}, received {received}")]
    Desync { expected: u64, received: u64 },

    #[error("buffer is frozen")]
    Frozen,
}

#[derive(Debug, Default)]
struct BufferInner {
    chunks: Vec<AudioChunk>,
    total_bytes: u64,
    complete: bool,
    frozen: bool,
    epoch: u64,
}

/// 可播放音频快照
#[derive(Debug, Clone, Default)]
pub struct PlayableAudio {
    /// 重置计数，变化时预览必须从头播放
    pub epoch: u64,
    pub chunk_count: usize,
    /// 已接收字节数（可能含半帧）
    pub total_bytes: u64,
    /// 对齐到帧边界的可解码字节数
    pub playable_bytes: u64,
    pub complete: bool,
    pub frozen: bool,
    segments: Vec<Bytes>,
}

impl PlayableAudio {
    /// 拼接可解码部分
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.playable_bytes as usize);
        let mut remaining = self.playable_bytes as usize;
        for segment in &self.segments {
            if remaining == 0 {
                break;
            }
            let take = segment.len().min(remaining);
            out.extend_from_slice(&segment[..take]);
            remaining -= take;
        }
        out
    }

    /// 可解码部分的分段视图（最后一段可能被截断到帧边界）
    pub fn segments(&self) -> impl Iterator<Item = Bytes> + '_ {
        let mut remaining = self.playable_bytes as usize;
        self.segments.iter().filter_map(move |segment| {
            if remaining == 0 {
                return None;
            }
            let take = segment.len().min(remaining);
            remaining -= take;
            Some(segment.slice(..take))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_count == 0
    }
}

/// 增量预览切片
#[derive(Debug, Clone, Default)]
pub struct PreviewSlice {
    pub epoch: u64,
    /// 本切片起始偏移
    pub offset: u64,
    pub data: Vec<u8>,
    pub playable_bytes: u64,
    pub complete: bool,
}

/// 音频块缓冲区
#[derive(Debug)]
pub struct ChunkBuffer {
    spec: AudioSpec,
    inner: RwLock<BufferInner>,
    playable_bytes: AtomicU64,
    epoch: AtomicU64,
}

impl ChunkBuffer {
    pub fn new(spec: AudioSpec) -> Self {
        Self {
            spec,
            inner: RwLock::new(BufferInner::default()),
            playable_bytes: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn spec(&self) -> AudioSpec {
        self.spec
    }

    fn read(&self) -> RwLockReadGuard<'_, BufferInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BufferInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// 追加音频块，返回新的可播放字节数
    ///
    /// 序号必须等于 `next_sequence()`，否则返回 `Desync`
    pub fn append(&self, chunk: AudioChunk) -> Result<u64, BufferError> {
        let mut inner = self.write();
        if inner.frozen {
            return Err(BufferError::Frozen);
        }

        let expected = inner.chunks.len() as u64;
        if chunk.sequence != expected {
            return Err(BufferError::Desync {
                expected,
                received: chunk.sequence,
            });
        }

        inner.total_bytes += chunk.payload.len() as u64;
        if chunk.is_final {
            inner.complete = true;
            inner.frozen = true;
        }
        inner.chunks.push(chunk);

        let playable = self.spec.align_down(inner.total_bytes);
        self.playable_bytes.store(playable, Ordering::Release);
        Ok(playable)
    }

    /// 当前一致前缀的快照
    pub fn read_playable_through(&self) -> PlayableAudio {
        let inner = self.read();
        PlayableAudio {
            epoch: inner.epoch,
            chunk_count: inner.chunks.len(),
            total_bytes: inner.total_bytes,
            playable_bytes: self.spec.align_down(inner.total_bytes),
            complete: inner.complete,
            frozen: inner.frozen,
            segments: inner.chunks.iter().map(|c| c.payload.clone()).collect(),
        }
    }

    /// 读取 `offset` 之后的可解码字节
    pub fn read_since(&self, offset: u64) -> PreviewSlice {
        let inner = self.read();
        let playable = self.spec.align_down(inner.total_bytes);
        let mut data = Vec::new();

        if offset < playable {
            data.reserve((playable - offset) as usize);
            let mut position = 0u64;
            for chunk in &inner.chunks {
                let start = position;
                let end = position + chunk.payload.len() as u64;
                position = end;
                if end <= offset {
                    continue;
                }
                if start >= playable {
                    break;
                }
                let from = offset.saturating_sub(start) as usize;
                let to = (end.min(playable) - start) as usize;
                data.extend_from_slice(&chunk.payload[from..to]);
            }
        }

        PreviewSlice {
            epoch: inner.epoch,
            offset,
            data,
            playable_bytes: playable,
            complete: inner.complete,
        }
    }

    /// 冻结缓冲区，返回最终可播放长度
    pub fn freeze(&self) -> u64 {
        let mut inner = self.write();
        inner.frozen = true;
        self.spec.align_down(inner.total_bytes)
    }

    /// 服务端确认生成完成
    pub fn mark_complete(&self) {
        let mut inner = self.write();
        inner.complete = true;
        inner.frozen = true;
    }

    /// 丢弃所有块并进入新 epoch（从头重试）
    pub fn reset(&self) -> Result<u64, BufferError> {
        let mut inner = self.write();
        if inner.frozen {
            return Err(BufferError::Frozen);
        }
        inner.chunks.clear();
        inner.total_bytes = 0;
        inner.complete = false;
        inner.epoch += 1;
        self.playable_bytes.store(0, Ordering::Release);
        self.epoch.store(inner.epoch, Ordering::Release);
        Ok(inner.epoch)
    }

    /// 释放缓冲内容（会话销毁）
    pub fn release(&self) {
        let mut inner = self.write();
        inner.chunks = Vec::new();
        inner.total_bytes = 0;
        inner.frozen = true;
        self.playable_bytes.store(0, Ordering::Release);
    }

    pub fn is_complete(&self) -> bool {
        self.read().complete
    }

    pub fn is_frozen(&self) -> bool {
        self.read().frozen
    }

    pub fn chunk_count(&self) -> usize {
        self.read().chunks.len()
    }

    /// 下一个期望的块序号（断点续传偏移）
    pub fn next_sequence(&self) -> u64 {
        self.read().chunks.len() as u64
    }

    pub fn playable_bytes(&self) -> u64 {
        self.playable_bytes.load(Ordering::Acquire)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn chunk(sequence: u64, fill: u8, len: usize) -> AudioChunk {
        AudioChunk::new(sequence, vec![fill; len])
    }

    #[test]
    fn test_append_in_order() {
        let buffer = ChunkBuffer::new(AudioSpec::default());
        for i in 0..4 {
            buffer.append(chunk(i, i as u8, 8)).unwrap();
        }

        let audio = buffer.read_playable_through();
        assert_eq!(audio.chunk_count, 4);
        assert_eq!(audio.playable_bytes, 32);

        let bytes = audio.to_vec();
        for i in 0..4 {
            assert!(bytes[i * 8..(i + 1) * 8].iter().all(|&b| b == i as u8));
        }
    }

    #[test]
    fn test_gap_is_desync() {
        let buffer = ChunkBuffer::new(AudioSpec::default());
        buffer.append(chunk(0, 0, 4)).unwrap();

        let err = buffer.append(chunk(2, 2, 4)).unwrap_err();
        assert_eq!(
            err,
            BufferError::Desync {
                expected: 1,
                received: 2
            }
        );
        assert_eq!(buffer.chunk_count(), 1);
    }

    #[test]
    fn test_duplicate_is_desync() {
        let buffer = ChunkBuffer::new(AudioSpec::default());
        buffer.append(chunk(0, 0, 4)).unwrap();
        assert!(matches!(
            buffer.append(chunk(0, 0, 4)),
            Err(BufferError::Desync { expected: 1, received: 0 })
        ));
    }

    #[test]
    fn test_playable_boundary_is_frame_aligned() {
        let buffer = ChunkBuffer::new(AudioSpec::default());
        buffer.append(chunk(0, 1, 6)).unwrap();
        assert_eq!(buffer.playable_bytes(), 4);
        assert_eq!(buffer.read_playable_through().to_vec().len(), 4);

        buffer.append(chunk(1, 2, 2)).unwrap();
        assert_eq!(buffer.playable_bytes(), 8);
    }

    #[test]
    fn test_read_since() {
        let buffer = ChunkBuffer::new(AudioSpec::default());
        buffer.append(chunk(0, 1, 8)).unwrap();
        buffer.append(chunk(1, 2, 8)).unwrap();

        let slice = buffer.read_since(4);
        assert_eq!(slice.data.len(), 12);
        assert_eq!(&slice.data[..4], &[1, 1, 1, 1]);
        assert_eq!(&slice.data[4..], &[2; 8]);

        let empty = buffer.read_since(16);
        assert!(empty.data.is_empty());
        assert_eq!(empty.playable_bytes, 16);
    }

    #[test]
    fn test_freeze_rejects_append() {
        let buffer = ChunkBuffer::new(AudioSpec::default());
        buffer.append(chunk(0, 0, 4)).unwrap();
        assert_eq!(buffer.freeze(), 4);
        assert_eq!(buffer.append(chunk(1, 0, 4)), Err(BufferError::Frozen));
        assert!(!buffer.is_complete());
    }

    #[test]
    fn test_final_chunk_completes() {
        let buffer = ChunkBuffer::new(AudioSpec::default());
        buffer.append(chunk(0, 0, 4)).unwrap();
        buffer
            .append(AudioChunk::final_chunk(1, vec![0u8; 4]))
            .unwrap();
        assert!(buffer.is_complete());
        assert!(buffer.is_frozen());
    }

    #[test]
    fn test_reset_bumps_epoch() {
        let buffer = ChunkBuffer::new(AudioSpec::default());
        buffer.append(chunk(0, 0, 4)).unwrap();
        buffer.append(chunk(1, 0, 4)).unwrap();

        assert_eq!(buffer.reset(), Ok(1));
        assert_eq!(buffer.epoch(), 1);
        assert_eq!(buffer.chunk_count(), 0);
        assert_eq!(buffer.playable_bytes(), 0);
        assert_eq!(buffer.next_sequence(), 0);

        buffer.freeze();
        assert_eq!(buffer.reset(), Err(BufferError::Frozen));
    }

    #[test]
    fn test_concurrent_reader_sees_consistent_prefix() {
        let buffer = Arc::new(ChunkBuffer::new(AudioSpec::default()));
        let writer = {
            let buffer = buffer.clone();
            std::thread::spawn(move || {
                for i in 0..500u64 {
                    buffer.append(chunk(i, (i % 251) as u8, 64)).unwrap();
                }
                buffer.mark_complete();
            })
        };

        loop {
            let audio = buffer.read_playable_through();
            assert_eq!(audio.playable_bytes, audio.chunk_count as u64 * 64);
            let bytes = audio.to_vec();
            for (index, block) in bytes.chunks(64).enumerate() {
                assert!(block.iter().all(|&b| b == (index % 251) as u8));
            }
            if audio.complete {
                assert_eq!(audio.chunk_count, 500);
                break;
            }
        }

        writer.join().unwrap();
    }
}
