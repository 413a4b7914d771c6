//! 生成服务流式响应的二进制帧编解码
//!
//! 帧格式（大端）:
//!
//! ```text
//! +--------+----------------+-------------+-----------------+
//! | kind u8| sequence u64   | length u32  | payload         |
//! +--------+----------------+-------------+-----------------+
//! ```
//!
//! - `0x01` 音频块
//! - `0x02` 最后一个音频块
//! - `0x03` 流结束
//! - `0x04` 提示词被过滤（payload 为 UTF-8 原因）
//! - `0x05` 服务端错误（payload 为 UTF-8 消息，可重试）

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::application::ports::ClientError;

pub const FRAME_HEADER_LEN: usize = 13;
pub const DEFAULT_MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

const KIND_CHUNK: u8 = 0x01;
const KIND_FINAL_CHUNK: u8 = 0x02;
const KIND_END: u8 = 0x03;
const KIND_FILTERED: u8 = 0x04;
const KIND_SERVICE_ERROR: u8 = 0x05;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Chunk { sequence: u64, payload: Bytes },
    FinalChunk { sequence: u64, payload: Bytes },
    End,
    Filtered(String),
    ServiceError(String),
}

impl Frame {
    fn kind(&self) -> u8 {
        match self {
            Frame::Chunk { .. } => KIND_CHUNK,
            Frame::FinalChunk { .. } => KIND_FINAL_CHUNK,
            Frame::End => KIND_END,
            Frame::Filtered(_) => KIND_FILTERED,
            Frame::ServiceError(_) => KIND_SERVICE_ERROR,
        }
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("failed to read response body: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Malformed(String),
}

impl From<FrameError> for ClientError {
    fn from(err: FrameError) -> Self {
        match err {
            // 连接中断或帧被截断
            FrameError::Io(e) => ClientError::TransientService(e.to_string()),
            FrameError::Malformed(m) => ClientError::Protocol(m),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_bytes: usize,
}

impl FrameCodec {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self { max_frame_bytes }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        if src.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let mut header = &src[..FRAME_HEADER_LEN];
        let kind = header.get_u8();
        let sequence = header.get_u64();
        let len = header.get_u32() as usize;

        if !(KIND_CHUNK..=KIND_SERVICE_ERROR).contains(&kind) {
            return Err(FrameError::Malformed(format!("unknown frame kind 0x{:02x}", kind)));
        }
        if len > self.max_frame_bytes {
            return Err(FrameError::Malformed(format!(
                "frame of {} bytes exceeds limit of {}",
                len, self.max_frame_bytes
            )));
        }
        if src.len() < FRAME_HEADER_LEN + len {
            src.reserve(FRAME_HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(FRAME_HEADER_LEN);
        let payload = src.split_to(len).freeze();

        let frame = match kind {
            KIND_CHUNK => Frame::Chunk { sequence, payload },
            KIND_FINAL_CHUNK => Frame::FinalChunk { sequence, payload },
            KIND_END => Frame::End,
            KIND_FILTERED => Frame::Filtered(String::from_utf8_lossy(&payload).into_owned()),
            _ => Frame::ServiceError(String::from_utf8_lossy(&payload).into_owned()),
        };
        Ok(Some(frame))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        let kind = frame.kind();
        let (sequence, payload) = match frame {
            Frame::Chunk { sequence, payload } | Frame::FinalChunk { sequence, payload } => {
                (sequence, payload)
            }
            Frame::End => (0, Bytes::new()),
            Frame::Filtered(text) | Frame::ServiceError(text) => (0, Bytes::from(text)),
        };
        if payload.len() > self.max_frame_bytes {
            return Err(FrameError::Malformed(format!(
                "frame of {} bytes exceeds limit of {}",
                payload.len(),
                self.max_frame_bytes
            )));
        }

        dst.reserve(FRAME_HEADER_LEN + payload.len());
        dst.put_u8(kind);
        dst.put_u64(sequence);
        dst.put_u32(payload.len() as u32);
        dst.extend_from_slice(&payload);
        Ok(())
    }
}
