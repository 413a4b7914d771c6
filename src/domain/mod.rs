//! Domain Layer - 领域层
//!
//! 包含两个限界上下文:
//! - Generation Context: 提示词、会话标识与状态机
//! - Audio Context: 音频块、缓冲区、WAV 容器

pub mod audio;
pub mod generation;

pub use audio::{
    AudioChunk, AudioSpec, BufferError, ChunkBuffer, PlayableAudio, PreviewSlice, WavError, WavInfo,
};
pub use generation::{Prompt, PromptError, PromptLimits, SessionId, SessionState, SlotId};
