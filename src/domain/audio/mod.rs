//! Audio Context - 音频块、缓冲区与 WAV 容器

mod buffer;
mod chunk;
pub mod wav;

pub use buffer::{BufferError, ChunkBuffer, PlayableAudio, PreviewSlice};
pub use chunk::{AudioChunk, AudioSpec};
pub use wav::{WavError, WavInfo};
