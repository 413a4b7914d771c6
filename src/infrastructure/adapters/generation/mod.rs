//! Generation Adapter - 远程音乐生成服务客户端实现

mod fake_generation_client;
pub mod frame_codec;
mod http_generation_client;

pub use fake_generation_client::{FakeGenerationClient, FakeGenerationScript};
pub use frame_codec::{Frame, FrameCodec, FrameError};
pub use http_generation_client::*;
