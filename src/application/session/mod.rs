//! Session State Machine - 单次生成会话的生命周期
//!
//! - `SessionHandle`: 宿主持有的可克隆句柄（start / cancel / finalize / dispose）
//! - 驱动任务: 每个会话一个 tokio 任务，负责拉流、追加音频块与重试
//! - `SessionStatus`: 通过 watch 通道观察的状态快照

mod driver;
mod handle;
mod retry;
mod status;

pub use handle::{FinalizeOptions, SessionDependencies, SessionHandle, SessionSettings};
pub use retry::RetryPolicy;
pub use status::SessionStatus;
