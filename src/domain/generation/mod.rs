//! Generation Context - 生成会话上下文
//!
//! 提示词、会话/槽位标识与会话状态机

mod errors;
mod state;
mod value_objects;

pub use errors::PromptError;
pub use state::SessionState;
pub use value_objects::{Prompt, PromptLimits, SessionId, SlotId};
