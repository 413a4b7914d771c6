//! Memory Layer - In-Memory State Management
//!
//! 按槽位管理生成会话的内存状态

mod session_registry;

pub use session_registry::InMemorySessionRegistry;
