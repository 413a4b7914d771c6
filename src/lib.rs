//! Cadenza - 流式文本生成音乐会话管理
//!
//! 架构设计: DDD + CQRS + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Generation Context: 提示词、槽位、会话状态机
//! - Audio Context: 音频块缓冲区、WAV 容器
//!
//! 应用层 (application/):
//! - Ports: 端口定义（GenerationClient, CredentialProvider, AssetFinalizer, SessionRegistry）
//! - Session: 会话句柄与后台驱动任务（重试、续传、取消）
//! - Commands: CQRS 命令处理器
//! - Queries: CQRS 查询处理器
//!
//! 基础设施层 (infrastructure/):
//! - Adapters: HTTP 生成客户端、环境变量凭据、WAV 资产写出
//! - Memory: 按槽位的会话注册表
//! - Events: 会话事件广播

pub mod application;
pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod telemetry;

pub use bootstrap::{build_context, build_context_with, AppContext};
pub use config::{load_config, AppConfig};
pub use telemetry::init_tracing;
