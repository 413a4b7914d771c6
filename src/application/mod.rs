//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（GenerationClient、CredentialProvider、AssetFinalizer、SessionRegistry）
//! - session: 生成会话状态机
//! - commands: CQRS 命令及处理器
//! - queries: CQRS 查询及处理器
//! - error: 应用层错误定义

pub mod commands;
pub mod error;
pub mod ports;
pub mod queries;
pub mod session;

// Re-exports
pub use commands::{
    CancelGenerationCommand, CancelGenerationResponse, DisposeSlotCommand,
    FinalizeGenerationCommand, StartGenerationCommand, StartGenerationResponse,
    // Handlers
    handlers::{
        CancelGenerationHandler, DisposeSlotHandler, FinalizeGenerationHandler,
        StartGenerationHandler,
    },
};

pub use error::{ComposerError, ErrorKind, SuggestedAction};

pub use ports::{
    // Asset finalizer
    AssetFinalizerPort,
    AssetProvenance,
    AssetRecord,
    FinalizeError,
    // Credential provider
    Credential,
    CredentialError,
    CredentialProviderPort,
    // Generation client
    ChunkStream,
    ClientError,
    GenerationClientPort,
    GenerationEvent,
    GenerationRequest,
    // Session registry
    SessionRegistryPort,
    SlotHistoryEntry,
};

pub use queries::{
    GetSessionStatus, GetSlotHistory, ReadPreview,
    // Handlers
    handlers::{
        GetSessionStatusHandler, GetSlotHistoryHandler, PreviewResponse, ReadPreviewHandler,
        SessionStatusResponse,
    },
};

pub use session::{
    FinalizeOptions, RetryPolicy, SessionDependencies, SessionHandle, SessionSettings,
    SessionStatus,
};
