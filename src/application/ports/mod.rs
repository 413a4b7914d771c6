//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod asset_finalizer;
mod credential_provider;
mod generation_client;
mod session_registry;

pub use asset_finalizer::{AssetFinalizerPort, AssetProvenance, AssetRecord, FinalizeError};
pub use credential_provider::{Credential, CredentialError, CredentialProviderPort};
pub use generation_client::{
    ChunkStream, ClientError, GenerationClientPort, GenerationEvent, GenerationRequest,
};
pub use session_registry::{SessionRegistryPort, SlotHistoryEntry};
