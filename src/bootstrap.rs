//! Bootstrap - 依赖装配
//!
//! 根据 `AppConfig` 构建端口实现、会话注册表与 CQRS 处理器

use std::sync::Arc;

use crate::application::commands::handlers::{
    CancelGenerationHandler, DisposeSlotHandler, FinalizeGenerationHandler,
    StartGenerationHandler,
};
use crate::application::ports::{CredentialProviderPort, GenerationClientPort, SessionRegistryPort};
use crate::application::queries::handlers::{
    GetSessionStatusHandler, GetSlotHistoryHandler, ReadPreviewHandler,
};
use crate::application::session::SessionDependencies;
use crate::config::AppConfig;
use crate::infrastructure::adapters::{
    EnvCredentialProvider, HttpGenerationClient, HttpGenerationClientConfig, WavAssetFinalizer,
    WavAssetFinalizerConfig,
};
use crate::infrastructure::events::EventPublisher;
use crate::infrastructure::memory::InMemorySessionRegistry;

/// 宿主持有的应用上下文
pub struct AppContext {
    pub registry: Arc<InMemorySessionRegistry>,
    pub events: Arc<EventPublisher>,

    // Command Handlers
    pub start_generation: StartGenerationHandler,
    pub cancel_generation: CancelGenerationHandler,
    pub finalize_generation: FinalizeGenerationHandler,
    pub dispose_slot: DisposeSlotHandler,

    // Query Handlers
    pub get_session_status: GetSessionStatusHandler,
    pub read_preview: ReadPreviewHandler,
    pub get_slot_history: GetSlotHistoryHandler,
}

/// 使用 HTTP 生成客户端与环境变量凭据构建上下文
pub fn build_context(config: &AppConfig) -> anyhow::Result<AppContext> {
    let client_config = HttpGenerationClientConfig {
        base_url: config.service.url.clone(),
        timeout_secs: config.service.timeout_secs,
        connect_timeout_secs: config.service.connect_timeout_secs,
        supports_resume: config.service.supports_resume,
        max_frame_bytes: config.service.max_frame_bytes,
    };
    let client = HttpGenerationClient::new(client_config)
        .map_err(|e| anyhow::anyhow!("Failed to create generation client: {}", e))?;
    let credentials = EnvCredentialProvider::new(config.credential.env_var.clone());

    Ok(build_context_with(
        config,
        Arc::new(client),
        Arc::new(credentials),
    ))
}

/// 使用给定的客户端与凭据构建上下文
pub fn build_context_with(
    config: &AppConfig,
    client: Arc<dyn GenerationClientPort>,
    credentials: Arc<dyn CredentialProviderPort>,
) -> AppContext {
    let finalizer = WavAssetFinalizer::new(WavAssetFinalizerConfig {
        output_dir: config.storage.output_dir.clone(),
        write_sidecar: config.storage.write_sidecar,
    });
    let events = EventPublisher::with_capacity(config.session.event_capacity).arc();

    let deps = SessionDependencies {
        client,
        credentials,
        finalizer: Arc::new(finalizer),
        events: events.clone(),
        settings: config.session_settings(),
    };
    let registry = InMemorySessionRegistry::new(deps).arc();
    let port: Arc<dyn SessionRegistryPort> = registry.clone();

    tracing::debug!(
        service = %config.service.url,
        max_retries = config.retry.max_retries,
        "Application context assembled"
    );

    AppContext {
        registry,
        events,
        start_generation: StartGenerationHandler::new(port.clone()),
        cancel_generation: CancelGenerationHandler::new(port.clone()),
        finalize_generation: FinalizeGenerationHandler::new(port.clone()),
        dispose_slot: DisposeSlotHandler::new(port.clone()),
        get_session_status: GetSessionStatusHandler::new(port.clone()),
        read_preview: ReadPreviewHandler::new(port.clone()),
        get_slot_history: GetSlotHistoryHandler::new(port),
    }
}
