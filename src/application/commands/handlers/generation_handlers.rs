//! Generation Command Handlers

use std::sync::Arc;

use crate::application::commands::generation_commands::*;
use crate::application::error::ComposerError;
use crate::application::ports::{AssetRecord, SessionRegistryPort};
use crate::application::session::{FinalizeOptions, SessionHandle};
use crate::domain::{Prompt, SlotId};

fn require_session(
    registry: &dyn SessionRegistryPort,
    slot: &SlotId,
) -> Result<SessionHandle, ComposerError> {
    registry
        .get(slot)
        .ok_or_else(|| ComposerError::invalid_state(format!("no session in slot {}", slot)))
}

/// StartGeneration Handler - 在槽位上开始新会话
pub struct StartGenerationHandler {
    registry: Arc<dyn SessionRegistryPort>,
}

impl StartGenerationHandler {
    pub fn new(registry: Arc<dyn SessionRegistryPort>) -> Self {
        Self { registry }
    }

    pub async fn handle(
        &self,
        cmd: StartGenerationCommand,
    ) -> Result<StartGenerationResponse, ComposerError> {
        let mut prompt = Prompt::new(cmd.text);
        if let Some(secs) = cmd.duration_secs {
            prompt = prompt.with_duration_secs(secs);
        }
        if let Some(style) = cmd.style {
            prompt = prompt.with_style(style);
        }
        if let Some(seed) = cmd.seed {
            prompt = prompt.with_seed(seed);
        }

        let session = self.registry.begin_session(cmd.slot.clone(), prompt).await?;

        Ok(StartGenerationResponse {
            session_id: session.id(),
            slot: cmd.slot,
            state: session.state(),
        })
    }
}

/// CancelGeneration Handler
pub struct CancelGenerationHandler {
    registry: Arc<dyn SessionRegistryPort>,
}

impl CancelGenerationHandler {
    pub fn new(registry: Arc<dyn SessionRegistryPort>) -> Self {
        Self { registry }
    }

    pub async fn handle(
        &self,
        cmd: CancelGenerationCommand,
    ) -> Result<CancelGenerationResponse, ComposerError> {
        let session = require_session(self.registry.as_ref(), &cmd.slot)?;
        session.cancel().await?;

        let status = session.status();
        Ok(CancelGenerationResponse {
            session_id: status.session_id,
            chunk_count: status.chunk_count,
            playable_bytes: status.playable_bytes,
        })
    }
}

/// FinalizeGeneration Handler - 写出资产并返回给宿主
pub struct FinalizeGenerationHandler {
    registry: Arc<dyn SessionRegistryPort>,
}

impl FinalizeGenerationHandler {
    pub fn new(registry: Arc<dyn SessionRegistryPort>) -> Self {
        Self { registry }
    }

    pub async fn handle(&self, cmd: FinalizeGenerationCommand) -> Result<AssetRecord, ComposerError> {
        let session = require_session(self.registry.as_ref(), &cmd.slot)?;
        session
            .finalize_with(FinalizeOptions {
                partial: cmd.partial,
                destination: cmd.destination,
                name_hint: cmd.name_hint,
                timeout: cmd.timeout,
            })
            .await
    }
}

/// DisposeSlot Handler - 释放会话与缓冲区
pub struct DisposeSlotHandler {
    registry: Arc<dyn SessionRegistryPort>,
}

impl DisposeSlotHandler {
    pub fn new(registry: Arc<dyn SessionRegistryPort>) -> Self {
        Self { registry }
    }

    pub async fn handle(&self, cmd: DisposeSlotCommand) -> Result<(), ComposerError> {
        self.registry.dispose(&cmd.slot).await
    }
}
