//! In-Memory Session Registry Implementation
//!
//! 同一槽位的替换由槽位级异步锁串行化，不同槽位互不阻塞

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::application::error::ComposerError;
use crate::application::ports::{SessionRegistryPort, SlotHistoryEntry};
use crate::application::session::{SessionDependencies, SessionHandle};
use crate::domain::{Prompt, SlotId};

/// 每个槽位保留的历史条数
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// 内存会话注册表
pub struct InMemorySessionRegistry {
    deps: SessionDependencies,
    sessions: DashMap<SlotId, SessionHandle>,
    slot_locks: DashMap<SlotId, Arc<Mutex<()>>>,
    history: DashMap<SlotId, VecDeque<SlotHistoryEntry>>,
    history_limit: usize,
}

impl InMemorySessionRegistry {
    pub fn new(deps: SessionDependencies) -> Self {
        Self {
            deps,
            sessions: DashMap::new(),
            slot_locks: DashMap::new(),
            history: DashMap::new(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn slot_lock(&self, slot: &SlotId) -> Arc<Mutex<()>> {
        self.slot_locks
            .entry(slot.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// 没有其他调用方在等待时移除槽位锁
    ///
    /// 判断与移除在同一个分片锁内完成，新来的调用方要么拿到旧锁，要么创建新锁
    fn release_slot_lock(&self, slot: &SlotId) {
        // map 中一份，调用方手里一份
        self.slot_locks
            .remove_if(slot, |_, lock| Arc::strong_count(lock) <= 2);
    }

    /// 活跃（Requesting / Streaming）会话数量
    pub fn active_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.value().state().is_active())
            .count()
    }

    fn record_history(&self, session: &SessionHandle) {
        if self.history_limit == 0 {
            return;
        }
        let Some(prompt) = session.prompt().cloned() else {
            return;
        };
        let entry = SlotHistoryEntry::from_status(prompt, &session.status());
        let mut history = self.history.entry(session.slot().clone()).or_default();
        history.push_back(entry);
        while history.len() > self.history_limit {
            history.pop_front();
        }
    }
}

#[async_trait]
impl SessionRegistryPort for InMemorySessionRegistry {
    async fn begin_session(
        &self,
        slot: SlotId,
        prompt: Prompt,
    ) -> Result<SessionHandle, ComposerError> {
        if slot.is_empty() {
            return Err(ComposerError::invalid_state("slot id must not be empty"));
        }

        let lock = self.slot_lock(&slot);
        let _guard = lock.lock().await;

        // 提示词或凭据无效时不替换已有会话
        let session = SessionHandle::new(slot.clone(), self.deps.clone());
        let request = session.prepare(prompt)?;

        if let Some((_, previous)) = self.sessions.remove(&slot) {
            tracing::info!(
                slot = %slot,
                session_id = %previous.id(),
                state = %previous.state(),
                "Evicting previous session"
            );
            previous.dispose().await;
            self.record_history(&previous);
            self.deps
                .events
                .publish_session_evicted(previous.id(), &slot);
        }

        session.launch(request).await?;
        self.sessions.insert(slot, session.clone());
        Ok(session)
    }

    fn get(&self, slot: &SlotId) -> Option<SessionHandle> {
        self.sessions.get(slot).map(|entry| entry.value().clone())
    }

    async fn dispose(&self, slot: &SlotId) -> Result<(), ComposerError> {
        let lock = self.slot_lock(slot);
        let guard = lock.lock().await;

        let (_, session) = self
            .sessions
            .remove(slot)
            .ok_or_else(|| ComposerError::invalid_state(format!("no session in slot {}", slot)))?;
        session.dispose().await;
        self.history.remove(slot);
        self.deps.events.unregister_slot(slot);
        tracing::info!(slot = %slot, session_id = %session.id(), "Slot disposed");

        drop(guard);
        self.release_slot_lock(slot);
        Ok(())
    }

    fn slots(&self) -> Vec<SlotId> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    fn history(&self, slot: &SlotId) -> Vec<SlotHistoryEntry> {
        let mut entries: Vec<SlotHistoryEntry> = self
            .history
            .get(slot)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default();
        if let Some(current) = self.get(slot) {
            if let Some(prompt) = current.prompt().cloned() {
                entries.push(SlotHistoryEntry::from_status(prompt, &current.status()));
            }
        }
        entries
    }
}
