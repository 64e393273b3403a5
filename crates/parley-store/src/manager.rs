//! Message-level operations over the single persisted record.
//!
//! Every public operation reloads the record from the active driver; there
//! is no cache across calls. Mutations run load → mutate → save under one
//! write gate, so concurrent callers cannot lose each other's updates.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parley_core::{instant, ContextRecord, ContextStorage, Role, StoredMessage};
use parley_settings::StorageSettings;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::driver::{BackendDriver, BackendKind};
use crate::error::StorageFault;
use crate::probe::select_backend;

/// Limits applied by [`StorageManager::trim_messages`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrimBudget {
    pub max_total_tokens: u64,
    pub max_messages: usize,
}

/// Outcome of a trim.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrimReport {
    pub removed: usize,
    pub remaining: usize,
    pub total_tokens: u64,
}

/// Backend metadata plus message aggregates.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub backend: BackendKind,
    pub location: String,
    pub message_count: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub total_tokens: u64,
    #[serde(with = "instant::option")]
    pub oldest: Option<DateTime<Utc>>,
    #[serde(with = "instant::option")]
    pub newest: Option<DateTime<Utc>>,
    #[serde(with = "instant::option")]
    pub last_updated: Option<DateTime<Utc>>,
}

enum Commit<T> {
    Save(ContextStorage, T),
    Skip(T),
}

pub struct StorageManager {
    driver: Arc<dyn BackendDriver>,
    write_gate: Mutex<()>,
}

impl StorageManager {
    /// Probe for a backend once and keep it for the manager's lifetime.
    pub async fn open(settings: &StorageSettings) -> Result<Self, StorageFault> {
        Ok(Self::with_driver(select_backend(settings).await?))
    }

    pub fn with_driver(driver: Arc<dyn BackendDriver>) -> Self {
        Self {
            driver,
            write_gate: Mutex::new(()),
        }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.driver.kind()
    }

    pub fn location(&self) -> String {
        self.driver.location()
    }

    async fn commit<T, F>(&self, op: &'static str, mutate: F) -> Result<T, StorageFault>
    where
        F: FnOnce(ContextStorage) -> Commit<T> + Send,
        T: Send,
    {
        let _gate = self.write_gate.lock().await;
        let current = self.driver.load().await?.unwrap_or_default();
        match mutate(current) {
            Commit::Save(mut storage, out) => {
                storage.recompute_totals();
                storage.touch();
                self.driver.save(&storage).await?;
                debug!(
                    op,
                    count = storage.messages.len(),
                    total_tokens = storage.total_tokens,
                    "storage committed"
                );
                Ok(out)
            }
            Commit::Skip(out) => {
                debug!(op, "nothing to commit");
                Ok(out)
            }
        }
    }

    /// Persist `storage` as-is.
    pub async fn save_context(&self, storage: &ContextStorage) -> Result<(), StorageFault> {
        let _gate = self.write_gate.lock().await;
        self.driver.save(storage).await
    }

    pub async fn load_context(&self) -> Result<Option<ContextStorage>, StorageFault> {
        self.driver.load().await
    }

    /// Append `message`, creating the default record if none exists.
    pub async fn add_message(&self, message: StoredMessage) -> Result<(), StorageFault> {
        self.commit("add_message", move |mut storage| {
            storage.push(message);
            Commit::Save(storage, ())
        })
        .await
    }

    pub async fn get_all_messages(&self) -> Result<Vec<StoredMessage>, StorageFault> {
        Ok(self
            .driver
            .load()
            .await?
            .map(|storage| storage.messages)
            .unwrap_or_default())
    }

    pub async fn get_messages_by_role(&self, role: Role) -> Result<Vec<StoredMessage>, StorageFault> {
        let mut messages = self.get_all_messages().await?;
        messages.retain(|m| m.role == role);
        Ok(messages)
    }

    /// Messages with `start <= timestamp <= end`.
    pub async fn get_messages_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StoredMessage>, StorageFault> {
        let mut messages = self.get_all_messages().await?;
        messages.retain(|m| m.timestamp >= start && m.timestamp <= end);
        Ok(messages)
    }

    /// Case-insensitive substring match on content or summary.
    pub async fn search_messages(&self, query: &str) -> Result<Vec<StoredMessage>, StorageFault> {
        Ok(self
            .driver
            .load()
            .await?
            .map(|storage| storage.search(query))
            .unwrap_or_default())
    }

    /// Replace the message named by `id` in place.
    ///
    /// `id` is either the generated id or the legacy timestamp id. The
    /// replacement keeps the original generated id and its token count is
    /// derived from its content. Returns `false` without saving when nothing
    /// matches.
    pub async fn update_message(
        &self,
        id: &str,
        updated: StoredMessage,
    ) -> Result<bool, StorageFault> {
        self.commit("update_message", move |mut storage| match storage.position(id) {
            Some(idx) => {
                let mut replacement = updated;
                replacement.id = storage.messages[idx].id.clone();
                replacement.recount_tokens();
                storage.messages[idx] = replacement;
                Commit::Save(storage, true)
            }
            None => Commit::Skip(false),
        })
        .await
    }

    /// Remove the message named by `id`. Returns `false` without saving when
    /// nothing matches.
    pub async fn delete_message(&self, id: &str) -> Result<bool, StorageFault> {
        self.commit("delete_message", move |mut storage| match storage.position(id) {
            Some(idx) => {
                storage.messages.remove(idx);
                Commit::Save(storage, true)
            }
            None => Commit::Skip(false),
        })
        .await
    }

    /// Replace the ambient context sub-record.
    pub async fn update_context(&self, context: ContextRecord) -> Result<(), StorageFault> {
        self.commit("update_context", move |mut storage| {
            storage.context = context;
            Commit::Save(storage, ())
        })
        .await
    }

    /// Drop the oldest messages until the log fits `budget`.
    ///
    /// Token eviction runs first, then the count cap removes any surplus.
    /// Saves only when something was removed.
    pub async fn trim_messages(&self, budget: TrimBudget) -> Result<TrimReport, StorageFault> {
        self.commit("trim_messages", move |mut storage| {
            let len = storage.messages.len();
            let mut total = storage.message_tokens();
            let mut cut = 0;
            while total > budget.max_total_tokens && cut < len {
                total -= u64::from(storage.messages[cut].token_count);
                cut += 1;
            }
            cut = cut.max(len.saturating_sub(budget.max_messages));

            if cut == 0 {
                let report = TrimReport {
                    removed: 0,
                    remaining: len,
                    total_tokens: total,
                };
                return Commit::Skip(report);
            }

            storage.messages.drain(..cut);
            let report = TrimReport {
                removed: cut,
                remaining: storage.messages.len(),
                total_tokens: storage.message_tokens(),
            };
            info!(
                removed = report.removed,
                remaining = report.remaining,
                total_tokens = report.total_tokens,
                "trimmed conversation log"
            );
            Commit::Save(storage, report)
        })
        .await
    }

    pub async fn clear_all(&self) -> Result<(), StorageFault> {
        let _gate = self.write_gate.lock().await;
        self.driver.clear().await?;
        info!(backend = %self.driver.kind(), "storage cleared");
        Ok(())
    }

    /// Round-trip a probe value through the backend. Faults count as `false`.
    pub async fn test_storage(&self) -> bool {
        match self.driver.self_test().await {
            Ok(true) => true,
            Ok(false) => {
                warn!(backend = %self.driver.kind(), "storage self test read back a different value");
                false
            }
            Err(e) => {
                warn!(backend = %self.driver.kind(), error = %e, "storage self test failed");
                false
            }
        }
    }

    pub async fn get_storage_stats(&self) -> Result<StorageStats, StorageFault> {
        let storage = self.driver.load().await?;
        let messages = storage.as_ref().map(|s| s.messages.as_slice()).unwrap_or_default();
        let count_role = |role: Role| messages.iter().filter(|m| m.role == role).count();
        Ok(StorageStats {
            backend: self.driver.kind(),
            location: self.driver.location(),
            message_count: messages.len(),
            user_messages: count_role(Role::User),
            assistant_messages: count_role(Role::Assistant),
            total_tokens: storage.as_ref().map(|s| s.total_tokens).unwrap_or(0),
            oldest: messages.iter().map(|m| m.timestamp).min(),
            newest: messages.iter().map(|m| m.timestamp).max(),
            last_updated: storage.as_ref().map(|s| s.last_updated),
        })
    }
}
