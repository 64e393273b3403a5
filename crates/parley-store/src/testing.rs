//! In-memory driver for manager tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use parley_core::ContextStorage;

use crate::driver::{decode, encode, BackendDriver, BackendKind, RECORD_KEY};
use crate::error::StorageFault;

/// Keeps the encoded record in memory, counts saves and can be told to fail.
/// Every call yields once so concurrent callers interleave.
#[derive(Default)]
pub(crate) struct RecordingDriver {
    raw: Mutex<Option<String>>,
    saves: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingDriver {
    pub(crate) fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StorageFault> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageFault::Unavailable("recording driver offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl BackendDriver for RecordingDriver {
    fn kind(&self) -> BackendKind {
        BackendKind::KvFile
    }

    fn location(&self) -> String {
        "memory".into()
    }

    async fn save(&self, storage: &ContextStorage) -> Result<(), StorageFault> {
        tokio::task::yield_now().await;
        self.check()?;
        *self.raw.lock() = Some(encode(storage)?);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self) -> Result<Option<ContextStorage>, StorageFault> {
        tokio::task::yield_now().await;
        self.check()?;
        let raw = self.raw.lock().clone();
        raw.map(|raw| decode(RECORD_KEY, &raw)).transpose()
    }

    async fn clear(&self) -> Result<(), StorageFault> {
        self.check()?;
        *self.raw.lock() = None;
        Ok(())
    }

    async fn self_test(&self) -> Result<bool, StorageFault> {
        self.check()?;
        Ok(true)
    }
}
