//! End-to-end conversation scenarios run against both storage backends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use parley_context::constants::{MAX_MESSAGE_TOKENS, TRUNCATION_MARKER};
use parley_context::{ChatTurn, ContextManager};
use parley_core::{estimate_tokens, ContextStorage, Role, StoredMessage};
use parley_settings::{BackendPreference, ContextSettings, StorageSettings};
use parley_store::{BackendDriver, BackendKind, StorageFault, StorageManager};
use tempfile::TempDir;

async fn open(backend: BackendPreference) -> (TempDir, ContextManager) {
    let dir = tempfile::tempdir().unwrap();
    let settings = StorageSettings {
        backend,
        ..StorageSettings::in_dir(dir.path())
    };
    let storage = StorageManager::open(&settings).await.unwrap();
    (dir, ContextManager::new(storage, ContextSettings::default()))
}

async fn each_backend() -> Vec<(TempDir, ContextManager)> {
    vec![open(BackendPreference::Sqlite).await, open(BackendPreference::File).await]
}

fn tokens(n: usize) -> String {
    "t".repeat(n * 4)
}

// ── Message log ──

#[tokio::test]
async fn hi_hello_scenario() {
    for (_dir, m) in each_backend().await {
        m.add_message(Role::User, "hi").await.unwrap();
        m.add_message(Role::Assistant, "hello").await.unwrap();

        let all = m.storage().get_all_messages().await.unwrap();
        let summary: Vec<_> = all
            .iter()
            .map(|msg| (msg.role, msg.content.as_str(), msg.token_count))
            .collect();
        assert_eq!(summary, vec![(Role::User, "hi", 1), (Role::Assistant, "hello", 2)]);
        assert_eq!(m.storage().load_context().await.unwrap().unwrap().total_tokens, 3);
    }
}

#[tokio::test]
async fn oversized_message_is_truncated() {
    for (_dir, m) in each_backend().await {
        let original = "w".repeat(MAX_MESSAGE_TOKENS as usize * 4 + 10);
        let stored = m.add_message(Role::User, &original).await.unwrap();

        assert!(stored.content.ends_with(TRUNCATION_MARKER));
        assert_eq!(stored.token_count, estimate_tokens(&stored.content));
        let persisted = &m.storage().get_all_messages().await.unwrap()[0];
        assert_eq!(persisted.content, stored.content);
    }
}

#[tokio::test]
async fn delete_first_of_five_and_eight() {
    for (_dir, m) in each_backend().await {
        let first = m.add_message(Role::User, &tokens(5)).await.unwrap();
        m.add_message(Role::Assistant, &tokens(8)).await.unwrap();

        assert!(m.storage().delete_message(&first.legacy_id()).await.unwrap());

        let storage = m.storage().load_context().await.unwrap().unwrap();
        assert_eq!(storage.messages.len(), 1);
        assert_eq!(storage.total_tokens, 8);
    }
}

#[tokio::test]
async fn update_unknown_id_leaves_record_unchanged() {
    for (_dir, m) in each_backend().await {
        m.add_message(Role::User, "stay").await.unwrap();
        let before = m.storage().load_context().await.unwrap();

        let matched = m
            .storage()
            .update_message("1999-12-31T23:59:59.999Z", StoredMessage::user("nope"))
            .await
            .unwrap();

        assert!(!matched);
        assert_eq!(m.storage().load_context().await.unwrap(), before);
    }
}

#[tokio::test]
async fn search_returns_two_of_three() {
    for (_dir, m) in each_backend().await {
        m.add_message(Role::User, "First USER MESSAGE here").await.unwrap();
        m.add_message(Role::Assistant, "an unrelated answer").await.unwrap();
        m.storage()
            .add_message(StoredMessage::user("terse").with_summary("recap of a user message"))
            .await
            .unwrap();

        let hits = m.storage().search_messages("user message").await.unwrap();
        let contents: Vec<_> = hits.iter().map(|h| h.content.as_str()).collect();
        assert_eq!(contents, vec!["First USER MESSAGE here", "terse"]);
    }
}

#[tokio::test]
async fn date_range_compares_revived_instants() {
    for (_dir, m) in each_backend().await {
        let base = Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap() + Duration::milliseconds(250);
        for i in 0..4 {
            let msg = StoredMessage::at(Role::User, format!("at {i}"), base + Duration::hours(i));
            m.storage().add_message(msg).await.unwrap();
        }
        let hits = m
            .storage()
            .get_messages_by_date_range(base, base + Duration::hours(2))
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].timestamp, base);
    }
}

// ── Budget policy ──

#[tokio::test]
async fn window_and_cleanup_hold_budget() {
    for (_dir, m) in each_backend().await {
        for _ in 0..9 {
            m.add_message(Role::User, &tokens(4_000)).await.unwrap();
        }
        let settings = m.settings().clone();

        let window = m.get_conversation_messages().await.unwrap();
        let window_tokens: u64 = window.iter().map(|w| u64::from(w.token_count)).sum();
        assert!(window_tokens + settings.reserve_tokens <= settings.max_tokens);
        assert_eq!(window.len(), 7);

        let report = m.cleanup_old_messages().await.unwrap();
        let storage = m.storage().load_context().await.unwrap().unwrap();
        assert_eq!(report.remaining, storage.messages.len());
        assert!(storage.messages.len() <= settings.max_conversation_length);
        assert!(storage.total_tokens <= settings.max_tokens - settings.reserve_tokens);
        assert!(storage.is_consistent());
    }
}

#[tokio::test]
async fn cleanup_caps_message_count() {
    for (_dir, m) in each_backend().await {
        for i in 0..55 {
            m.add_message(Role::User, &format!("note {i}")).await.unwrap();
        }
        let report = m.cleanup_old_messages().await.unwrap();
        assert_eq!(report.removed, 5);

        let all = m.storage().get_all_messages().await.unwrap();
        assert_eq!(all.len(), 50);
        assert_eq!(all[0].content, "note 5");
    }
}

// ── Persistence across managers ──

#[tokio::test]
async fn records_survive_reopen() {
    for backend in [BackendPreference::Sqlite, BackendPreference::File] {
        let dir = tempfile::tempdir().unwrap();
        let settings = StorageSettings {
            backend,
            ..StorageSettings::in_dir(dir.path())
        };

        let first = StorageManager::open(&settings).await.unwrap();
        first.add_message(StoredMessage::user("remember me")).await.unwrap();
        let before = first.load_context().await.unwrap().unwrap();
        drop(first);

        let second = StorageManager::open(&settings).await.unwrap();
        let after = second.load_context().await.unwrap().unwrap();
        assert_eq!(after, before);
        assert_eq!(second.backend_kind(), match backend {
            BackendPreference::File => BackendKind::KvFile,
            _ => BackendKind::Sqlite,
        });
    }
}

// ── Faults ──

/// Serves an in-memory record until told to fail.
#[derive(Default)]
struct BrokenDriver {
    broken: AtomicBool,
    stored: Mutex<Option<ContextStorage>>,
}

impl BrokenDriver {
    fn check(&self) -> Result<(), StorageFault> {
        if self.broken.load(Ordering::SeqCst) {
            Err(StorageFault::Io("disk unplugged".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BackendDriver for BrokenDriver {
    fn kind(&self) -> BackendKind {
        BackendKind::KvFile
    }

    fn location(&self) -> String {
        "broken".into()
    }

    async fn save(&self, storage: &ContextStorage) -> Result<(), StorageFault> {
        self.check()?;
        *self.stored.lock().unwrap() = Some(storage.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<ContextStorage>, StorageFault> {
        self.check()?;
        Ok(self.stored.lock().unwrap().clone())
    }

    async fn clear(&self) -> Result<(), StorageFault> {
        self.check()?;
        *self.stored.lock().unwrap() = None;
        Ok(())
    }

    async fn self_test(&self) -> Result<bool, StorageFault> {
        self.check()?;
        Ok(true)
    }
}

fn broken_manager() -> (Arc<BrokenDriver>, ContextManager) {
    let driver = Arc::new(BrokenDriver::default());
    let storage = StorageManager::with_driver(driver.clone());
    (driver, ContextManager::new(storage, ContextSettings::default()))
}

#[tokio::test]
async fn storage_faults_propagate_from_mutations() {
    let (driver, m) = broken_manager();
    let kept = m.add_message(Role::User, "kept").await.unwrap();
    driver.broken.store(true, Ordering::SeqCst);

    assert!(matches!(m.add_message(Role::User, "lost").await, Err(StorageFault::Io(_))));
    assert!(m.storage().update_message(kept.id.as_str(), StoredMessage::user("x")).await.is_err());
    assert!(m.storage().delete_message(kept.id.as_str()).await.is_err());
    assert!(!m.storage().test_storage().await);

    driver.broken.store(false, Ordering::SeqCst);
    let all = m.storage().get_all_messages().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].content, "kept");
}

#[tokio::test]
async fn chat_turn_degrades_when_storage_fails() {
    let (driver, mut m) = broken_manager();
    driver.broken.store(true, Ordering::SeqCst);

    let mut turn = ChatTurn::new(&mut m);
    let payload = turn.begin("are you there?").await;

    assert!(payload.degraded);
    assert_eq!(payload.messages.len(), 1);
    assert_eq!(payload.messages[0].content, "are you there?");
    assert!(payload.context_block.starts_with("Current context:"));
    assert!(turn.finish("yes").await.is_err());
}
