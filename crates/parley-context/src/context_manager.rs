//! Central context manager.
//!
//! [`ContextManager`] owns the ambient [`ContextRecord`] and the token
//! budget policy for the conversation log. All durable state goes through
//! the [`StorageManager`]; the manager itself only caches the ambient record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use parley_core::tokens::{prefix_chars, CHARS_PER_TOKEN};
use parley_core::{estimate_tokens, ContextRecord, Role, StoredMessage};
use parley_settings::{ContextSettings, ParleySettings};
use parley_store::{StorageFault, StorageManager, TrimBudget, TrimReport};
use tracing::{debug, info, warn};

use crate::constants::{CONTEXT_HEADER, TRUNCATION_MARKER};
use crate::location::{
    resolve_place_name, FixedLocationProvider, HttpReverseGeocoder, LocationProvider,
    ReverseGeocoder,
};

/// Where coordinates come from and how they are named.
#[derive(Clone)]
pub struct LocationServices {
    pub provider: Arc<dyn LocationProvider>,
    pub geocoder: Arc<dyn ReverseGeocoder>,
}

// =============================================================================
// ContextManager
// =============================================================================

pub struct ContextManager {
    storage: StorageManager,
    settings: ContextSettings,
    timezone: Tz,
    location: Option<LocationServices>,
    /// Initialized on first use, reset on clear.
    record: Option<ContextRecord>,
}

impl ContextManager {
    pub fn new(storage: StorageManager, settings: ContextSettings) -> Self {
        let timezone = settings.timezone.parse::<Tz>().unwrap_or_else(|_| {
            warn!(timezone = %settings.timezone, "unknown timezone, using UTC");
            Tz::UTC
        });
        Self {
            storage,
            settings,
            timezone,
            location: None,
            record: None,
        }
    }

    /// Attach location enrichment.
    #[must_use]
    pub fn with_location(mut self, services: LocationServices) -> Self {
        self.location = Some(services);
        self
    }

    /// Open storage and wire location enrichment from full settings.
    pub async fn from_settings(settings: &ParleySettings) -> Result<Self, StorageFault> {
        let storage = StorageManager::open(&settings.storage).await?;
        let manager = Self::new(storage, settings.context.clone());
        if !settings.location.enabled {
            return Ok(manager);
        }
        Ok(manager.with_location(LocationServices {
            provider: Arc::new(FixedLocationProvider::from_settings(&settings.location)),
            geocoder: Arc::new(HttpReverseGeocoder::from_settings(&settings.location)),
        }))
    }

    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    pub fn settings(&self) -> &ContextSettings {
        &self.settings
    }

    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.timezone)
    }

    fn fresh_record(&self) -> ContextRecord {
        let mut record = ContextRecord::stamped(&self.now(), self.settings.timezone.clone());
        record.location = self.settings.default_location.clone();
        record
    }

    // ── Messages ────────────────────────────────────────────────────────

    /// Build a message, truncating content beyond the per-message ceiling.
    #[must_use]
    pub fn prepare_message(&self, role: Role, content: &str) -> StoredMessage {
        let limit = self.settings.max_message_tokens;
        if estimate_tokens(content) <= limit {
            return StoredMessage::new(role, content);
        }
        let max_chars = limit as usize * CHARS_PER_TOKEN;
        let truncated = format!("{}{TRUNCATION_MARKER}", prefix_chars(content, max_chars));
        debug!(
            role = %role,
            original_tokens = estimate_tokens(content),
            limit,
            "message truncated"
        );
        StoredMessage::new(role, truncated)
    }

    /// Store a message and return what was stored.
    pub async fn add_message(&self, role: Role, content: &str) -> Result<StoredMessage, StorageFault> {
        let message = self.prepare_message(role, content);
        self.storage.add_message(message.clone()).await?;
        debug!(role = %role, tokens = message.token_count, "message added");
        Ok(message)
    }

    /// The newest messages that fit the prompt budget, oldest first.
    ///
    /// Walks backwards from the most recent message and stops at the first
    /// one that would push `total + reserve` past the ceiling.
    pub async fn get_conversation_messages(&self) -> Result<Vec<StoredMessage>, StorageFault> {
        let mut messages = self.storage.get_all_messages().await?;
        let ceiling = self.settings.max_tokens;
        let reserve = self.settings.reserve_tokens;

        let mut running = 0u64;
        let mut start = messages.len();
        for (idx, message) in messages.iter().enumerate().rev() {
            let next = running + u64::from(message.token_count);
            if next + reserve > ceiling {
                break;
            }
            running = next;
            start = idx;
        }

        if start > 0 {
            debug!(
                dropped = start,
                kept = messages.len() - start,
                total_tokens = running,
                "conversation window truncated"
            );
        }
        Ok(messages.split_off(start))
    }

    /// Evict oldest messages until both the token and count limits hold.
    pub async fn cleanup_old_messages(&self) -> Result<TrimReport, StorageFault> {
        let budget = TrimBudget {
            max_total_tokens: self.settings.max_tokens.saturating_sub(self.settings.reserve_tokens),
            max_messages: self.settings.max_conversation_length,
        };
        self.storage.trim_messages(budget).await
    }

    // ── Ambient context ─────────────────────────────────────────────────

    /// Populate the in-memory record from storage, or a fresh default when
    /// nothing is stored. A load fault leaves the record unset so the stored
    /// one is never overwritten by a default.
    async fn init_record(&mut self) -> Result<&mut ContextRecord, StorageFault> {
        if self.record.is_none() {
            let loaded = self.storage.load_context().await?.map(|s| s.context);
            let record = loaded.unwrap_or_else(|| self.fresh_record());
            self.record = Some(record);
        }
        Ok(self.record.get_or_insert_with(ContextRecord::default))
    }

    fn location_is_stale(&self, record: &ContextRecord) -> bool {
        if self.location.is_none() {
            return false;
        }
        let max_age = i64::try_from(self.settings.location_refresh_secs).unwrap_or(i64::MAX);
        match record.last_location_update {
            None => true,
            Some(at) => (Utc::now() - at).num_seconds() >= max_age,
        }
    }

    /// Resolve the location into the in-memory record without persisting.
    /// Returns whether the location changed.
    async fn resolve_location(&mut self) -> bool {
        let Some(services) = self.location.clone() else {
            debug!("location enrichment not configured");
            return false;
        };
        let coordinates = match services.provider.current_coordinates().await {
            Ok(coordinates) => coordinates,
            Err(e) => {
                warn!(error = %e, "location refresh failed, keeping previous location");
                return false;
            }
        };
        let place = resolve_place_name(services.geocoder.as_ref(), coordinates).await;
        match self.init_record().await {
            Ok(record) => record.set_location(place.as_str(), coordinates),
            Err(e) => {
                warn!(error = %e, "could not load ambient context, location not applied");
                return false;
            }
        }
        info!(location = %place, "location refreshed");
        true
    }

    /// Refresh the location now. Failures keep the previous location and are
    /// only logged, as are persistence failures afterwards.
    pub async fn refresh_location(&mut self) -> bool {
        if !self.resolve_location().await {
            return false;
        }
        if let Err(e) = self.persist_record().await {
            warn!(error = %e, "could not persist refreshed location");
        }
        true
    }

    async fn persist_record(&mut self) -> Result<(), StorageFault> {
        let record = self.init_record().await?.clone();
        self.storage.update_context(record).await
    }

    /// Make sure an up-to-date ambient record exists and is persisted.
    ///
    /// Date and time are always restamped; the location is refreshed when it
    /// was never set or is older than the refresh interval.
    pub async fn ensure_context_available(&mut self) -> Result<(), StorageFault> {
        let now = self.now();
        let timezone = self.settings.timezone.clone();
        let record = self.init_record().await?;
        record.timezone = timezone;
        record.stamp(&now);

        let stale = self.record.as_ref().is_some_and(|r| self.location_is_stale(r));
        if stale {
            self.resolve_location().await;
        }
        self.persist_record().await
    }

    /// A copy of the current ambient record, or a fresh default when the
    /// stored one cannot be loaded.
    pub async fn get_context(&mut self) -> ContextRecord {
        match self.init_record().await {
            Ok(record) => record.clone(),
            Err(e) => {
                warn!(error = %e, "could not load ambient context, using defaults");
                self.fresh_record()
            }
        }
    }

    /// Render the ambient block prefixed to outgoing prompts.
    ///
    /// Refreshes date and time first. A storage failure while doing so is
    /// logged; the in-memory record is rendered, or a temporary default if
    /// none could be loaded.
    pub async fn format_context_for_prompt(&mut self) -> String {
        if let Err(e) = self.ensure_context_available().await {
            warn!(error = %e, "ambient context not persisted");
        }
        match &self.record {
            Some(record) => render_context(record),
            None => render_context(&self.fresh_record()),
        }
    }

    /// Clear all persisted data and start over with a default record.
    pub async fn clear_all_data(&mut self) -> Result<(), StorageFault> {
        self.storage.clear_all().await?;
        self.record = Some(self.fresh_record());
        info!("all conversation data cleared");
        Ok(())
    }
}

fn render_context(record: &ContextRecord) -> String {
    let mut block = format!(
        "{CONTEXT_HEADER}\n- Date: {}\n- Time: {}\n- Timezone: {}\n- Location: {}",
        record.current_date, record.current_time, record.timezone, record.location
    );
    if let Some(coordinates) = record.coordinates {
        block.push_str("\n- Coordinates: ");
        block.push_str(&coordinates.display_pair());
    }
    block
}
