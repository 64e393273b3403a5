use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::MessageId;
use crate::instant;
use crate::messages::StoredMessage;

/// Location text used until enrichment succeeds.
pub const DEFAULT_LOCATION: &str = "Unknown location";

/// A latitude/longitude pair.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// `"lat, lng"` with four decimals, the fallback place name.
    pub fn display_pair(&self) -> String {
        format!("{:.4}, {:.4}", self.lat, self.lng)
    }
}

/// Ambient date/time/location attached to prompts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextRecord {
    pub current_date: String,
    pub current_time: String,
    pub timezone: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(default, with = "instant::option", skip_serializing_if = "Option::is_none")]
    pub last_location_update: Option<DateTime<Utc>>,
}

impl ContextRecord {
    /// A record stamped with `now` in the given timezone.
    pub fn stamped<Tz>(now: &DateTime<Tz>, timezone: impl Into<String>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let mut record = Self {
            current_date: String::new(),
            current_time: String::new(),
            timezone: timezone.into(),
            location: DEFAULT_LOCATION.to_string(),
            coordinates: None,
            last_location_update: None,
        };
        record.stamp(now);
        record
    }

    /// Refresh the date and time fields from `now`.
    pub fn stamp<Tz>(&mut self, now: &DateTime<Tz>)
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        self.current_date = now.format("%A, %B %-d, %Y").to_string();
        self.current_time = now.format("%-I:%M %p").to_string();
    }

    /// Record a successful location refresh.
    pub fn set_location(&mut self, location: impl Into<String>, coordinates: Coordinates) {
        self.location = location.into();
        self.coordinates = Some(coordinates);
        self.last_location_update = Some(instant::now());
    }
}

impl Default for ContextRecord {
    fn default() -> Self {
        Self::stamped(&Utc::now(), "UTC")
    }
}

/// The single persisted unit: message log, ambient context and the
/// aggregate token count.
///
/// Invariant after every committed write:
/// `total_tokens == messages.iter().map(|m| m.token_count).sum()`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextStorage {
    pub messages: Vec<StoredMessage>,
    pub context: ContextRecord,
    pub total_tokens: u64,
    #[serde(with = "instant")]
    pub last_updated: DateTime<Utc>,
}

impl ContextStorage {
    /// The one constructor every code path uses to synthesize a record.
    pub fn new(context: ContextRecord) -> Self {
        Self {
            messages: Vec::new(),
            context,
            total_tokens: 0,
            last_updated: instant::now(),
        }
    }

    /// Sum of the per-message token counts.
    pub fn message_tokens(&self) -> u64 {
        self.messages.iter().map(|m| u64::from(m.token_count)).sum()
    }

    /// Restore the token invariant.
    pub fn recompute_totals(&mut self) {
        self.total_tokens = self.message_tokens();
    }

    pub fn is_consistent(&self) -> bool {
        self.total_tokens == self.message_tokens()
    }

    /// Append a message and account for its tokens.
    pub fn push(&mut self, message: StoredMessage) {
        self.total_tokens += u64::from(message.token_count);
        self.messages.push(message);
    }

    /// Position of the message named by `id`.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.matches_id(id))
    }

    /// Stamp `last_updated` with the current instant.
    pub fn touch(&mut self) {
        self.last_updated = instant::now();
    }

    /// Messages whose content or summary contains `query`, ignoring case.
    pub fn search(&self, query: &str) -> Vec<StoredMessage> {
        let needle = query.to_lowercase();
        self.messages
            .iter()
            .filter(|m| m.contains_lowercase(&needle))
            .cloned()
            .collect()
    }
}

impl ContextStorage {
    /// Give every id-less message its stable legacy id. Returns how many
    /// messages were assigned one.
    pub fn assign_missing_ids(&mut self) -> usize {
        let mut assigned = 0;
        for (position, message) in self.messages.iter_mut().enumerate() {
            if message.id.is_unassigned() {
                message.id = MessageId::legacy(message.timestamp.timestamp_millis(), position);
                assigned += 1;
            }
        }
        assigned
    }
}

impl Default for ContextStorage {
    fn default() -> Self {
        Self::new(ContextRecord::default())
    }
}
