use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::MessageId;
use crate::instant;
use crate::tokens::estimate_tokens;

/// Who authored a stored message.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// One entry of the conversation log.
///
/// `token_count` is derived from `content` when the message is built and is
/// carried as-is afterwards. Records written before ids existed deserialize
/// with an unassigned `id`; [`ContextStorage::assign_missing_ids`] fills it.
///
/// [`ContextStorage::assign_missing_ids`]: crate::ContextStorage::assign_missing_ids
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    #[serde(default = "MessageId::unassigned")]
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    #[serde(with = "instant")]
    pub timestamp: DateTime<Utc>,
    pub token_count: u32,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub is_summarized: bool,
}

impl StoredMessage {
    /// Build a message stamped with the current instant.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self::at(role, content, instant::now())
    }

    /// Build a message with an explicit timestamp, truncated to milliseconds.
    pub fn at(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        let content = content.into();
        let timestamp = timestamp.trunc_subsecs(3);
        Self {
            id: MessageId::new(),
            role,
            token_count: estimate_tokens(&content),
            content,
            timestamp,
            summary: String::new(),
            is_summarized: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Attach a summary and mark the message as summarized.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self.is_summarized = true;
        self
    }

    /// Timestamp-derived identifier used by older clients.
    pub fn legacy_id(&self) -> String {
        instant::format(&self.timestamp)
    }

    /// Whether `id` names this message, by generated id or legacy id.
    pub fn matches_id(&self, id: &str) -> bool {
        self.id.as_str() == id || self.legacy_id() == id
    }

    /// Re-derive `token_count` from the current content.
    pub fn recount_tokens(&mut self) {
        self.token_count = estimate_tokens(&self.content);
    }

    /// Case-insensitive match against content or summary. `needle` must
    /// already be lowercased.
    pub(crate) fn contains_lowercase(&self, needle: &str) -> bool {
        self.content.to_lowercase().contains(needle) || self.summary.to_lowercase().contains(needle)
    }
}
