//! Token budget and ambient context settings.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Budget policy for the conversation log plus ambient-context defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextSettings {
    /// Token ceiling for the prompt payload.
    pub max_tokens: u64,
    /// Headroom kept free for the new prompt and ambient context.
    pub reserve_tokens: u64,
    /// Ceiling on any single stored message.
    pub max_message_tokens: u32,
    /// Hard cap on stored message count.
    pub max_conversation_length: usize,
    /// IANA timezone used to render date and time.
    pub timezone: String,
    /// Location text used until enrichment succeeds.
    pub default_location: String,
    /// Minimum age (seconds) of a location before it is refreshed again.
    pub location_refresh_secs: u64,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            max_tokens: 32_000,
            reserve_tokens: 2_000,
            max_message_tokens: 8_000,
            max_conversation_length: 50,
            timezone: "UTC".to_string(),
            default_location: "Unknown location".to_string(),
            location_refresh_secs: 3_600,
        }
    }
}

impl ContextSettings {
    pub fn validate(&self) -> Result<()> {
        if self.reserve_tokens >= self.max_tokens {
            return Err(SettingsError::InvalidValue(format!(
                "context.reserveTokens ({}) must be below context.maxTokens ({})",
                self.reserve_tokens, self.max_tokens
            )));
        }
        if self.max_message_tokens == 0 {
            return Err(SettingsError::InvalidValue(
                "context.maxMessageTokens must be positive".into(),
            ));
        }
        if self.max_conversation_length == 0 {
            return Err(SettingsError::InvalidValue(
                "context.maxConversationLength must be positive".into(),
            ));
        }
        if self.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(SettingsError::InvalidValue(format!(
                "unknown timezone: {}",
                self.timezone
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(ContextSettings::default().validate().is_ok());
    }

    #[test]
    fn reserve_must_fit_budget() {
        let settings = ContextSettings {
            reserve_tokens: 32_000,
            ..ContextSettings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("reserveTokens"));
    }

    #[test]
    fn zero_length_rejected() {
        let settings = ContextSettings {
            max_conversation_length: 0,
            ..ContextSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn unknown_timezone_rejected() {
        let settings = ContextSettings {
            timezone: "Mars/Olympus_Mons".into(),
            ..ContextSettings::default()
        };
        assert!(settings.validate().unwrap_err().to_string().contains("timezone"));
    }

    #[test]
    fn iana_timezone_accepted() {
        let settings = ContextSettings {
            timezone: "America/New_York".into(),
            ..ContextSettings::default()
        };
        assert!(settings.validate().is_ok());
    }
}
