//! Budget constants for the conversation log.
//!
//! `ContextSettings` defaults to these values; deployments may override
//! them through settings.

// =============================================================================
// Token budget
// =============================================================================

/// Token ceiling for the prompt payload.
pub const MAX_TOKENS: u64 = 32_000;

/// Headroom kept free for the new prompt and the ambient context block.
pub const RESERVE_TOKENS: u64 = 2_000;

/// Ceiling on any single stored message.
pub const MAX_MESSAGE_TOKENS: u32 = 8_000;

/// Hard cap on the number of stored messages.
pub const MAX_CONVERSATION_LENGTH: usize = 50;

// =============================================================================
// Truncation
// =============================================================================

/// Appended to a message cut down to `MAX_MESSAGE_TOKENS`.
pub const TRUNCATION_MARKER: &str = "\n\n[Message truncated due to length]";

// =============================================================================
// Location
// =============================================================================

/// Age after which a resolved location is refreshed again.
pub const LOCATION_REFRESH_SECS: u64 = 3_600;

/// Header line of the ambient context block.
pub const CONTEXT_HEADER: &str = "Current context:";
