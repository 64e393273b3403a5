//! # parley-context
//!
//! The conversation-facing layer over `parley-store`.
//!
//! - **Context manager**: owns the ambient date/time/location record and the
//!   token budget policy (per-message truncation, newest-first conversation
//!   window, oldest-first eviction)
//! - **Location**: coordinate providers and a reverse geocoder; failures
//!   never reach the conversation
//! - **Chat turn**: the per-turn call order, degrading instead of failing
//!   when persistence is down

#![deny(unsafe_code)]

pub mod constants;
pub mod context_manager;
pub mod error;
pub mod location;
pub mod turn;

pub use context_manager::{ContextManager, LocationServices};
pub use error::EnrichmentFault;
pub use location::{
    resolve_place_name, FixedLocationProvider, HttpReverseGeocoder, LocationProvider,
    ReverseGeocoder,
};
pub use turn::{ChatTurn, PromptPayload};
