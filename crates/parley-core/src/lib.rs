//! Data model shared by the parley crates: stored messages, the ambient
//! context record, the persisted storage unit and token estimation.

pub mod context;
pub mod ids;
pub mod instant;
pub mod messages;
pub mod tokens;

pub use context::{ContextRecord, ContextStorage, Coordinates, DEFAULT_LOCATION};
pub use ids::MessageId;
pub use messages::{Role, StoredMessage};
pub use tokens::estimate_tokens;
