//! Per-turn call order for the chat flow.
//!
//! add user message → format context → conversation window → (model call,
//! outside this crate) → add assistant message → cleanup.

use parley_core::{Role, StoredMessage};
use parley_store::{StorageFault, TrimReport};
use serde::Serialize;
use tracing::{debug, error};

use crate::context_manager::ContextManager;

/// What the model client needs for one request.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptPayload {
    pub context_block: String,
    pub messages: Vec<StoredMessage>,
    /// Persistence failed; `messages` holds only the in-memory user message.
    pub degraded: bool,
}

pub struct ChatTurn<'a> {
    manager: &'a mut ContextManager,
}

impl<'a> ChatTurn<'a> {
    pub fn new(manager: &'a mut ContextManager) -> Self {
        Self { manager }
    }

    /// Record the user's text and assemble the prompt payload.
    ///
    /// Never fails: a storage fault degrades the payload to the user message
    /// alone.
    pub async fn begin(&mut self, user_text: &str) -> PromptPayload {
        let user = self.manager.prepare_message(Role::User, user_text);
        let added = self.manager.storage().add_message(user.clone()).await;
        let context_block = self.manager.format_context_for_prompt().await;

        let messages = match added {
            Ok(()) => self.manager.get_conversation_messages().await,
            Err(e) => Err(e),
        };

        match messages {
            Ok(messages) => {
                debug!(count = messages.len(), "prompt payload assembled");
                PromptPayload {
                    context_block,
                    messages,
                    degraded: false,
                }
            }
            Err(e) => {
                error!(error = %e, "conversation storage failed, sending degraded prompt");
                PromptPayload {
                    context_block,
                    messages: vec![user],
                    degraded: true,
                }
            }
        }
    }

    /// Record the assistant's reply and trim the log.
    pub async fn finish(&mut self, assistant_text: &str) -> Result<TrimReport, StorageFault> {
        let result = match self.manager.add_message(Role::Assistant, assistant_text).await {
            Ok(_) => self.manager.cleanup_old_messages().await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            error!(error = %e, "failed to record assistant reply");
        }
        result
    }
}
