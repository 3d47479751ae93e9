use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    Result,
};

/// Outbound messenger port.
///
/// Only the calls the gateway itself needs: error notifications and the
/// delete-shorthand cleanup.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;
    async fn delete_message(&self, msg: MessageRef) -> Result<()>;
}
