use async_trait::async_trait;

use crate::model::ChatId;

/// Outbound side of the chat transport.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, chat: ChatId, text: &str) -> anyhow::Result<()>;
}
