use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{ChatId, User};
use tokio::sync::RwLock;

use crate::utils::full_name;

/// Best-effort mirror of every (input, response) exchange to an
/// administrative channel. A send failure is logged and swallowed; auditing
/// never fails a handler.
#[derive(Clone)]
pub struct AuditLogger {
    channel: Arc<RwLock<Option<ChatId>>>,
}

impl AuditLogger {
    pub fn new(channel: Option<ChatId>) -> Self {
        Self {
            channel: Arc::new(RwLock::new(channel)),
        }
    }

    /// Process-local, not persisted; lost on restart.
    pub async fn set_channel(&self, channel: ChatId) {
        *self.channel.write().await = Some(channel);
    }

    pub async fn mirror(&self, bot: &Bot, user: &User, input: &str, response: &str) {
        let Some(channel) = *self.channel.read().await else {
            return;
        };

        let username = user.username.as_deref().unwrap_or("none");
        let text = format!(
            "User ID: {}\nUsername: @{}\nName: {}\nUser input: {}\nBot response: {}",
            user.id,
            username,
            full_name(user),
            input,
            response
        );

        if let Err(e) = bot.send_message(channel, text).await {
            warn!("Failed to mirror exchange to {}: {}", channel, e);
        }
    }
}
