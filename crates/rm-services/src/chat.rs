//! Public board and private conversations.

use std::sync::Arc;

use rm_core::clock::Clock;
use rm_core::error::{MarketError, Result};
use rm_core::models::{ChatChannel, ChatMessage, User};
use rm_core::policy;
use rm_core::traits::{ChatRepo, UserRepo};
use rm_core::validation;
use uuid::Uuid;

use crate::access::{is_acting_admin, load_user};

pub struct ChatService {
    users: Arc<dyn UserRepo>,
    chat: Arc<dyn ChatRepo>,
    clock: Arc<dyn Clock>,
}

impl ChatService {
    pub fn new(users: Arc<dyn UserRepo>, chat: Arc<dyn ChatRepo>, clock: Arc<dyn Clock>) -> Self {
        Self { users, chat, clock }
    }

    /// Posts to the public board.
    pub async fn send_public(&self, author: &str, body: &str) -> Result<ChatMessage> {
        self.send(ChatChannel::Public, author, body).await
    }

    pub async fn send_private(
        &self,
        author: &str,
        recipient: &str,
        body: &str,
    ) -> Result<ChatMessage> {
        if author == recipient {
            return Err(MarketError::validation("recipient", "cannot message yourself"));
        }
        load_user(&*self.users, recipient).await?;
        self.send(ChatChannel::between(author, recipient), author, body)
            .await
    }

    async fn send(&self, channel: ChatChannel, author: &str, body: &str) -> Result<ChatMessage> {
        let body = validation::message_body(body)?;
        let sender = self.active_author(author).await?;

        let message = ChatMessage {
            id: Uuid::now_v7(),
            channel,
            author: sender.username,
            body,
            created_at: self.clock.now(),
        };
        self.chat.insert_message(message.clone()).await?;
        tracing::debug!(message_id = %message.id, author, "message sent");
        Ok(message)
    }

    async fn active_author(&self, author: &str) -> Result<User> {
        let Some(user) = self.users.get_user(author).await? else {
            return Err(MarketError::NotAuthenticated);
        };
        let now = self.clock.now();
        if let Some(expiry) = user.ban_expiry {
            if policy::is_currently_banned(&user, now) {
                return Err(MarketError::Banned {
                    days_remaining: policy::days_remaining(expiry, now),
                });
            }
        }
        Ok(user)
    }

    pub async fn public_feed(&self) -> Result<Vec<ChatMessage>> {
        Ok(self.chat.list_messages(&ChatChannel::Public).await?)
    }

    pub async fn conversation(&self, a: &str, b: &str) -> Result<Vec<ChatMessage>> {
        Ok(self.chat.list_messages(&ChatChannel::between(a, b)).await?)
    }

    /// Author or acting admin.
    pub async fn delete_message(&self, message_id: Uuid, actor: &str) -> Result<ChatMessage> {
        let message = self
            .chat
            .get_message(message_id)
            .await?
            .ok_or_else(|| MarketError::NotFound("message", message_id.to_string()))?;
        let allowed = message.author == actor
            || self
                .users
                .get_user(actor)
                .await?
                .is_some_and(|u| is_acting_admin(&u, self.clock.now()));
        if !allowed {
            return Err(MarketError::forbidden(
                "only the author or an administrator may delete this message",
            ));
        }
        self.chat.remove_message(message_id).await?;
        tracing::info!(message_id = %message_id, by = actor, "message deleted");
        Ok(message)
    }
}
