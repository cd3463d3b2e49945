//! Per-user conversation history.
//!
//! Each user gets an ordered list of prior messages that is replayed as
//! context on their next turn. Conversations are capped in length, and
//! idle or least recently used conversations are dropped.

use crate::cache::{BoundedCache, Clock};
use openrouter::{Message, Role};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Maximum number of messages kept per user (ten exchanges).
pub const DEFAULT_MAX_MESSAGES: usize = 20;

/// Maximum number of users with a live conversation.
pub const DEFAULT_MAX_USERS: usize = 1024;

/// Conversations untouched for this long are forgotten.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Identifier of a chat-platform user.
pub type UserId = u64;

/// History of a single user.
#[derive(Debug, Clone, Default)]
struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    fn push_exchange(&mut self, prompt: &str, reply: &str, max_messages: usize) {
        self.messages.push(Message::user(prompt));
        self.messages.push(Message::assistant(reply));
        self.trim(max_messages);
    }

    /// Drop oldest messages in whole exchanges so the history never starts
    /// with an assistant message.
    fn trim(&mut self, max_messages: usize) {
        while self.messages.len() > max_messages && !self.messages.is_empty() {
            self.messages.remove(0);
            if matches!(self.messages.first().map(|m| m.role), Some(Role::Assistant)) {
                self.messages.remove(0);
            }
        }
    }
}

/// Conversations keyed by user.
pub struct SessionStore {
    conversations: Mutex<BoundedCache<UserId, Conversation>>,
    max_messages: usize,
}

impl SessionStore {
    pub fn new(
        max_users: usize,
        max_messages: usize,
        idle_ttl: Option<Duration>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            conversations: Mutex::new(BoundedCache::new(max_users, idle_ttl, clock)),
            max_messages: max_messages.max(2),
        }
    }

    /// Copy of the user's history, oldest first. Empty for unknown users.
    pub async fn history(&self, user: UserId) -> Vec<Message> {
        self.conversations
            .lock()
            .await
            .get(&user)
            .map(|c| c.messages.clone())
            .unwrap_or_default()
    }

    /// Append one user/assistant exchange.
    pub async fn record_turn(&self, user: UserId, prompt: &str, reply: &str) {
        let max_messages = self.max_messages;
        self.conversations
            .lock()
            .await
            .get_or_insert_with(user, Conversation::default)
            .push_exchange(prompt, reply, max_messages);
    }

    /// Forget a user's history.
    pub async fn clear(&self, user: UserId) {
        self.conversations.lock().await.remove(&user);
    }

    /// Number of users with a stored conversation.
    pub async fn len(&self) -> usize {
        self.conversations.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.conversations.lock().await.is_empty()
    }
}
