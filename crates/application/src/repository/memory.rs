//! 内存仓储实现。
//!
//! 用于单元测试、集成测试以及不带 `sqlx` 特性的本地开发。
//! 语义与 Postgres 实现保持一致：单个操作原子，无跨操作事务。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{
    Chat, ChatId, Message, MessageId, RepositoryError, Timestamp, User, UserEmail, UserId,
    UserProfile,
};
use tokio::sync::RwLock;

use super::{ChatRepository, MessageRepository, UserRepository};

#[derive(Default, Clone)]
pub struct InMemoryUserRepository {
    users: Arc<RwLock<HashMap<UserId, User>>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        if users.values().any(|existing| existing.email == user.email) {
            return Err(RepositoryError::Conflict);
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|user| &user.email == email)
            .cloned())
    }

    async fn find_profiles(&self, ids: &[UserId]) -> Result<Vec<UserProfile>, RepositoryError> {
        let users = self.users.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| users.get(id).map(UserProfile::from))
            .collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryChatRepository {
    chats: Arc<RwLock<HashMap<ChatId, Chat>>>,
}

impl InMemoryChatRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatRepository for InMemoryChatRepository {
    async fn create(&self, chat: Chat) -> Result<Chat, RepositoryError> {
        let mut chats = self.chats.write().await;
        if chats
            .values()
            .any(|existing| existing.participants == chat.participants)
        {
            return Err(RepositoryError::Conflict);
        }
        chats.insert(chat.id, chat.clone());
        Ok(chat)
    }

    async fn find_by_id(&self, id: ChatId) -> Result<Option<Chat>, RepositoryError> {
        Ok(self.chats.read().await.get(&id).cloned())
    }

    async fn find_by_participants(
        &self,
        participants: &[UserId],
    ) -> Result<Option<Chat>, RepositoryError> {
        Ok(self
            .chats
            .read()
            .await
            .values()
            .find(|chat| chat.participants == participants)
            .cloned())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Chat>, RepositoryError> {
        let mut chats: Vec<Chat> = self
            .chats
            .read()
            .await
            .values()
            .filter(|chat| chat.is_participant(user_id))
            .cloned()
            .collect();
        chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(chats)
    }

    async fn record_last_message(
        &self,
        id: ChatId,
        message_id: MessageId,
        at: Timestamp,
    ) -> Result<(), RepositoryError> {
        let mut chats = self.chats.write().await;
        let chat = chats.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        chat.record_message(message_id, at);
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryMessageRepository {
    // 每个会话一条按插入顺序排列的消息序列
    messages: Arc<RwLock<HashMap<ChatId, Vec<Message>>>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn create(&self, message: Message) -> Result<Message, RepositoryError> {
        let mut messages = self.messages.write().await;
        messages
            .entry(message.chat_id)
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        Ok(self
            .messages
            .read()
            .await
            .values()
            .flatten()
            .find(|message| message.id == id)
            .cloned())
    }

    async fn list_page(
        &self,
        chat_id: ChatId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Message>, RepositoryError> {
        let messages = self.messages.read().await;
        let page = messages
            .get(&chat_id)
            .map(|history| {
                history
                    .iter()
                    .rev()
                    .skip(offset as usize)
                    .take(limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(page)
    }

    async fn count_for_chat(&self, chat_id: ChatId) -> Result<u64, RepositoryError> {
        Ok(self
            .messages
            .read()
            .await
            .get(&chat_id)
            .map(|history| history.len() as u64)
            .unwrap_or(0))
    }

    async fn add_reader(&self, chat_id: ChatId, reader: UserId) -> Result<u64, RepositoryError> {
        let mut messages = self.messages.write().await;
        let Some(history) = messages.get_mut(&chat_id) else {
            return Ok(0);
        };
        let mut updated = 0;
        for message in history.iter_mut() {
            if message.sender_id != reader && message.mark_read_by(reader) {
                updated += 1;
            }
        }
        Ok(updated)
    }
}
