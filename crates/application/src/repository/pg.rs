//! PostgreSQL 仓储实现。
//!
//! 单条语句即同步边界：参与者集合和 `read_by` 都是 `UUID[]` 列，
//! 归一化集合排序后存储，等值比较即可完成"同一批人"查找。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    Chat, ChatId, Message, MessageId, MessageText, PasswordHash, RepositoryError, Timestamp,
    User, UserEmail, UserId, UserName, UserProfile,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

use super::{ChatRepository, MessageRepository, UserRepository};

pub async fn create_pg_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
        _ => RepositoryError::storage(err.to_string()),
    }
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRecord> for User {
    type Error = RepositoryError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        let name = UserName::parse(value.name).map_err(|err| invalid_data(err.to_string()))?;
        let email = UserEmail::parse(value.email).map_err(|err| invalid_data(err.to_string()))?;
        let password = PasswordHash::new(value.password_hash)
            .map_err(|err| invalid_data(err.to_string()))?;

        Ok(User {
            id: UserId::from(value.id),
            name,
            email,
            password,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ChatRecord {
    id: Uuid,
    participants: Vec<Uuid>,
    last_message_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ChatRecord> for Chat {
    fn from(value: ChatRecord) -> Self {
        Chat {
            id: ChatId::from(value.id),
            participants: value.participants.into_iter().map(UserId::from).collect(),
            last_message: value.last_message_id.map(MessageId::from),
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    chat_id: Uuid,
    sender_id: Uuid,
    text: String,
    read_by: Vec<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let text = MessageText::parse(value.text).map_err(|err| invalid_data(err.to_string()))?;
        Ok(Message {
            id: MessageId::from(value.id),
            chat_id: ChatId::from(value.chat_id),
            sender_id: UserId::from(value.sender_id),
            text,
            read_by: value.read_by.into_iter().map(UserId::from).collect(),
            created_at: value.created_at,
        })
    }
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (id, name, email, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, name, email, password_hash, created_at, updated_at
            "#,
        )
        .bind(Uuid::from(user.id))
        .bind(user.name.as_str())
        .bind(user.email.as_str())
        .bind(user.password.as_str())
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        User::try_from(record)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"SELECT id, name, email, password_hash, created_at, updated_at FROM users WHERE id = $1"#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"SELECT id, name, email, password_hash, created_at, updated_at FROM users WHERE email = $1"#,
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(User::try_from).transpose()
    }

    async fn find_profiles(&self, ids: &[UserId]) -> Result<Vec<UserProfile>, RepositoryError> {
        let raw: Vec<Uuid> = ids.iter().copied().map(Uuid::from).collect();
        let rows = sqlx::query_as::<_, (Uuid, String, String)>(
            r#"SELECT id, name, email FROM users WHERE id = ANY($1)"#,
        )
        .bind(&raw)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        // 保持与输入一致的顺序
        let mut profiles = Vec::with_capacity(rows.len());
        for id in ids {
            if let Some((row_id, name, email)) =
                rows.iter().find(|(row_id, _, _)| UserId::from(*row_id) == *id)
            {
                profiles.push(UserProfile {
                    id: UserId::from(*row_id),
                    name: name.clone(),
                    email: email.clone(),
                });
            }
        }
        Ok(profiles)
    }
}

#[derive(Clone)]
pub struct PgChatRepository {
    pool: PgPool,
}

impl PgChatRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatRepository for PgChatRepository {
    async fn create(&self, chat: Chat) -> Result<Chat, RepositoryError> {
        let participants: Vec<Uuid> = chat.participants.iter().copied().map(Uuid::from).collect();
        let record = sqlx::query_as::<_, ChatRecord>(
            r#"
            INSERT INTO chats (id, participants, last_message_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, participants, last_message_id, created_at, updated_at
            "#,
        )
        .bind(Uuid::from(chat.id))
        .bind(&participants)
        .bind(chat.last_message.map(Uuid::from))
        .bind(chat.created_at)
        .bind(chat.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(Chat::from(record))
    }

    async fn find_by_id(&self, id: ChatId) -> Result<Option<Chat>, RepositoryError> {
        let record = sqlx::query_as::<_, ChatRecord>(
            r#"SELECT id, participants, last_message_id, created_at, updated_at FROM chats WHERE id = $1"#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(Chat::from))
    }

    async fn find_by_participants(
        &self,
        participants: &[UserId],
    ) -> Result<Option<Chat>, RepositoryError> {
        // 参与者列始终存归一化（排序去重）后的数组，等值比较即集合比较
        let raw: Vec<Uuid> = participants.iter().copied().map(Uuid::from).collect();
        let record = sqlx::query_as::<_, ChatRecord>(
            r#"SELECT id, participants, last_message_id, created_at, updated_at FROM chats WHERE participants = $1"#,
        )
        .bind(&raw)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(Chat::from))
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Chat>, RepositoryError> {
        let records = sqlx::query_as::<_, ChatRecord>(
            r#"
            SELECT id, participants, last_message_id, created_at, updated_at
            FROM chats
            WHERE $1 = ANY(participants)
            ORDER BY updated_at DESC
            "#,
        )
        .bind(Uuid::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(Chat::from).collect())
    }

    async fn record_last_message(
        &self,
        id: ChatId,
        message_id: MessageId,
        at: Timestamp,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE chats SET last_message_id = $2, updated_at = $3 WHERE id = $1"#,
        )
        .bind(Uuid::from(id))
        .bind(Uuid::from(message_id))
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn create(&self, message: Message) -> Result<Message, RepositoryError> {
        let read_by: Vec<Uuid> = message.read_by.iter().copied().map(Uuid::from).collect();
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (id, chat_id, sender_id, text, read_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, chat_id, sender_id, text, read_by, created_at
            "#,
        )
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(message.chat_id))
        .bind(Uuid::from(message.sender_id))
        .bind(message.text.as_str())
        .bind(&read_by)
        .bind(message.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Message::try_from(record)
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"SELECT id, chat_id, sender_id, text, read_by, created_at FROM messages WHERE id = $1"#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Message::try_from).transpose()
    }

    async fn list_page(
        &self,
        chat_id: ChatId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Message>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, chat_id, sender_id, text, read_by, created_at
            FROM messages
            WHERE chat_id = $1
            ORDER BY created_at DESC
            OFFSET $2 LIMIT $3
            "#,
        )
        .bind(Uuid::from(chat_id))
        .bind(offset as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Message::try_from).collect()
    }

    async fn count_for_chat(&self, chat_id: ChatId) -> Result<u64, RepositoryError> {
        let (count,): (i64,) =
            sqlx::query_as(r#"SELECT COUNT(*) FROM messages WHERE chat_id = $1"#)
                .bind(Uuid::from(chat_id))
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_err)?;

        Ok(count as u64)
    }

    async fn add_reader(&self, chat_id: ChatId, reader: UserId) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET read_by = array_append(read_by, $2)
            WHERE chat_id = $1
              AND sender_id <> $2
              AND NOT (read_by @> ARRAY[$2]::uuid[])
            "#,
        )
        .bind(Uuid::from(chat_id))
        .bind(Uuid::from(reader))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
    }
}
