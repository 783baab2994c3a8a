use async_trait::async_trait;
use domain::{
    Chat, ChatId, Message, MessageId, RepositoryError, Timestamp, User, UserEmail, UserId,
    UserProfile,
};

pub mod memory;
#[cfg(feature = "sqlx")]
pub mod pg;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: User) -> Result<User, RepositoryError>;
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError>;
    /// 批量解析身份投影，用于填充响应。结果顺序与输入一致，未知 id 被跳过。
    async fn find_profiles(&self, ids: &[UserId]) -> Result<Vec<UserProfile>, RepositoryError>;
}

#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn create(&self, chat: Chat) -> Result<Chat, RepositoryError>;
    async fn find_by_id(&self, id: ChatId) -> Result<Option<Chat>, RepositoryError>;
    /// 按归一化参与者集合做精确匹配（同样的成员、与顺序无关）。
    async fn find_by_participants(
        &self,
        participants: &[UserId],
    ) -> Result<Option<Chat>, RepositoryError>;
    /// 某用户参与的全部会话，按 `updated_at` 降序。
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Chat>, RepositoryError>;
    /// 更新 `last_message` 并刷新 `updated_at`。
    async fn record_last_message(
        &self,
        id: ChatId,
        message_id: MessageId,
        at: Timestamp,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn create(&self, message: Message) -> Result<Message, RepositoryError>;
    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError>;
    /// 一页历史，按 `created_at` 降序（最新在前）。
    async fn list_page(
        &self,
        chat_id: ChatId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Message>, RepositoryError>;
    async fn count_for_chat(&self, chat_id: ChatId) -> Result<u64, RepositoryError>;
    /// 把 `reader` 追加到该会话中所有"不是自己发的、也还没读过的"
    /// 消息的 `read_by` 里。幂等，返回实际更新的条数。
    async fn add_reader(&self, chat_id: ChatId, reader: UserId) -> Result<u64, RepositoryError>;
}
