use std::sync::Arc;

use domain::{Chat, ChatId, DomainError, Message, MessageId, MessageText, UserId};
use uuid::Uuid;

use crate::{
    clock::Clock,
    dto::{ChatDto, ChatHistoryDto, MessageDto, ParticipantDto},
    error::ApplicationError,
    events::ServerEvent,
    registry::RoomRegistry,
    repository::{ChatRepository, MessageRepository, UserRepository},
};

/// 历史分页的页大小上限。
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone)]
pub struct CreateChatRequest {
    pub requester_id: Uuid,
    pub participants: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub text: String,
}

/// get-or-create 的结果。`created` 决定 HTTP 层回 201 还是 200，
/// 两者都是成功：同一批参与者永远解析到同一个会话。
#[derive(Debug, Clone)]
pub struct CreateChatOutcome {
    pub chat: ChatDto,
    pub created: bool,
}

pub struct ChatServiceDependencies {
    pub chat_repository: Arc<dyn ChatRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub clock: Arc<dyn Clock>,
    pub registry: Arc<RoomRegistry>,
}

/// 会话目录 + 消息广播的持久化半边。
///
/// 会话身份就是参与者集合：查找、创建都先做归一化。
pub struct ChatService {
    deps: ChatServiceDependencies,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    /// 幂等的"查找或创建"会话。
    pub async fn create_or_get_chat(
        &self,
        request: CreateChatRequest,
    ) -> Result<CreateChatOutcome, ApplicationError> {
        if request.participants.is_empty() {
            return Err(DomainError::invalid_argument(
                "participants",
                "participants are required",
            )
            .into());
        }

        let requester = UserId::from(request.requester_id);
        let others: Vec<UserId> = request.participants.into_iter().map(UserId::from).collect();
        let normalized = Chat::normalize_participants(requester, &others);
        if normalized.len() < 2 {
            return Err(DomainError::invalid_argument(
                "participants",
                "a chat needs at least two distinct participants",
            )
            .into());
        }

        if let Some(existing) = self
            .deps
            .chat_repository
            .find_by_participants(&normalized)
            .await?
        {
            let chat = self.populate_chat(&existing).await?;
            return Ok(CreateChatOutcome {
                chat,
                created: false,
            });
        }

        // 每个参与者都必须能解析成真实用户，否则无法填充
        let profiles = self.participant_profiles(&normalized).await?;

        let now = self.deps.clock.now();
        let chat = Chat::new(ChatId::from(Uuid::new_v4()), normalized, now)?;
        let stored = self.deps.chat_repository.create(chat).await?;

        tracing::info!(chat_id = %stored.id, participants = stored.participants.len(), "chat created");

        Ok(CreateChatOutcome {
            chat: ChatDto::populate(&stored, profiles, None),
            created: true,
        })
    }

    /// 加入房间前的成员校验。会话不存在或请求者不是
    /// 参与者都要拒绝，和 send_message 里的检查一致。
    pub async fn ensure_participant(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), ApplicationError> {
        let chat = self
            .deps
            .chat_repository
            .find_by_id(ChatId::from(chat_id))
            .await?
            .ok_or(DomainError::ChatNotFound)?;

        if !chat.is_participant(UserId::from(user_id)) {
            return Err(DomainError::NotAParticipant.into());
        }
        Ok(())
    }

    /// 某用户参与的全部会话，最近活跃的在前。
    pub async fn list_chats_for(&self, user_id: Uuid) -> Result<Vec<ChatDto>, ApplicationError> {
        let user_id = UserId::from(user_id);
        let chats = self.deps.chat_repository.list_for_user(user_id).await?;

        let mut populated = Vec::with_capacity(chats.len());
        for chat in &chats {
            populated.push(self.populate_chat(chat).await?);
        }
        Ok(populated)
    }

    /// 一页消息历史，最新在前。
    ///
    /// 副作用：请求者浏览历史即视作已读——会话里所有不是
    /// 请求者发的、也还没被其标记的消息都追加该读者。幂等，
    /// 重复拉同一页不再产生任何更新。返回的是更新前的快照。
    pub async fn chat_history(
        &self,
        chat_id: Uuid,
        requester_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<ChatHistoryDto, ApplicationError> {
        let chat_id = ChatId::from(chat_id);
        let requester = UserId::from(requester_id);

        let chat = self
            .deps
            .chat_repository
            .find_by_id(chat_id)
            .await?
            .ok_or(DomainError::ChatNotFound)?;

        if !chat.is_participant(requester) {
            return Err(DomainError::NotAParticipant.into());
        }

        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let offset = u64::from(page - 1) * u64::from(limit);

        let messages = self
            .deps
            .message_repository
            .list_page(chat_id, offset, u64::from(limit))
            .await?;
        let total = self.deps.message_repository.count_for_chat(chat_id).await?;

        let updated = self
            .deps
            .message_repository
            .add_reader(chat_id, requester)
            .await?;
        if updated > 0 {
            tracing::debug!(%chat_id, reader = %requester, updated, "marked messages as read");
        }

        let mut populated = Vec::with_capacity(messages.len());
        for message in &messages {
            populated.push(self.populate_message(message).await?);
        }

        let total_pages = (total + u64::from(limit) - 1) / u64::from(limit);

        Ok(ChatHistoryDto {
            messages: populated,
            current_page: page,
            total_pages: total_pages as u32,
            total_messages: total,
        })
    }

    /// 校验成员身份、持久化消息、刷新会话活跃时间，
    /// 然后把填充后的消息广播给房间内所有连接（含发送者）。
    ///
    /// 任何一步失败都不会广播：房间里的其他连接永远
    /// 看不到半成品消息。
    pub async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<MessageDto, ApplicationError> {
        let chat_id = ChatId::from(request.chat_id);
        let sender_id = UserId::from(request.sender_id);
        let text = MessageText::parse(request.text)?;

        let chat = self
            .deps
            .chat_repository
            .find_by_id(chat_id)
            .await?
            .ok_or(DomainError::ChatNotFound)?;

        if !chat.is_participant(sender_id) {
            return Err(DomainError::NotAParticipant.into());
        }

        let now = self.deps.clock.now();
        let message = Message::new(MessageId::from(Uuid::new_v4()), chat_id, sender_id, text, now);
        let stored = self.deps.message_repository.create(message).await?;

        self.deps
            .chat_repository
            .record_last_message(chat_id, stored.id, now)
            .await?;

        let populated = self.populate_message(&stored).await?;

        let delivered = self
            .deps
            .registry
            .broadcast(chat_id, &ServerEvent::Message {
                message: populated.clone(),
            });
        tracing::info!(%chat_id, message_id = %stored.id, sender = %sender_id, delivered, "message sent");

        Ok(populated)
    }

    async fn participant_profiles(
        &self,
        ids: &[UserId],
    ) -> Result<Vec<ParticipantDto>, ApplicationError> {
        let profiles = self.deps.user_repository.find_profiles(ids).await?;
        if profiles.len() != ids.len() {
            return Err(DomainError::UserNotFound.into());
        }
        Ok(profiles.iter().map(ParticipantDto::from).collect())
    }

    async fn populate_message(&self, message: &Message) -> Result<MessageDto, ApplicationError> {
        let sender = self
            .deps
            .user_repository
            .find_profiles(&[message.sender_id])
            .await?
            .into_iter()
            .next()
            .ok_or(DomainError::UserNotFound)?;
        Ok(MessageDto::populate(message, &sender))
    }

    async fn populate_chat(&self, chat: &Chat) -> Result<ChatDto, ApplicationError> {
        let participants = self.participant_profiles(&chat.participants).await?;
        let last_message = match chat.last_message {
            Some(message_id) => {
                let message = self
                    .deps
                    .message_repository
                    .find_by_id(message_id)
                    .await?
                    .ok_or(DomainError::MessageNotFound)?;
                Some(self.populate_message(&message).await?)
            }
            None => None,
        };
        Ok(ChatDto::populate(chat, participants, last_message))
    }
}
