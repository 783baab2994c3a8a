//! 对外响应形状。
//!
//! 引用字段在这里被"填充"：把用户 id 解析成 `{id, name, email}`，
//! 把 `last_message` 解析成完整消息，方便客户端直接渲染。

use domain::{Chat, Message, Timestamp, User, UserProfile};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub created_at: Timestamp,
}

impl From<&User> for UserDto {
    fn from(user: &User) -> Self {
        Self {
            id: Uuid::from(user.id),
            name: user.name.as_str().to_owned(),
            email: user.email.as_str().to_owned(),
            created_at: user.created_at,
        }
    }
}

/// 填充后的参与者信息。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantDto {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<&UserProfile> for ParticipantDto {
    fn from(profile: &UserProfile) -> Self {
        Self {
            id: Uuid::from(profile.id),
            name: profile.name.clone(),
            email: profile.email.clone(),
        }
    }
}

/// 填充了发送者信息的消息。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender: ParticipantDto,
    pub text: String,
    pub read_by: Vec<Uuid>,
    pub created_at: Timestamp,
}

impl MessageDto {
    pub fn populate(message: &Message, sender: &UserProfile) -> Self {
        Self {
            id: Uuid::from(message.id),
            chat_id: Uuid::from(message.chat_id),
            sender: ParticipantDto::from(sender),
            text: message.text.as_str().to_owned(),
            read_by: message.read_by.iter().copied().map(Uuid::from).collect(),
            created_at: message.created_at,
        }
    }
}

/// 填充了参与者与最新消息的会话。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatDto {
    pub id: Uuid,
    pub participants: Vec<ParticipantDto>,
    pub last_message: Option<MessageDto>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ChatDto {
    pub fn populate(
        chat: &Chat,
        participants: Vec<ParticipantDto>,
        last_message: Option<MessageDto>,
    ) -> Self {
        Self {
            id: Uuid::from(chat.id),
            participants,
            last_message,
            created_at: chat.created_at,
            updated_at: chat.updated_at,
        }
    }
}

/// 一页消息历史，带分页元信息。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryDto {
    pub messages: Vec<MessageDto>,
    pub current_page: u32,
    pub total_pages: u32,
    pub total_messages: u64,
}
