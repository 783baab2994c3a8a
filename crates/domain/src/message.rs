use crate::value_objects::{ChatId, MessageId, MessageText, Timestamp, UserId};

/// 一条聊天消息。创建后正文不可变、不可删除，
/// 唯一允许的更新是向 `read_by` 追加读者。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub text: MessageText,
    /// 看过这条消息的用户，创建时即包含发送者。只增不减。
    pub read_by: Vec<UserId>,
    pub created_at: Timestamp,
}

impl Message {
    pub fn new(
        id: MessageId,
        chat_id: ChatId,
        sender_id: UserId,
        text: MessageText,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            chat_id,
            sender_id,
            text,
            read_by: vec![sender_id],
            created_at,
        }
    }

    pub fn is_read_by(&self, user_id: UserId) -> bool {
        self.read_by.contains(&user_id)
    }

    /// 标记已读。幂等：重复标记不产生变化，返回是否真的新增。
    pub fn mark_read_by(&mut self, user_id: UserId) -> bool {
        if self.is_read_by(user_id) {
            return false;
        }
        self.read_by.push(user_id);
        true
    }
}
