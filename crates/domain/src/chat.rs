use std::collections::BTreeSet;

use crate::errors::DomainError;
use crate::value_objects::{ChatId, MessageId, Timestamp, UserId};

/// 一次会话：固定的参与者集合共享一份消息历史。
///
/// 参与者集合在创建后不可变，并且是会话的身份：
/// 任意两个会话的参与者集合永远不相同。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Chat {
    pub id: ChatId,
    /// 归一化（排序去重）后的参与者，始终至少两人。
    pub participants: Vec<UserId>,
    pub last_message: Option<MessageId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Chat {
    pub fn new(
        id: ChatId,
        participants: Vec<UserId>,
        created_at: Timestamp,
    ) -> Result<Self, DomainError> {
        let participants = Self::require_valid_set(participants)?;
        Ok(Self {
            id,
            participants,
            last_message: None,
            created_at,
            updated_at: created_at,
        })
    }

    /// 把发起者与给定参与者合并成归一化集合。
    ///
    /// 重复项被去掉，顺序无关紧要：同一批人不管怎么排列
    /// 都得到同一个集合，因此也解析到同一个会话。
    pub fn normalize_participants(requester: UserId, others: &[UserId]) -> Vec<UserId> {
        let mut set: BTreeSet<UserId> = others.iter().copied().collect();
        set.insert(requester);
        set.into_iter().collect()
    }

    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.participants.contains(&user_id)
    }

    /// 记录新持久化的消息并刷新活跃时间。
    pub fn record_message(&mut self, message_id: MessageId, now: Timestamp) {
        self.last_message = Some(message_id);
        self.updated_at = now;
    }

    fn require_valid_set(participants: Vec<UserId>) -> Result<Vec<UserId>, DomainError> {
        let set: BTreeSet<UserId> = participants.into_iter().collect();
        if set.len() < 2 {
            return Err(DomainError::invalid_argument(
                "participants",
                "a chat needs at least two distinct participants",
            ));
        }
        Ok(set.into_iter().collect())
    }
}
