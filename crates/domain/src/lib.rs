//! 聊天子系统核心领域模型
//!
//! 包含会话（Chat）、消息（Message）、用户等核心实体，
//! 以及参与者集合归一化、已读追踪等业务规则。

pub mod chat;
pub mod errors;
pub mod message;
pub mod repository;
pub mod user;
pub mod value_objects;

pub use chat::Chat;
pub use errors::{DomainError, DomainResult};
pub use message::Message;
pub use repository::{RepositoryError, RepositoryResult};
pub use user::{User, UserProfile};
pub use value_objects::{
    ChatId, MessageId, MessageText, PasswordHash, Timestamp, UserEmail, UserId, UserName,
};
