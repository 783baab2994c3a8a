//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务，处理输入校验、持久化边界、
//! 以及对外部适配器（密码哈希、实时广播）的抽象。

pub mod clock;
pub mod dto;
pub mod error;
pub mod events;
pub mod password;
pub mod registry;
pub mod repository;
pub mod services;

pub use clock::{Clock, SystemClock};
pub use dto::{ChatDto, ChatHistoryDto, MessageDto, ParticipantDto, UserDto};
pub use error::ApplicationError;
pub use events::ServerEvent;
pub use password::{BcryptPasswordHasher, PasswordHasher, PasswordHasherError};
pub use registry::{ConnectionId, RoomRegistry};
pub use repository::{ChatRepository, MessageRepository, UserRepository};
pub use services::{
    ChatService, ChatServiceDependencies, UserService, UserServiceDependencies,
};

#[cfg(feature = "sqlx")]
pub use repository::pg::{
    create_pg_pool, PgChatRepository, PgMessageRepository, PgUserRepository,
};
