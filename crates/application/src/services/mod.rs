mod chat_service;
mod user_service;

#[cfg(test)]
mod chat_service_tests;

pub use chat_service::{
    ChatService, ChatServiceDependencies, CreateChatOutcome, CreateChatRequest,
    SendMessageRequest,
};
pub use user_service::{
    AuthenticateUserRequest, RegisterUserRequest, UserService, UserServiceDependencies,
};
