use std::sync::Arc;

use application::{ChatService, RoomRegistry, UserService};

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub chat_service: Arc<ChatService>,
    pub registry: Arc<RoomRegistry>,
    pub jwt_service: Arc<JwtService>,
}

impl AppState {
    pub fn new(
        user_service: Arc<UserService>,
        chat_service: Arc<ChatService>,
        registry: Arc<RoomRegistry>,
        jwt_service: Arc<JwtService>,
    ) -> Self {
        Self {
            user_service,
            chat_service,
            registry,
            jwt_service,
        }
    }
}
