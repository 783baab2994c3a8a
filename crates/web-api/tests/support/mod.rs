use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{
    repository::memory::{InMemoryChatRepository, InMemoryMessageRepository, InMemoryUserRepository},
    services::{ChatService, ChatServiceDependencies, UserService, UserServiceDependencies},
    BcryptPasswordHasher, RoomRegistry, SystemClock,
};
use axum::Router;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::oneshot, time::sleep};
use uuid::Uuid;
use web_api::{router as build_router_fn, AppState, JwtConfig, JwtService};

/// 全内存的被测应用，不依赖外部数据库。
pub fn build_router() -> Router {
    let user_repository = Arc::new(InMemoryUserRepository::new());
    let chat_repository = Arc::new(InMemoryChatRepository::new());
    let message_repository = Arc::new(InMemoryMessageRepository::new());

    // 低成本 bcrypt，只为加快测试
    let password_hasher: Arc<dyn application::PasswordHasher> =
        Arc::new(BcryptPasswordHasher::new(Some(4)));
    let clock: Arc<dyn application::Clock> = Arc::new(SystemClock::default());
    let registry = Arc::new(RoomRegistry::new());

    let user_service = UserService::new(UserServiceDependencies {
        user_repository: user_repository.clone(),
        password_hasher,
        clock: clock.clone(),
    });

    let chat_service = ChatService::new(ChatServiceDependencies {
        chat_repository,
        message_repository,
        user_repository,
        clock,
        registry: registry.clone(),
    });

    let jwt_service = Arc::new(JwtService::new(JwtConfig {
        secret: "test-secret-key".to_string(),
        expiration_hours: 24,
    }));

    let state = AppState::new(
        Arc::new(user_service),
        Arc::new(chat_service),
        registry,
        jwt_service,
    );

    build_router_fn(state)
}

/// 在随机端口上启动被测服务，返回地址与关停句柄。
pub async fn spawn_server() -> (SocketAddr, oneshot::Sender<()>) {
    let router = build_router();
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    // allow server to start
    sleep(Duration::from_millis(100)).await;

    (addr, shutdown_tx)
}

/// 注册用户并登录，返回 (user_id, token)。
pub async fn register_and_login(
    client: &Client,
    base: &str,
    name: &str,
    email: &str,
) -> (Uuid, String) {
    let registered = client
        .post(format!("{base}/v1/users/register"))
        .json(&json!({"name": name, "email": email, "password": "secret"}))
        .send()
        .await
        .expect("register")
        .json::<Value>()
        .await
        .expect("register json");
    let user_id = registered["id"]
        .as_str()
        .expect("registered user id")
        .parse::<Uuid>()
        .expect("uuid");

    let login = client
        .post(format!("{base}/v1/users/login"))
        .json(&json!({"email": email, "password": "secret"}))
        .send()
        .await
        .expect("login")
        .json::<Value>()
        .await
        .expect("login json");
    let token = login["token"].as_str().expect("token").to_string();

    (user_id, token)
}
