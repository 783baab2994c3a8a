//! 主应用程序入口
//!
//! 启动 Axum Web API 服务。

use std::sync::Arc;

use application::{
    create_pg_pool,
    services::{ChatService, ChatServiceDependencies, UserService, UserServiceDependencies},
    BcryptPasswordHasher, PgChatRepository, PgMessageRepository, PgUserRepository, RoomRegistry,
    SystemClock,
};
use config::AppConfig;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env_with_defaults();

    tracing::info!(
        "连接数据库: {}",
        config.database.url.split('@').last().unwrap_or("unknown")
    );

    let pg_pool = create_pg_pool(&config.database.url, config.database.max_connections).await?;

    // 运行迁移
    sqlx::migrate!("../../migrations").run(&pg_pool).await?;

    let user_repository = Arc::new(PgUserRepository::new(pg_pool.clone()));
    let chat_repository = Arc::new(PgChatRepository::new(pg_pool.clone()));
    let message_repository = Arc::new(PgMessageRepository::new(pg_pool));

    let password_hasher: Arc<dyn application::PasswordHasher> =
        Arc::new(BcryptPasswordHasher::new(config.server.bcrypt_cost));
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

    let jwt_service = Arc::new(JwtService::new(config.jwt));

    let state = AppState::new(
        Arc::new(user_service),
        Arc::new(chat_service),
        registry,
        jwt_service,
    );

    let app = router(state);
    let bind = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind).await?;

    tracing::info!("聊天服务器启动在 http://{}", bind);
    axum::serve(listener, app).await?;

    Ok(())
}
