use std::sync::Arc;

use domain::{DomainError, User, UserEmail, UserId, UserName, UserProfile};
use uuid::Uuid;

use crate::{
    clock::Clock, dto::UserDto, error::ApplicationError, password::PasswordHasher,
    repository::UserRepository,
};

#[derive(Debug, Clone)]
pub struct RegisterUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AuthenticateUserRequest {
    pub email: String,
    pub password: String,
}

pub struct UserServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub clock: Arc<dyn Clock>,
}

/// 账号注册 / 登录，以及实时连接用的身份解析。
pub struct UserService {
    deps: UserServiceDependencies,
}

impl UserService {
    pub fn new(deps: UserServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn register(
        &self,
        request: RegisterUserRequest,
    ) -> Result<UserDto, ApplicationError> {
        let name = UserName::parse(request.name)?;
        let email = UserEmail::parse(request.email)?;

        if self
            .deps
            .user_repository
            .find_by_email(&email)
            .await?
            .is_some()
        {
            return Err(DomainError::UserAlreadyExists.into());
        }

        let password = self.deps.password_hasher.hash(&request.password).await?;
        let now = self.deps.clock.now();
        let user = User::new(UserId::from(Uuid::new_v4()), name, email, password, now);
        let stored = self.deps.user_repository.create(user).await?;

        tracing::info!(user_id = %stored.id, "user registered");
        Ok(UserDto::from(&stored))
    }

    pub async fn authenticate(
        &self,
        request: AuthenticateUserRequest,
    ) -> Result<UserDto, ApplicationError> {
        let email = UserEmail::parse(request.email)?;

        let user = self
            .deps
            .user_repository
            .find_by_email(&email)
            .await?
            .ok_or(DomainError::InvalidCredentials)?;

        let valid = self
            .deps
            .password_hasher
            .verify(&request.password, &user.password)
            .await?;
        if !valid {
            return Err(DomainError::InvalidCredentials.into());
        }

        Ok(UserDto::from(&user))
    }

    /// 把通过凭证解析出的用户 id 换成完整身份。
    /// 凭证有效但用户已不存在时同样视为验证失败。
    pub async fn identity(&self, user_id: Uuid) -> Result<UserProfile, ApplicationError> {
        let user = self
            .deps
            .user_repository
            .find_by_id(UserId::from(user_id))
            .await?
            .ok_or(DomainError::UserNotFound)?;
        Ok(user.profile())
    }
}
