use serde::{Deserialize, Serialize};

use crate::value_objects::{PasswordHash, Timestamp, UserEmail, UserId, UserName};

/// 用户账号。聊天核心只消费它的身份投影（见 [`UserProfile`]），
/// 账号本身由注册/登录流程维护。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: UserName,
    pub email: UserEmail,
    #[serde(skip_serializing)] // 密码哈希不暴露给客户端
    pub password: PasswordHash,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl User {
    pub fn new(
        id: UserId,
        name: UserName,
        email: UserEmail,
        password: PasswordHash,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            name,
            email,
            password,
            created_at,
            updated_at: created_at,
        }
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile::from(self)
    }
}

/// 已验证的用户身份：填充响应和实时连接都只携带这三个字段。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.as_str().to_owned(),
            email: user.email.as_str().to_owned(),
        }
    }
}
