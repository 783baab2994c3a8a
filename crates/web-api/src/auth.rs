//! 身份验证器的传输侧。
//!
//! HTTP 请求走 `Authorization: Bearer` 头，WebSocket 握手走
//! `?token=` 查询参数；两条路径最终都落到同一个 [`JwtService`]。

use axum::http::{header, HeaderMap};
use chrono::Duration;
use config::JwtConfig;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

/// 凭证载荷。`exp` 是 Unix 秒级时间戳，由 jsonwebtoken 自动校验。
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    pub exp: i64,
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            ttl: Duration::hours(config.expiration_hours),
        }
    }

    pub fn generate_token(&self, user_id: Uuid) -> Result<String, ApiError> {
        let claims = Claims {
            user_id,
            exp: (chrono::Utc::now() + self.ttl).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| ApiError::unauthorized(format!("token generation failed: {err}")))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, ApiError> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(|err| ApiError::unauthorized(format!("invalid token: {err}")))?;
        Ok(data.claims)
    }

    /// 从请求头解析并校验 bearer token，返回其携带的用户 id。
    pub fn extract_user_from_headers(&self, headers: &HeaderMap) -> Result<Uuid, ApiError> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;

        Ok(self.verify_token(token)?.user_id)
    }
}

/// 登录成功的响应：用户信息 + 新签发的 token。
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: application::UserDto,
    pub token: String,
}
