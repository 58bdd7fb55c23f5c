//! 身份校验能力：实时连接与管理接口的 JWT 校验。
//!
//! 登录与签发凭据由外部系统负责，这里只校验 access token 并提取身份。

mod jwt;

use domain::Identity;

pub use jwt::JwtManager;

/// 认证相关错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("token missing")]
    TokenMissing,
    #[error("token expired")]
    TokenExpired,
    #[error("token invalid")]
    TokenInvalid,
    #[error("internal error: {0}")]
    Internal(String),
}

/// 身份校验 trait，便于替换实现与测试。
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

impl IdentityVerifier for JwtManager {
    fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::TokenMissing);
        }
        self.decode_access(token)
    }
}
