use serde::{Deserialize, Serialize};

use crate::entity::user;
use crate::error::AppError;
use crate::extractors::json::Validate;

const USERNAME_MAX_CHARS: usize = 32;
const PASSWORD_BYTES: std::ops::RangeInclusive<usize> = 8..=128;

/// Body of `POST /auth/register`.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct NewAccount {
    /// 1-32 letters, digits, `_` or `-`; surrounding whitespace is dropped.
    #[schema(example = "steve_fan")]
    pub username: String,
    /// 8-128 bytes.
    #[schema(example = "correct horse")]
    pub password: String,
}

impl NewAccount {
    pub fn username(&self) -> &str {
        self.username.trim()
    }
}

impl Validate for NewAccount {
    fn validate(&self) -> Result<(), AppError> {
        let username = self.username();
        if username.is_empty() || username.chars().count() > USERNAME_MAX_CHARS {
            return Err(AppError::Validation(format!(
                "Username must be 1-{USERNAME_MAX_CHARS} characters"
            )));
        }
        if let Some(bad) = username
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(AppError::Validation(format!(
                "Username may not contain {bad:?}"
            )));
        }
        if !PASSWORD_BYTES.contains(&self.password.len()) {
            return Err(AppError::Validation(format!(
                "Password must be {}-{} bytes",
                PASSWORD_BYTES.start(),
                PASSWORD_BYTES.end()
            )));
        }
        Ok(())
    }
}

/// Body of `POST /auth/login`.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct Credentials {
    #[schema(example = "steve_fan")]
    pub username: String,
    #[schema(example = "correct horse")]
    pub password: String,
}

impl Validate for Credentials {
    fn validate(&self) -> Result<(), AppError> {
        if self.username.trim().is_empty() || self.password.is_empty() {
            return Err(AppError::Validation(
                "Username and password are required".into(),
            ));
        }
        Ok(())
    }
}

/// Public view of an account.
#[derive(Serialize, utoipa::ToSchema)]
pub struct Account {
    #[schema(example = 7)]
    pub id: i32,
    #[schema(example = "steve_fan")]
    pub username: String,
}

impl From<user::Model> for Account {
    fn from(user: user::Model) -> Self {
        Self {
            id: user.id,
            username: user.username,
        }
    }
}

/// Bearer token issued by register and login.
#[derive(Serialize, utoipa::ToSchema)]
pub struct Session {
    /// Send as `Authorization: Bearer <token>`.
    pub token: String,
    /// Seconds until the token expires.
    #[schema(example = 604800)]
    pub expires_in: i64,
    pub account: Account,
}
