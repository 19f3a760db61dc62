use axum::{Json, extract::State, http::StatusCode};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, SqlErr};
use tracing::{debug, info, instrument};

use crate::entity::user;
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::ValidJson;
use crate::models::auth::{Account, Credentials, NewAccount, Session};
use crate::state::AppState;
use crate::utils::{hash, jwt};

/// Sign a token for `user` with the configured secret.
fn issue_session(state: &AppState, user: user::Model) -> Result<Session, AppError> {
    let token = jwt::sign(user.id, &user.username, &state.config.auth.jwt_secret)
        .map_err(|e| AppError::Internal(format!("Token signing failed: {e}")))?;
    Ok(Session {
        token,
        expires_in: jwt::TOKEN_TTL_DAYS * 24 * 60 * 60,
        account: Account::from(user),
    })
}

/// Create an account and return a session for it.
#[utoipa::path(
    post,
    path = "/register",
    tag = "Auth",
    operation_id = "register",
    summary = "Create an account",
    request_body = NewAccount,
    responses(
        (status = 201, description = "Account created and signed in", body = Session),
        (status = 400, description = "VALIDATION_ERROR", body = ErrorBody),
        (status = 409, description = "USERNAME_TAKEN", body = ErrorBody),
    ),
)]
#[instrument(skip_all, fields(username = %body.username()))]
pub async fn register(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<NewAccount>,
) -> Result<(StatusCode, Json<Session>), AppError> {
    let password = hash::hash_password(&body.password)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {e}")))?;

    // The unique index decides between concurrent registrations.
    let created = user::ActiveModel {
        username: Set(body.username().to_owned()),
        password: Set(password),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    }
    .insert(&state.db)
    .await;

    let user = match created {
        Ok(user) => user,
        Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            debug!("Username already registered");
            return Err(AppError::UsernameTaken);
        }
        Err(e) => return Err(e.into()),
    };

    info!(user_id = user.id, "Account created");
    Ok((StatusCode::CREATED, Json(issue_session(&state, user)?)))
}

/// Exchange a username and password for a session.
#[utoipa::path(
    post,
    path = "/login",
    tag = "Auth",
    operation_id = "login",
    summary = "Sign in",
    request_body = Credentials,
    responses(
        (status = 200, description = "Signed in", body = Session),
        (status = 400, description = "VALIDATION_ERROR", body = ErrorBody),
        (status = 401, description = "INVALID_CREDENTIALS", body = ErrorBody),
    ),
)]
#[instrument(skip_all, fields(username = %body.username.trim()))]
pub async fn login(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<Credentials>,
) -> Result<Json<Session>, AppError> {
    let found = user::Entity::find()
        .filter(user::Column::Username.eq(body.username.trim()))
        .one(&state.db)
        .await?;

    let Some(user) = found else {
        debug!("Unknown username");
        return Err(AppError::InvalidCredentials);
    };

    let matches = hash::verify_password(&body.password, &user.password)
        .map_err(|e| AppError::Internal(format!("Stored password hash unreadable: {e}")))?;
    if !matches {
        debug!(user_id = user.id, "Wrong password");
        return Err(AppError::InvalidCredentials);
    }

    Ok(Json(issue_session(&state, user)?))
}

/// The account the bearer token belongs to.
#[utoipa::path(
    get,
    path = "/me",
    tag = "Auth",
    operation_id = "me",
    summary = "Current account",
    responses(
        (status = 200, description = "Token owner", body = Account),
        (status = 401, description = "TOKEN_MISSING or TOKEN_INVALID", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
pub async fn me(auth: AuthUser) -> Json<Account> {
    Json(Account {
        id: auth.user_id,
        username: auth.username,
    })
}
