use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::extract::multipart::Field;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, body::Body};
use chrono::{DateTime, Utc};
use tokio_util::io::ReaderStream;
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::models::skin::{SkinListResponse, SkinResponse};
use crate::service::skin::MAX_SKINS_PER_USER;
use crate::service::{SkinEdit, SkinFile};
use crate::state::AppState;

/// Room for multipart framing and the name part on top of the file itself.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

pub fn skin_body_limit(max_blob_size: u64) -> DefaultBodyLimit {
    DefaultBodyLimit::max((max_blob_size + MULTIPART_OVERHEAD) as usize)
}

/// Parts of a skin multipart form. Both are optional at this level.
#[derive(Default)]
struct SkinForm {
    name: Option<String>,
    file: Option<SkinFile>,
}

async fn read_form(mut multipart: Multipart) -> Result<SkinForm, AppError> {
    let mut form = SkinForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        match field.name() {
            Some("name") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read name: {e}")))?;
                form.name = Some(text);
            }
            Some("file") => form.file = Some(read_file(field).await?),
            _ => {} // Ignore unknown fields.
        }
    }

    Ok(form)
}

/// Read the file part, taking its declared type from the part header or,
/// failing that, from the filename extension.
async fn read_file(field: Field<'_>) -> Result<SkinFile, AppError> {
    let content_type = field
        .content_type()
        .map(str::to_string)
        .or_else(|| {
            field
                .file_name()
                .and_then(|name| mime_guess::from_path(name).first())
                .map(|m| m.to_string())
        })
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let data = field
        .bytes()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read file: {e}")))?;

    Ok(SkinFile {
        data: data.to_vec(),
        content_type,
    })
}

#[utoipa::path(
    post,
    path = "/",
    tag = "Skins",
    operation_id = "uploadSkin",
    summary = "Upload a skin",
    description = "Stores a new skin for the caller. Multipart fields: `name` (required, 1-64 \
        characters) and `file` (required, PNG or JPEG). Each user may own at most 10 skins.",
    request_body(content_type = "multipart/form-data", description = "Skin name and image file"),
    responses(
        (status = 201, description = "Skin stored", body = SkinResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 409, description = "Skin limit reached (QUOTA_EXCEEDED)", body = ErrorBody),
        (status = 503, description = "Timed out (UNAVAILABLE)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(user_id = auth_user.user_id))]
pub async fn upload_skin(
    auth_user: AuthUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = read_form(multipart).await?;
    let name = form
        .name
        .ok_or_else(|| AppError::Validation("Missing 'name' field".into()))?;
    let file = form
        .file
        .ok_or_else(|| AppError::Validation("Missing 'file' field".into()))?;

    let skin = state.skins.upload(&auth_user, &name, &file).await?;

    Ok((StatusCode::CREATED, Json(SkinResponse::from(skin))))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Skins",
    operation_id = "listSkins",
    summary = "List the caller's skins",
    responses(
        (status = 200, description = "Skins in upload order", body = SkinListResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn list_skins(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<SkinListResponse>, AppError> {
    let skins = state.skins.list(&auth_user).await?;

    Ok(Json(SkinListResponse {
        total: skins.len() as u64,
        skins: skins.into_iter().map(SkinResponse::from).collect(),
        limit: MAX_SKINS_PER_USER,
    }))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Skins",
    operation_id = "getSkin",
    summary = "Get one of the caller's skins",
    params(("id" = i32, Path, description = "Skin ID")),
    responses(
        (status = 200, description = "Skin metadata", body = SkinResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Owned by another user (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Skin not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn get_skin(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<SkinResponse>, AppError> {
    let skin = state.skins.get(&auth_user, id).await?;
    Ok(Json(SkinResponse::from(skin)))
}

#[utoipa::path(
    patch,
    path = "/{id}",
    tag = "Skins",
    operation_id = "editSkin",
    summary = "Rename a skin or replace its file",
    description = "Multipart fields `name` and `file` are both optional; omitted parts are left \
        unchanged. A replaced file keeps the skin's identity.",
    params(("id" = i32, Path, description = "Skin ID")),
    request_body(content_type = "multipart/form-data", description = "New name and/or image file"),
    responses(
        (status = 200, description = "Skin updated", body = SkinResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Owned by another user (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Skin not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(user_id = auth_user.user_id))]
pub async fn edit_skin(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    multipart: Multipart,
) -> Result<Json<SkinResponse>, AppError> {
    let form = read_form(multipart).await?;
    let changes = SkinEdit {
        display_name: form.name,
        file: form.file,
    };

    let skin = state.skins.edit(&auth_user, id, &changes).await?;
    Ok(Json(SkinResponse::from(skin)))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Skins",
    operation_id = "deleteSkin",
    summary = "Delete a skin",
    params(("id" = i32, Path, description = "Skin ID")),
    responses(
        (status = 204, description = "Skin deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Owned by another user (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Skin not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn delete_skin(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    state.skins.delete(&auth_user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/{id}/file",
    tag = "Skins",
    operation_id = "downloadSkin",
    summary = "Download a skin's image",
    description = "Streams the image. Supports ETag-based caching via If-None-Match.",
    params(("id" = i32, Path, description = "Skin ID")),
    responses(
        (status = 200, description = "Image content"),
        (status = 304, description = "Not Modified (ETag match)"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Owned by another user (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Skin not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, headers), fields(user_id = auth_user.user_id))]
pub async fn download_skin(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let (skin, reader) = state.skins.open(&auth_user, id).await?;

    let etag_value = etag(&skin.storage_key, skin.updated_at);
    if let Some(if_none_match) = headers.get(header::IF_NONE_MATCH)
        && let Ok(val) = if_none_match.to_str()
        && (val == etag_value || val == "*")
    {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    let body = Body::from_stream(ReaderStream::new(reader));

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, &skin.content_type)
        .header(header::CONTENT_LENGTH, skin.size.to_string())
        .header(header::ETAG, &etag_value)
        .header(header::CACHE_CONTROL, "private, max-age=3600")
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))?;

    Ok(response)
}

/// The storage key is stable across replaces, so the modification time is
/// folded in to tell file versions apart.
fn etag(storage_key: &str, updated_at: DateTime<Utc>) -> String {
    format!(
        "\"{}-{:x}\"",
        &storage_key[..16.min(storage_key.len())],
        updated_at.timestamp_micros()
    )
}
