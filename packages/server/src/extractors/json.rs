use axum::{
    Json,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::AppError;

/// Field rules a request body must satisfy once it has been parsed.
pub trait Validate {
    fn validate(&self) -> Result<(), AppError>;
}

/// JSON body that has been parsed and passed [`Validate`].
///
/// Both malformed JSON and failed rules surface as `VALIDATION_ERROR`, so
/// handlers receive a body they can use as-is.
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let value = match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => value,
            Err(rejection) => {
                debug!(status = %rejection.status(), "Unreadable JSON body");
                return Err(AppError::Validation(rejection.body_text()));
            }
        };
        value.validate()?;
        Ok(Self(value))
    }
}
