//! Boundary to whatever authenticated the caller.
//!
//! The skin service trusts the returned id completely and performs no
//! credential checks of its own.

use thiserror::Error;

pub type UserId = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("caller is not authenticated")]
pub struct Unauthenticated;

/// Supplies the verified user id of the current caller.
pub trait IdentityContext {
    fn current_owner_id(&self) -> Result<UserId, Unauthenticated>;
}
