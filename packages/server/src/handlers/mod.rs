pub mod auth;
pub mod skin;
