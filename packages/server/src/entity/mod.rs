pub mod skin;
pub mod user;
