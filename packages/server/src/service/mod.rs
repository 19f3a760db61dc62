mod error;
pub mod skin;

pub use error::SkinError;
pub use skin::{SkinEdit, SkinFile, SkinService, SweepReport};
