mod error;
mod image;
mod key;
mod traits;

pub mod filesystem;

pub use error::StorageError;
pub use image::ImageType;
pub use key::StorageKey;
pub use traits::{BlobStore, BoxReader, StoredBlob};

#[cfg(test)]
pub(crate) use image::fixtures;
