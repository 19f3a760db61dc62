use std::fmt;

use super::error::StorageError;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_SIGNATURE: &[u8] = &[0xFF, 0xD8, 0xFF];

/// Raster formats accepted for storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageType {
    Png,
    Jpeg,
}

impl ImageType {
    /// Every accepted format.
    pub const ALL: [ImageType; 2] = [ImageType::Png, ImageType::Jpeg];

    /// Canonical MIME type.
    pub fn mime(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }

    /// Resolve a declared MIME type against the allow-list.
    ///
    /// Parameters (`; charset=...`) and case are ignored. `image/jpg` is
    /// accepted as a common alias of `image/jpeg`.
    pub fn from_mime(declared: &str) -> Option<Self> {
        let essence = declared.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    /// Detect the format from the leading magic bytes.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(PNG_SIGNATURE) {
            Some(Self::Png)
        } else if data.starts_with(JPEG_SIGNATURE) {
            Some(Self::Jpeg)
        } else {
            None
        }
    }

    /// Check a declared type against the allow-list and the actual content.
    pub fn validate(declared: &str, data: &[u8]) -> Result<Self, StorageError> {
        let image_type = Self::from_mime(declared)
            .ok_or_else(|| StorageError::InvalidType(format!("'{declared}' is not allowed")))?;

        match Self::sniff(data) {
            Some(actual) if actual == image_type => Ok(image_type),
            Some(actual) => Err(StorageError::InvalidType(format!(
                "declared {} but content is {}",
                image_type.mime(),
                actual.mime()
            ))),
            None => Err(StorageError::InvalidType(format!(
                "content is not a valid {} image",
                image_type.mime()
            ))),
        }
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}
