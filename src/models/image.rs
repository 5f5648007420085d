use chrono::{DateTime, Utc};
use pixel_engine::PixelBuffer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Prefix of every uploaded image id
pub const IMAGE_ID_PREFIX: &str = "img_";

/// Uploaded image identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(String);

impl ImageId {
    /// Generate a random id with 64 bits of entropy
    pub fn generate() -> Self {
        Self(format!("{IMAGE_ID_PREFIX}{}", super::random_hex()))
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata supplied alongside uploaded bytes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetadata {
    /// Original file name, if the uploader sent one
    pub file_name: Option<String>,
    /// Declared mime type; replaced by the decoded format when known
    pub mime_type: Option<String>,
}

impl ImageMetadata {
    pub fn from_file_name(name: impl Into<String>) -> Self {
        Self {
            file_name: Some(name.into()),
            mime_type: None,
        }
    }
}

/// Decoded image held in memory until it expires
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedImage {
    pub id: ImageId,
    #[serde(skip)]
    pub pixels: Arc<PixelBuffer>,
    pub width: u32,
    pub height: u32,
    /// Size of the bytes as uploaded
    pub byte_size: usize,
    pub mime_type: String,
    pub file_name: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

impl UploadedImage {
    pub fn new(pixels: PixelBuffer, byte_size: usize, mime_type: impl Into<String>) -> Self {
        Self {
            id: ImageId::generate(),
            width: pixels.width(),
            height: pixels.height(),
            pixels: Arc::new(pixels),
            byte_size,
            mime_type: mime_type.into(),
            file_name: None,
            uploaded_at: Utc::now(),
        }
    }

    pub fn with_file_name(mut self, file_name: Option<String>) -> Self {
        self.file_name = file_name;
        self
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_id_format() {
        let id = ImageId::generate();
        let hex = id.as_str().strip_prefix(IMAGE_ID_PREFIX).unwrap();
        assert_eq!(hex.len(), 16);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_image_ids_are_unique() {
        assert_ne!(ImageId::generate(), ImageId::generate());
    }

    #[test]
    fn test_uploaded_image_takes_dimensions_from_pixels() {
        let pixels = PixelBuffer::solid(7, 3, [1, 2, 3]).unwrap();
        let image = UploadedImage::new(pixels, 120, "image/png")
            .with_file_name(Some("cat.png".to_string()));

        assert_eq!(image.width, 7);
        assert_eq!(image.height, 3);
        assert_eq!(image.pixel_count(), 21);
        assert_eq!(image.byte_size, 120);
        assert_eq!(image.file_name.as_deref(), Some("cat.png"));
    }

    #[test]
    fn test_serialization_skips_pixels() {
        let pixels = PixelBuffer::solid(1, 1, [0, 0, 0]).unwrap();
        let image = UploadedImage::new(pixels, 10, "image/png");
        let json = serde_json::to_value(&image).unwrap();

        assert!(json.get("pixels").is_none());
        assert_eq!(json["mimeType"], "image/png");
        assert_eq!(json["byteSize"], 10);
    }
}
