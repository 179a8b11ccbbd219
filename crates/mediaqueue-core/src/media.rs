//! Encoded media carried by job payloads and results
//!
//! Media travels through the queue as raw bytes tagged with a MIME type. It
//! serializes as a `data:` URL so job snapshots stay self-contained.

use std::fmt;
use std::path::Path;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// MIME type assumed for input images whose type cannot be determined
pub const DEFAULT_INPUT_MIME: &str = "image/jpeg";

/// MIME type assumed for generated images delivered as bare base64
pub const DEFAULT_OUTPUT_MIME: &str = "image/png";

/// Binary media with its MIME type
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct MediaData {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl MediaData {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Wrap bytes, sniffing the MIME type from magic bytes
    pub fn from_bytes(bytes: Vec<u8>, fallback_mime: &str) -> Self {
        let mime = detect_mime_type(&bytes).unwrap_or(fallback_mime);
        Self::new(mime, bytes)
    }

    /// Decode a base64 payload
    pub fn from_base64(mime_type: impl Into<String>, data: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(data.trim())
            .map_err(|e| Error::InvalidMedia(format!("Invalid base64: {}", e)))?;
        Ok(Self::new(mime_type, bytes))
    }

    /// Parse a `data:<mime>;base64,<payload>` URL.
    ///
    /// Input that is not a data URL is treated as bare base64 tagged with
    /// `default_mime`.
    pub fn parse_data_url(value: &str, default_mime: &str) -> Result<Self> {
        let value = value.trim();
        let Some(rest) = value.strip_prefix("data:") else {
            return Self::from_base64(default_mime, value);
        };

        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| Error::InvalidMedia("data URL has no payload".to_string()))?;

        let Some(mime) = header.strip_suffix(";base64") else {
            return Err(Error::InvalidMedia(
                "only base64-encoded data URLs are supported".to_string(),
            ));
        };

        let mime = if mime.is_empty() { default_mime } else { mime };
        Self::from_base64(mime, payload)
    }

    /// Parse an input image given as a data URL or bare base64.
    ///
    /// Anything not tagged `image/*` is treated as JPEG.
    pub fn parse_input_image(value: &str) -> Result<Self> {
        let mut media = Self::parse_data_url(value, DEFAULT_INPUT_MIME)?;
        if !is_image_mime(&media.mime_type) {
            media.mime_type = DEFAULT_INPUT_MIME.to_string();
        }
        Ok(media)
    }

    /// Load an input image from disk
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| Error::ImageReadError(format!("{}: {}", path.display(), e)))?;
        if bytes.is_empty() {
            return Err(Error::ImageReadError(format!("{}: file is empty", path.display())));
        }

        let mime = detect_mime_type(&bytes)
            .or_else(|| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .and_then(mime_for_extension)
            })
            .unwrap_or(DEFAULT_INPUT_MIME);

        Ok(Self::new(mime, bytes))
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }

    /// File extension matching the MIME type
    pub fn extension(&self) -> &'static str {
        extension_for_mime(&self.mime_type)
    }

    pub fn is_video(&self) -> bool {
        self.mime_type.starts_with("video/")
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for MediaData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaData")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl From<MediaData> for String {
    fn from(media: MediaData) -> Self {
        media.to_data_url()
    }
}

impl TryFrom<String> for MediaData {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse_data_url(&value, DEFAULT_OUTPUT_MIME)
    }
}

fn is_image_mime(mime: &str) -> bool {
    mime.strip_prefix("image/")
        .is_some_and(|sub| !sub.is_empty() && sub.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.'))
}

/// Serde adapter for optional input images in job payloads
pub(crate) mod input_image {
    use serde::{Deserialize, Deserializer, de::Error as _};

    use super::MediaData;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<MediaData>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|value| MediaData::parse_input_image(&value).map_err(D::Error::custom))
            .transpose()
    }
}

/// Detect MIME type from magic bytes
pub fn detect_mime_type(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        Some("image/png")
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if data.starts_with(b"RIFF") && data.get(8..12) == Some(b"WEBP") {
        Some("image/webp")
    } else if data.starts_with(b"GIF8") {
        Some("image/gif")
    } else if data.get(4..8) == Some(b"ftyp") {
        Some("video/mp4")
    } else {
        None
    }
}

fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "mp4" => Some("video/mp4"),
        _ => None,
    }
}

/// File extension for a MIME type; unknown image types are written as PNG
pub fn extension_for_mime(mime: &str) -> &'static str {
    let base = mime.split(';').next().unwrap_or(mime).trim();
    match base {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        m if m.starts_with("video/") => "mp4",
        _ => "png",
    }
}
