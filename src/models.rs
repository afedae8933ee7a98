use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MediaTypeError {
    #[error("Only image files are supported.")]
    NotAnImage(String),
    #[error("Only image files are supported.")]
    Unrecognized,
}

/// Media type of an uploaded image. Always an `image/*` type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaType(String);

impl MediaType {
    pub fn parse(raw: &str) -> Result<Self, MediaTypeError> {
        // drop parameters such as `; charset=...`
        let essence = raw.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        match essence.strip_prefix("image/") {
            Some(subtype) if !subtype.is_empty() => Ok(Self(essence)),
            _ => Err(MediaTypeError::NotAnImage(raw.to_string())),
        }
    }

    /// Detects the type from the leading magic bytes.
    pub fn sniff(data: &[u8]) -> Result<Self, MediaTypeError> {
        image::guess_format(data)
            .map(|format| Self(format.to_mime_type().to_string()))
            .map_err(|_| MediaTypeError::Unrecognized)
    }

    /// Uses the declared type when the client sent a meaningful one, otherwise sniffs.
    pub fn resolve(declared: Option<&str>, data: &[u8]) -> Result<Self, MediaTypeError> {
        match declared.map(str::trim) {
            Some(d) if !d.is_empty() && !d.eq_ignore_ascii_case("application/octet-stream") => Self::parse(d),
            _ => Self::sniff(data),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A file handed over by the upload surface, before validation.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub declared_type: Option<String>,
    pub data: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    Idle,
    Ready,
    Loading,
    Succeeded,
    Failed,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ImageView {
    pub file_name: String,
    pub media_type: MediaType,
    pub size_bytes: usize,
    pub preview_url: String,
    pub selected_at: DateTime<Utc>,
}

/// Snapshot of one controller, rendered by the page.
#[serde_with::skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionView {
    pub id: Uuid,
    pub state: RequestState,
    pub image: Option<ImageView>,
    pub name: Option<String>,
    pub generated_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub copied: bool,
    pub can_generate: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CopyResponse {
    pub text: String,
    pub session: SessionView,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn parse_accepts_image_types_and_strips_parameters() {
        assert_eq!(MediaType::parse("image/png").unwrap().as_str(), "image/png");
        assert_eq!(MediaType::parse(" Image/JPEG; q=0.9").unwrap().as_str(), "image/jpeg");
    }

    #[test]
    fn parse_rejects_non_images() {
        assert!(matches!(MediaType::parse("text/plain"), Err(MediaTypeError::NotAnImage(_))));
        assert!(MediaType::parse("image/").is_err());
        assert!(MediaType::parse("").is_err());
    }

    #[test]
    fn resolve_sniffs_when_type_is_missing_or_generic() {
        assert_eq!(MediaType::resolve(None, PNG_MAGIC).unwrap().as_str(), "image/png");
        assert_eq!(
            MediaType::resolve(Some("application/octet-stream"), PNG_MAGIC).unwrap().as_str(),
            "image/png"
        );
        assert_eq!(MediaType::resolve(None, b"hello world"), Err(MediaTypeError::Unrecognized));
    }

    #[test]
    fn resolve_trusts_declared_type() {
        assert_eq!(MediaType::resolve(Some("image/webp"), b"").unwrap().as_str(), "image/webp");
        assert!(MediaType::resolve(Some("application/pdf"), PNG_MAGIC).is_err());
    }
}
