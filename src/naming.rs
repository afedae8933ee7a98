use async_trait::async_trait;
use thiserror::Error;

use crate::models::MediaType;

pub const NAMING_PROMPT: &str = "Analyze this product image. Provide a creative, marketable name for it. \
The name should be catchy and suitable for branding and e-commerce. \
Return only the name, with no additional text, quotes, or explanations.";

pub const SERVICE_FAILURE_MESSAGE: &str =
    "Failed to communicate with the AI. Please check your connection or API key and try again.";

/// Errors surfaced to callers of a [`NamingService`]. Upstream causes are
/// logged where they happen and never carried here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NamingError {
    #[error("The selected image is empty.")]
    EmptyImage,
    #[error("{}", SERVICE_FAILURE_MESSAGE)]
    Unavailable,
}

/// Turns a product photo into a name.
#[async_trait]
pub trait NamingService: Send + Sync {
    async fn generate_name(&self, image: &[u8], media_type: &MediaType) -> Result<String, NamingError>;
}

const WRAPPING_CHARS: &[char] = &['"', '*', '\u{201C}', '\u{201D}'];

/// Trims the model reply and removes quotes or emphasis markers around it.
pub fn clean_name(reply: &str) -> String {
    reply.trim().trim_matches(WRAPPING_CHARS).trim().to_string()
}
