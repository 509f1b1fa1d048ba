//! Boundary to the remote image generator

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose;

/// The photo a run transforms. Cheap to clone.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SourceImage {
    bytes: Arc<[u8]>,
    mime_type: String,
}

impl SourceImage {
    /// Wraps already-validated image bytes.
    pub fn new(bytes: impl Into<Arc<[u8]>>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Raw image bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// MIME type, eg `image/png`.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Base64 payload without any `data:` prefix.
    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.bytes)
    }

    /// Renders the image as a `data:` URL.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

/// Why a single generation call failed.
#[derive(Debug)]
pub enum GenerationError {
    /// The request never produced a response (connect, timeout, body read).
    Transport(String),
    /// The API answered with a non-success status.
    Api {
        /// HTTP status code
        status: u16,
        /// Message extracted from the error body
        message: String,
    },
    /// The response could not be decoded.
    Decode(String),
    /// The generator declined with an explanation, eg a safety refusal.
    Message(String),
    /// Failure without any usable explanation.
    Unknown,
}

impl GenerationError {
    /// Text to show on the failed theme, `None` when there is nothing useful
    /// to say and a generic message should be used instead.
    pub fn user_message(&self) -> Option<String> {
        let message = match self {
            GenerationError::Unknown => return None,
            GenerationError::Message(message) => message.trim().to_string(),
            other => other.to_string(),
        };
        if message.is_empty() {
            None
        } else {
            Some(message)
        }
    }
}

impl std::fmt::Display for GenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(err) => write!(f, "Generation request failed: {err}"),
            Self::Api { status, message } => write!(f, "Generation API error {status}: {message}"),
            Self::Decode(err) => write!(f, "Failed to decode generation response: {err}"),
            Self::Message(message) => f.write_str(message),
            Self::Unknown => f.write_str(""),
        }
    }
}

impl std::error::Error for GenerationError {}

/// Produces one rendered image for a source image and an instruction.
///
/// Calls are at-most-once: implementations must not retry on their own.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Returns a reference the display can load directly, typically a
    /// `data:` URL.
    async fn generate(&self, image: &SourceImage, prompt: &str)
    -> Result<String, GenerationError>;
}

/// Offline stand-in that hands the source photo back unchanged.
#[derive(Clone, Debug, Default)]
pub struct EchoClient;

#[async_trait]
impl GenerationClient for EchoClient {
    async fn generate(
        &self,
        image: &SourceImage,
        _prompt: &str,
    ) -> Result<String, GenerationError> {
        Ok(image.to_data_url())
    }
}
