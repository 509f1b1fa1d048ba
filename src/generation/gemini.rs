//! Gemini `generateContent` image client
//!
//! Docs: https://ai.google.dev/api/generate-content

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::client::{GenerationClient, GenerationError, SourceImage};

/// Request body for POST {base}/models/{model}:generateContent
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Debug)]
struct RequestContent<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize, Debug)]
#[serde(untagged)]
enum RequestPart<'a> {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: RequestInlineData<'a>,
    },
    Text {
        text: &'a str,
    },
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RequestInlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: [&'static str; 2],
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, rename = "inlineData", alias = "inline_data")]
    inline_data: Option<ResponseInlineData>,
}

#[derive(Deserialize, Debug)]
struct ResponseInlineData {
    #[serde(default, rename = "mimeType", alias = "mime_type")]
    mime_type: Option<String>,
    #[serde(default)]
    data: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize, Debug)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

/// Calls an image-capable Gemini model with the photo and the prompt.
#[derive(Clone, Debug)]
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
}

impl GeminiClient {
    /// Builds a client for `model` under `api_base`; every request is
    /// abandoned after `timeout`.
    pub fn new(
        api_base: &Url,
        model: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let endpoint = endpoint_for_model(api_base, model)
            .map_err(|err| GenerationError::Transport(err.to_string()))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| GenerationError::Transport(err.to_string()))?;
        Ok(Self {
            http,
            endpoint,
            api_key: api_key.into(),
        })
    }

    /// The resolved `generateContent` URL.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

fn endpoint_for_model(api_base: &Url, model: &str) -> Result<Url, url::ParseError> {
    let trimmed = model.trim();
    let model_path = if trimmed.starts_with("models/") {
        trimmed.to_string()
    } else {
        format!("models/{trimmed}")
    };
    Url::parse(&format!(
        "{}/{}:generateContent",
        api_base.as_str().trim_end_matches('/'),
        model_path
    ))
}

fn build_request<'a>(image: &'a SourceImage, prompt: &'a str) -> GenerateContentRequest<'a> {
    GenerateContentRequest {
        contents: vec![RequestContent {
            role: "user",
            parts: vec![
                RequestPart::Inline {
                    inline_data: RequestInlineData {
                        mime_type: image.mime_type(),
                        data: image.to_base64(),
                    },
                },
                RequestPart::Text { text: prompt },
            ],
        }],
        generation_config: GenerationConfig {
            response_modalities: ["IMAGE", "TEXT"],
        },
    }
}

/// Picks the first inline image out of a response; falls back to the
/// model's text (usually a refusal) or the block reason.
fn image_reference(response: GenerateContentResponse) -> Result<String, GenerationError> {
    let mut texts = Vec::new();
    let mut finish_reason = None;
    for candidate in response.candidates {
        if finish_reason.is_none() {
            finish_reason = candidate.finish_reason;
        }
        let parts = candidate
            .content
            .map(|content| content.parts)
            .unwrap_or_default();
        for part in parts {
            if let Some(inline) = part.inline_data {
                let data = inline.data.trim();
                if data.is_empty() {
                    continue;
                }
                let mime_type = inline.mime_type.as_deref().unwrap_or("image/png");
                return Ok(format!("data:{mime_type};base64,{data}"));
            }
            if let Some(text) = part.text.filter(|text| !text.trim().is_empty()) {
                texts.push(text.trim().to_string());
            }
        }
    }

    if !texts.is_empty() {
        return Err(GenerationError::Message(texts.join(" ")));
    }
    if let Some(reason) = response
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
    {
        return Err(GenerationError::Message(format!("Prompt blocked: {reason}")));
    }
    match finish_reason {
        Some(reason) if reason != "STOP" => Err(GenerationError::Message(format!(
            "Generation stopped: {reason}"
        ))),
        _ => Err(GenerationError::Unknown),
    }
}

fn api_error(status: u16, body: &[u8]) -> GenerationError {
    let message = serde_json::from_slice::<ApiErrorBody>(body)
        .map(|parsed| parsed.error.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string());
    GenerationError::Api { status, message }
}

#[async_trait]
impl GenerationClient for GeminiClient {
    async fn generate(
        &self,
        image: &SourceImage,
        prompt: &str,
    ) -> Result<String, GenerationError> {
        let request = build_request(image, prompt);
        let resp = self
            .http
            .post(self.endpoint.clone())
            .header("x-goog-api-key", self.api_key.as_str())
            .json(&request)
            .send()
            .await
            .map_err(|err| GenerationError::Transport(err.to_string()))?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|err| GenerationError::Transport(err.to_string()))?;
        debug!(
            "Gemini responded {} with {} byte(s)",
            status.as_u16(),
            bytes.len()
        );
        if !status.is_success() {
            return Err(api_error(status.as_u16(), &bytes));
        }

        let parsed: GenerateContentResponse = serde_json::from_slice(&bytes)
            .map_err(|err| GenerationError::Decode(err.to_string()))?;
        image_reference(parsed)
    }
}
