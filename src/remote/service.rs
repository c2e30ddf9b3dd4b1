use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RemoteConfig;
use crate::error::{message_signals_quota, RemoteError};

/// One image plus one instruction
#[derive(Debug, Clone)]
pub struct EditRequest {
    pub image: Vec<u8>,
    pub mime_type: String,
    pub instruction: String,
}

/// A piece of the service's answer
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePart {
    Text(String),
    InlineImage { mime_type: String, data: Vec<u8> },
}

/// The raw answer from an edit service, before validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditResponse {
    pub parts: Vec<ResponsePart>,
    pub finish_reason: Option<String>,
}

/// A remote image editing backend
#[async_trait]
pub trait ImageEditService: Send + Sync {
    fn name(&self) -> &str;

    /// Submit one edit request
    ///
    /// Rate limiting must surface as an error for which
    /// [`RemoteError::is_quota`] returns true.
    async fn edit(&self, request: &EditRequest) -> Result<EditResponse, RemoteError>;
}

/// Gemini `generateContent` image editing adapter
pub struct GeminiEditService {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiEditService {
    pub fn new(config: &RemoteConfig, api_key: String) -> Result<Self, RemoteError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(|e| RemoteError::NotConfigured {
            details: format!("HTTP client: {}", e),
        })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    /// Build from config, reading the key from `config.api_key_env`
    pub fn from_env(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| RemoteError::NotConfigured {
            details: format!("environment variable {} is not set", config.api_key_env),
        })?;
        Self::new(config, api_key)
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }

    fn build_body(request: &EditRequest) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part {
                        text: Some(request.instruction.clone()),
                        inline_data: None,
                    },
                    Part {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: request.mime_type.clone(),
                            data: general_purpose::STANDARD.encode(&request.image),
                        }),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
            },
        }
    }

    fn parse_response(body: GenerateResponse) -> Result<EditResponse, RemoteError> {
        let Some(candidate) = body.candidates.into_iter().next() else {
            return Ok(EditResponse {
                parts: Vec::new(),
                finish_reason: body.prompt_feedback.and_then(|f| f.block_reason),
            });
        };

        let mut parts = Vec::new();
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(inline) = part.inline_data {
                let data = general_purpose::STANDARD
                    .decode(inline.data.as_bytes())
                    .map_err(|e| RemoteError::UndecodableImage { reason: e.to_string() })?;
                parts.push(ResponsePart::InlineImage {
                    mime_type: inline.mime_type,
                    data,
                });
            } else if let Some(text) = part.text {
                parts.push(ResponsePart::Text(text));
            }
        }

        Ok(EditResponse {
            parts,
            finish_reason: candidate.finish_reason,
        })
    }
}

#[async_trait]
impl ImageEditService for GeminiEditService {
    fn name(&self) -> &str {
        &self.model
    }

    async fn edit(&self, request: &EditRequest) -> Result<EditResponse, RemoteError> {
        debug!("POST {} ({} byte image)", self.url(), request.image.len());

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::build_body(request))
            .send()
            .await
            .map_err(|e| RemoteError::Transport { reason: e.to_string() })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 || message_signals_quota(&message) {
                return Err(RemoteError::Quota { message });
            }
            return Err(RemoteError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Transport { reason: e.to_string() })?;

        Self::parse_response(body)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}
