use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{AiError, AiProvider, ChatRequest, ImageRequest, TranscriptionRequest};
use crate::config::AiConfig;

/// HTTP client for an OpenAI-compatible API.
pub struct OpenAiClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl OpenAiClient {
    pub fn new(config: &AiConfig) -> Result<Self, AiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AiError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
            timeout_secs: config.timeout_secs,
        })
    }

    fn api_key(&self) -> Result<&str, AiError> {
        self.api_key.as_deref().ok_or(AiError::MissingApiKey)
    }

    fn map_send_error(&self, e: reqwest::Error) -> AiError {
        if e.is_connect() {
            AiError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            AiError::Timeout(self.timeout_secs)
        } else {
            AiError::HttpClient(e.to_string())
        }
    }

    async fn read_json<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, AiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| AiError::ResponseParsing(e.to_string()))
    }
}

/// Request body for /chat/completions
#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Response body from /chat/completions
#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Request body for /images/generations
#[derive(Serialize)]
struct ImageGenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'a str,
    quality: &'a str,
    n: u8,
}

/// Response body from /images/generations
#[derive(Deserialize)]
struct ImageGenerationResponse {
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    url: Option<String>,
}

/// Response body from /audio/transcriptions
#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[async_trait]
impl AiProvider for OpenAiClient {
    async fn chat(&self, request: ChatRequest) -> Result<String, AiError> {
        let key = self.api_key()?;
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatCompletionRequest {
            model: &request.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let parsed: ChatCompletionResponse = Self::read_json(response).await?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(AiError::EmptyResponse)
    }

    async fn generate_image(&self, request: ImageRequest) -> Result<String, AiError> {
        let key = self.api_key()?;
        let url = format!("{}/images/generations", self.base_url);
        let body = ImageGenerationRequest {
            model: &request.model,
            prompt: &request.prompt,
            size: &request.size,
            quality: "standard",
            n: 1,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let parsed: ImageGenerationResponse = Self::read_json(response).await?;

        parsed
            .data
            .into_iter()
            .next()
            .and_then(|d| d.url)
            .filter(|u| !u.is_empty())
            .ok_or(AiError::EmptyResponse)
    }

    async fn transcribe(&self, request: TranscriptionRequest) -> Result<String, AiError> {
        let key = self.api_key()?;
        let url = format!("{}/audio/transcriptions", self.base_url);

        let mut part =
            reqwest::multipart::Part::bytes(request.audio.to_vec()).file_name(request.file_name);
        if let Some(mime) = request.content_type.as_deref() {
            part = part
                .mime_str(mime)
                .map_err(|e| AiError::HttpClient(e.to_string()))?;
        }

        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", request.model)
            .text("language", request.language)
            .text("response_format", "json")
            .text("temperature", request.temperature.to_string());

        let response = self
            .client
            .post(&url)
            .bearer_auth(key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let parsed: TranscriptionResponse = Self::read_json(response).await?;
        Ok(parsed.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str, api_key: Option<&str>) -> AiConfig {
        AiConfig {
            base_url: base_url.to_string(),
            api_key: api_key.map(str::to_string),
            ..AiConfig::default()
        }
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = OpenAiClient::new(&config("http://localhost:4000/v1/", None)).unwrap();
        assert_eq!(client.base_url, "http://localhost:4000/v1");
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_any_request() {
        let client = OpenAiClient::new(&config("http://127.0.0.1:9", None)).unwrap();
        let result = client
            .chat(ChatRequest {
                model: "gpt-4".into(),
                system: "s".into(),
                prompt: "p".into(),
                temperature: None,
                max_tokens: None,
            })
            .await;
        assert!(matches!(result, Err(AiError::MissingApiKey)));
    }

    #[test]
    fn chat_request_serializes_openai_shape() {
        let body = ChatCompletionRequest {
            model: "gpt-4",
            messages: [
                ChatMessage {
                    role: "system",
                    content: "be kind",
                },
                ChatMessage {
                    role: "user",
                    content: "a story",
                },
            ],
            temperature: Some(0.8),
            max_tokens: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "a story");
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn chat_response_with_null_content_parses() {
        let parsed: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }
}
