use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{
    AiError, Choice, CompletionProvider, CompletionRequest, CompletionResponse, Message,
    MessageContent, ResponseFormat, Result, Role, Tool, ToolCall, ToolChoice, Usage,
};

/// Provider for OpenAI and OpenAI-compatible chat completion endpoints
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAIProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, "https://api.openai.com/v1".to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Rebuild the HTTP client with a per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    fn convert_message(&self, msg: Message) -> OpenAIMessage {
        let content = match msg.role {
            // Assistant turns that only carry tool calls are sent with null content
            Role::Assistant if msg.content.is_empty() && msg.has_tool_calls() => None,
            _ => Some(msg.content.to_text()),
        };

        OpenAIMessage {
            role: match msg.role {
                Role::System => "system".to_string(),
                Role::User => "user".to_string(),
                Role::Assistant => "assistant".to_string(),
                Role::Tool => "tool".to_string(),
            },
            content,
            // Thought signatures are Gemini-only
            tool_calls: msg.tool_calls.map(|calls| {
                calls
                    .into_iter()
                    .map(|call| ToolCall {
                        thought_signature: None,
                        ..call
                    })
                    .collect()
            }),
            tool_call_id: msg.tool_call_id,
        }
    }

    fn convert_response(&self, resp: OpenAIResponse) -> CompletionResponse {
        CompletionResponse {
            id: resp.id,
            model: resp.model,
            choices: resp
                .choices
                .into_iter()
                .map(|c| Choice {
                    index: c.index,
                    message: Message {
                        role: match c.message.role.as_str() {
                            "system" => Role::System,
                            "user" => Role::User,
                            "tool" => Role::Tool,
                            _ => Role::Assistant,
                        },
                        content: MessageContent::Text(c.message.content.unwrap_or_default()),
                        tool_calls: c.message.tool_calls.filter(|calls| !calls.is_empty()),
                        tool_call_id: None,
                        name: None,
                    },
                    finish_reason: c.finish_reason,
                })
                .collect(),
            usage: resp.usage,
        }
    }
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    id: String,
    model: String,
    choices: Vec<OpenAIChoice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    index: u32,
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[async_trait]
impl CompletionProvider for OpenAIProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let openai_request = OpenAIRequest {
            model: request.model,
            messages: request
                .messages
                .into_iter()
                .map(|m| self.convert_message(m))
                .collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            top_p: request.top_p,
            stop: request.stop,
            tools: request.tools.filter(|tools| !tools.is_empty()),
            tool_choice: request.tool_choice,
            response_format: request.response_format,
        };

        tracing::debug!(
            model = %openai_request.model,
            messages = openai_request.messages.len(),
            "sending OpenAI chat completion request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&openai_request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            let error_text = response.text().await?;
            return Err(AiError::from_status(
                "openai",
                status.as_u16(),
                &error_text,
                retry_after,
            ));
        }

        let openai_response: OpenAIResponse = response.json().await?;
        Ok(self.convert_response(openai_response))
    }

    fn name(&self) -> &'static str {
        "OpenAI"
    }

    fn default_model(&self) -> &'static str {
        "gpt-4o-mini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_call_turn_is_sent_without_content_or_signature() {
        let provider = OpenAIProvider::new("test-key".to_string());
        let mut call = ToolCall::new("call_1", "get_weather", r#"{"city":"Tokyo"}"#);
        call.thought_signature = Some("opaque".to_string());
        let mut assistant = Message::assistant("");
        assistant.tool_calls = Some(vec![call]);

        let body = serde_json::to_value(provider.convert_message(assistant)).unwrap();
        assert!(body["content"].is_null());
        assert_eq!(body["tool_calls"][0]["id"], "call_1");
        assert!(body["tool_calls"][0].get("thought_signature").is_none());
    }
}
