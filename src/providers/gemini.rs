use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::{
    AiError, Choice, CompletionProvider, CompletionRequest, CompletionResponse, Message,
    MessageContent, ResponseFormatType, Result, Role, Tool, ToolCall, ToolChoice, Usage,
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini provider for the Generative Language API
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string())
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

    fn endpoint(&self, model: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<GeminiToolConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<GeminiFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<GeminiFunctionResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
    /// Opaque token attached to function calls; must be echoed back on replay
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought_signature: Option<String>,
}

impl GeminiPart {
    fn text(text: String) -> Self {
        Self {
            text: Some(text),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiToolConfig {
    function_calling_config: FunctionCallingConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FunctionCallingConfig {
    mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    allowed_function_names: Option<Vec<String>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
    model_version: Option<String>,
    response_id: Option<String>,
    prompt_feedback: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
    #[serde(default)]
    index: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = request.model.clone();
        let gemini_request = build_gemini_request(request);

        tracing::debug!(
            model = %model,
            contents = gemini_request.contents.len(),
            "sending Gemini generateContent request"
        );

        let response = self
            .client
            .post(self.endpoint(&model))
            .header("x-goog-api-key", &self.api_key)
            .json(&gemini_request)
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
                "gemini",
                status.as_u16(),
                &error_text,
                retry_after,
            ));
        }

        let gemini_response: GeminiResponse = response.json().await?;
        convert_response(gemini_response, model)
    }

    fn name(&self) -> &'static str {
        "Gemini"
    }

    fn default_model(&self) -> &'static str {
        "gemini-2.5-flash"
    }
}

fn build_gemini_request(request: CompletionRequest) -> GeminiRequest {
    let (system_instruction, contents) = convert_messages_to_gemini(request.messages);

    let tools = request
        .tools
        .filter(|tools| !tools.is_empty())
        .map(|tools| vec![convert_tools(tools)]);

    let tool_config = match (&tools, request.tool_choice) {
        (Some(_), Some(choice)) => Some(GeminiToolConfig {
            function_calling_config: convert_tool_choice(choice),
        }),
        _ => None,
    };

    let (response_mime_type, response_schema) = match request.response_format {
        Some(format) => match format.r#type {
            ResponseFormatType::JsonSchema => (
                Some("application/json"),
                format.json_schema.map(|s| sanitize_schema(s.schema)),
            ),
            ResponseFormatType::JsonObject => (Some("application/json"), None),
            ResponseFormatType::Text => (None, None),
        },
        None => (None, None),
    };

    GeminiRequest {
        contents,
        system_instruction,
        tools,
        tool_config,
        generation_config: Some(GenerationConfig {
            temperature: request.temperature,
            max_output_tokens: request.max_tokens,
            top_p: request.top_p,
            stop_sequences: request.stop,
            response_mime_type,
            response_schema,
        }),
    }
}

fn convert_messages_to_gemini(messages: Vec<Message>) -> (Option<GeminiContent>, Vec<GeminiContent>) {
    let mut system_parts = Vec::new();
    let mut contents: Vec<GeminiContent> = Vec::new();

    for message in messages {
        let (role, parts) = match message.role {
            Role::System => {
                system_parts.push(GeminiPart::text(message.content.to_text()));
                continue;
            }
            Role::User => ("user", vec![GeminiPart::text(message.content.to_text())]),
            Role::Assistant => {
                let mut parts = Vec::new();
                let text = message.content.to_text();
                if !text.is_empty() {
                    parts.push(GeminiPart::text(text));
                }
                for call in message.tool_calls.unwrap_or_default() {
                    let args = serde_json::from_str(&call.function.arguments)
                        .unwrap_or_else(|_| Value::Object(Default::default()));
                    parts.push(GeminiPart {
                        function_call: Some(GeminiFunctionCall {
                            id: None,
                            name: call.function.name,
                            args,
                        }),
                        thought_signature: call.thought_signature,
                        ..Default::default()
                    });
                }
                ("model", parts)
            }
            Role::Tool => {
                // Tool results go back to Gemini as functionResponse parts in a user turn
                let part = GeminiPart {
                    function_response: Some(GeminiFunctionResponse {
                        name: message.name.unwrap_or_default(),
                        response: tool_response_value(&message.content.to_text()),
                    }),
                    ..Default::default()
                };
                ("user", vec![part])
            }
        };

        if parts.is_empty() {
            continue;
        }

        match contents.last_mut() {
            Some(last) if last.role.as_deref() == Some(role) => last.parts.extend(parts),
            _ => contents.push(GeminiContent {
                role: Some(role.to_string()),
                parts,
            }),
        }
    }

    let system_instruction = if system_parts.is_empty() {
        None
    } else {
        Some(GeminiContent {
            role: None,
            parts: system_parts,
        })
    };

    (system_instruction, contents)
}

/// functionResponse.response must be a JSON object.
fn tool_response_value(content: &str) -> Value {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(map)) => Value::Object(map),
        Ok(other) => serde_json::json!({ "result": other }),
        Err(_) => serde_json::json!({ "result": content }),
    }
}

fn convert_tools(tools: Vec<Tool>) -> GeminiTool {
    GeminiTool {
        function_declarations: tools
            .into_iter()
            .map(|tool| {
                let has_properties = tool.function.parameters["properties"]
                    .as_object()
                    .is_some_and(|props| !props.is_empty());
                GeminiFunctionDeclaration {
                    name: tool.function.name,
                    description: tool.function.description,
                    // Gemini rejects OBJECT schemas without properties
                    parameters: has_properties.then(|| sanitize_schema(tool.function.parameters)),
                }
            })
            .collect(),
    }
}

fn convert_tool_choice(choice: ToolChoice) -> FunctionCallingConfig {
    match choice {
        ToolChoice::String(mode) => FunctionCallingConfig {
            mode: match mode.as_str() {
                "required" | "any" => "ANY",
                "none" => "NONE",
                _ => "AUTO",
            },
            allowed_function_names: None,
        },
        ToolChoice::Object(object) => FunctionCallingConfig {
            mode: "ANY",
            allowed_function_names: Some(vec![object.function.name]),
        },
    }
}

/// Strip JSON-schema keywords the Gemini schema dialect does not accept.
fn sanitize_schema(schema: Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| !matches!(key.as_str(), "additionalProperties" | "$schema" | "title"))
                .map(|(key, value)| match key.as_str() {
                    "properties" => (key, sanitize_properties(value)),
                    _ => (key, sanitize_schema(value)),
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_schema).collect()),
        other => other,
    }
}

/// Keys of a `properties` map are field names, so only their schemas are sanitized.
fn sanitize_properties(properties: Value) -> Value {
    match properties {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(name, schema)| (name, sanitize_schema(schema)))
                .collect(),
        ),
        other => sanitize_schema(other),
    }
}

fn convert_response(response: GeminiResponse, requested_model: String) -> Result<CompletionResponse> {
    if response.candidates.is_empty() {
        return Err(AiError::MalformedResponse {
            message: "Gemini returned no candidates".to_string(),
            raw_response: response.prompt_feedback.map(|f| f.to_string()),
        });
    }

    let choices = response
        .candidates
        .into_iter()
        .map(|candidate| {
            let parts = candidate.content.map(|c| c.parts).unwrap_or_default();

            let mut text = String::new();
            let mut tool_calls = Vec::new();
            for part in parts {
                if part.thought == Some(true) {
                    continue;
                }
                if let Some(t) = part.text {
                    text.push_str(&t);
                }
                if let Some(call) = part.function_call {
                    let id = call
                        .id
                        .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
                    let mut tool_call = ToolCall::new(id, call.name, call.args.to_string());
                    tool_call.thought_signature = part.thought_signature;
                    tool_calls.push(tool_call);
                }
            }

            Choice {
                index: candidate.index,
                message: Message {
                    role: Role::Assistant,
                    content: MessageContent::text(text),
                    tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
                    tool_call_id: None,
                    name: None,
                },
                finish_reason: candidate.finish_reason,
            }
        })
        .collect();

    let usage = response.usage_metadata.map(|u| Usage {
        prompt_tokens: u.prompt_token_count,
        completion_tokens: u.candidates_token_count,
        total_tokens: u.total_token_count,
    });

    Ok(CompletionResponse {
        id: response
            .response_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        model: response.model_version.unwrap_or(requested_model),
        choices,
        usage,
    })
}
