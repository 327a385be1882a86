use std::sync::Arc;
use std::time::Duration;

use crate::{
    error::{RetryConfig, RetryingProvider},
    providers::{GeminiProvider, OpenAIProvider},
    AiError, CompletionProvider, CompletionRequest, CompletionResponse, Message, ResponseFormat,
    Result, Tool, ToolChoice,
};

/// Supported model providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelProvider {
    GoogleGenAi,
    OpenAi,
}

impl ModelProvider {
    /// Guess the provider from a bare model name.
    pub fn infer(model: &str) -> Option<Self> {
        let model = model.strip_prefix("models/").unwrap_or(model);
        if model.starts_with("gemini") {
            Some(ModelProvider::GoogleGenAi)
        } else if ["gpt", "o1", "o3", "o4", "chatgpt"].iter().any(|p| model.starts_with(p)) {
            Some(ModelProvider::OpenAi)
        } else {
            None
        }
    }

    /// Environment variables consulted for the API key, in order.
    pub fn api_key_vars(&self) -> &'static [&'static str] {
        match self {
            ModelProvider::GoogleGenAi => &["GOOGLE_API_KEY", "GEMINI_API_KEY"],
            ModelProvider::OpenAi => &["OPENAI_API_KEY"],
        }
    }
}

impl std::str::FromStr for ModelProvider {
    type Err = AiError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google_genai" | "google" | "gemini" => Ok(ModelProvider::GoogleGenAi),
            "openai" => Ok(ModelProvider::OpenAi),
            other => Err(AiError::ConfigurationError {
                field: "model.provider".to_string(),
                message: format!("unsupported model provider '{}'", other),
            }),
        }
    }
}

impl std::fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelProvider::GoogleGenAi => write!(f, "google_genai"),
            ModelProvider::OpenAi => write!(f, "openai"),
        }
    }
}

/// Options for [`init_chat_model`]
#[derive(Debug, Clone, Default)]
pub struct ModelSettings {
    /// Explicit provider; inferred from the model name when absent
    pub provider: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout: Option<Duration>,
    /// Retries after the first attempt for transient provider errors
    pub max_retries: u32,
    /// Overrides the environment lookup
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

/// A provider bound to a model name and sampling parameters
#[derive(Clone)]
pub struct ChatModel {
    provider: Arc<dyn CompletionProvider>,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    top_p: Option<f32>,
}

impl ChatModel {
    pub fn new(provider: Arc<dyn CompletionProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: None,
            max_tokens: None,
            top_p: None,
        }
    }

    /// Use the provider's default model
    pub fn from_provider<P: CompletionProvider + 'static>(provider: P) -> Self {
        let model = provider.default_model().to_string();
        Self::new(Arc::new(provider), model)
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Build a request carrying this model's sampling parameters
    pub fn request(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<Tool>>,
        tool_choice: Option<ToolChoice>,
        response_format: Option<ResponseFormat>,
    ) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: self.top_p,
            stop: None,
            tools,
            tool_choice,
            response_format,
        }
    }

    pub async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.provider.complete(request).await
    }

    /// Single-turn convenience call without tools
    pub async fn invoke(&self, messages: Vec<Message>) -> Result<Message> {
        let response = self.complete(self.request(messages, None, None, None)).await?;
        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| AiError::MalformedResponse {
                message: "No choices in response".to_string(),
                raw_response: None,
            })
    }
}

impl std::fmt::Debug for ChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatModel")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// Create a chat model from a model name such as `gemini-2.5-flash` or
/// `google_genai:gemini-2.5-flash`.
pub fn init_chat_model(model: &str, settings: &ModelSettings) -> Result<ChatModel> {
    let (prefix, model_name) = match model.split_once(':') {
        Some((prefix, rest)) => (Some(prefix), rest),
        None => (None, model),
    };

    let provider: ModelProvider = match settings.provider.as_deref().or(prefix) {
        Some(name) => name.parse()?,
        None => ModelProvider::infer(model_name).ok_or_else(|| AiError::ConfigurationError {
            field: "model.provider".to_string(),
            message: format!("cannot infer a provider for model '{}'", model_name),
        })?,
    };

    let api_key = match &settings.api_key {
        Some(key) => key.clone(),
        None => provider
            .api_key_vars()
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
            .ok_or_else(|| AiError::MissingConfiguration {
                field: provider.api_key_vars().join(" or "),
                description: format!("API key for the {} provider", provider),
            })?,
    };

    let inner: Arc<dyn CompletionProvider> = match provider {
        ModelProvider::GoogleGenAi => {
            let mut gemini = match &settings.base_url {
                Some(url) => GeminiProvider::with_base_url(api_key, url.clone()),
                None => GeminiProvider::new(api_key),
            };
            if let Some(timeout) = settings.timeout {
                gemini = gemini.with_timeout(timeout)?;
            }
            Arc::new(gemini)
        }
        ModelProvider::OpenAi => {
            let mut openai = match &settings.base_url {
                Some(url) => OpenAIProvider::with_base_url(api_key, url.clone()),
                None => OpenAIProvider::new(api_key),
            };
            if let Some(timeout) = settings.timeout {
                openai = openai.with_timeout(timeout)?;
            }
            Arc::new(openai)
        }
    };

    let provider_handle: Arc<dyn CompletionProvider> = if settings.max_retries > 0 {
        Arc::new(RetryingProvider::new(
            inner,
            RetryConfig::with_max_retries(settings.max_retries),
        ))
    } else {
        inner
    };

    tracing::debug!(%provider, model = model_name, "initialised chat model");

    let mut chat_model = ChatModel::new(provider_handle, model_name);
    chat_model.temperature = settings.temperature;
    chat_model.max_tokens = settings.max_tokens;
    Ok(chat_model)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_key() -> ModelSettings {
        ModelSettings {
            api_key: Some("test-key".to_string()),
            temperature: Some(0.7),
            max_tokens: Some(1000),
            ..Default::default()
        }
    }

    #[test]
    fn test_infer_provider() {
        assert_eq!(ModelProvider::infer("gemini-2.5-flash"), Some(ModelProvider::GoogleGenAi));
        assert_eq!(ModelProvider::infer("models/gemini-1.5-pro"), Some(ModelProvider::GoogleGenAi));
        assert_eq!(ModelProvider::infer("gpt-4o-mini"), Some(ModelProvider::OpenAi));
        assert_eq!(ModelProvider::infer("llama3"), None);
    }

    #[test]
    fn test_init_with_prefix() {
        let model = init_chat_model("google_genai:gemini-2.5-flash", &settings_with_key()).unwrap();
        assert_eq!(model.model_name(), "gemini-2.5-flash");
        assert_eq!(model.provider_name(), "Gemini");

        let request = model.request(vec![Message::user("hi")], None, None, None);
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.max_tokens, Some(1000));
    }

    #[test]
    fn test_explicit_provider_wins() {
        let settings = ModelSettings {
            provider: Some("openai".to_string()),
            ..settings_with_key()
        };
        let model = init_chat_model("my-local-model", &settings).unwrap();
        assert_eq!(model.provider_name(), "OpenAI");
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let err = init_chat_model("mystery-model", &settings_with_key()).unwrap_err();
        assert!(matches!(err, AiError::ConfigurationError { .. }));

        let err = init_chat_model("acme:thing", &settings_with_key()).unwrap_err();
        assert!(matches!(err, AiError::ConfigurationError { .. }));
    }

    #[test]
    fn test_retries_keep_provider_name() {
        let settings = ModelSettings {
            max_retries: 2,
            timeout: Some(Duration::from_secs(30)),
            ..settings_with_key()
        };
        let model = init_chat_model("gemini-2.5-flash", &settings).unwrap();
        assert_eq!(model.provider_name(), "Gemini");
    }
}
