use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{
    Checkpoint, Checkpointer, ResponseFormatStrategy, ToolRegistry, ToolRuntime, ToolStrategy,
};
use crate::{AiError, ChatModel, Message, Role, ToolCall, ToolChoice};

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Provider error: {0}")]
    ProviderError(#[from] AiError),

    #[error("Tool execution error: {0}")]
    ToolError(String),

    #[error("Structured output error: {0}")]
    StructuredOutputError(String),

    #[error("Checkpoint error: {0}")]
    CheckpointError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Recursion limit of {0} steps reached without a final answer")]
    RecursionLimit(usize),
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// Configuration for an agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model calls allowed per invocation
    pub max_iterations: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { max_iterations: 25 }
    }
}

/// Per-invocation settings
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    /// Conversation thread; required when the agent has a checkpointer
    pub thread_id: Option<String>,
    /// Overrides [`AgentConfig::max_iterations`] for this run
    pub max_iterations: Option<usize>,
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            max_iterations: None,
        }
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }
}

/// Messages appended to the conversation at the start of a run
#[derive(Debug, Clone)]
pub struct AgentInput {
    messages: Vec<Message>,
}

impl AgentInput {
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

impl From<&str> for AgentInput {
    fn from(text: &str) -> Self {
        Self {
            messages: vec![Message::user(text)],
        }
    }
}

impl From<String> for AgentInput {
    fn from(text: String) -> Self {
        Self {
            messages: vec![Message::user(text)],
        }
    }
}

impl From<Message> for AgentInput {
    fn from(message: Message) -> Self {
        Self {
            messages: vec![message],
        }
    }
}

impl From<Vec<Message>> for AgentInput {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

/// Result of a run: the full conversation and any structured response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_response: Option<Value>,
}

impl AgentState {
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Text of the latest assistant message that has any
    pub fn last_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::Assistant && !m.content.is_empty())
            .map(|m| m.content.to_text())
            .next()
    }

    /// Deserialize the structured response
    pub fn structured<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self.structured_response.clone().ok_or_else(|| {
            AgentError::StructuredOutputError(
                "Agent finished without a structured response".to_string(),
            )
        })?;
        serde_json::from_value(value).map_err(|e| {
            AgentError::StructuredOutputError(format!("Failed to deserialize structured response: {}", e))
        })
    }
}

/// A tool-calling agent over a chat model
///
/// `C` is the runtime context handed to tools on every invocation.
pub struct Agent<C = ()> {
    model: ChatModel,
    system_prompt: Option<String>,
    tools: ToolRegistry<C>,
    response_format: Option<ResponseFormatStrategy>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    config: AgentConfig,
}

impl<C: Send + Sync + 'static> Agent<C> {
    pub(crate) fn new(
        model: ChatModel,
        system_prompt: Option<String>,
        tools: ToolRegistry<C>,
        response_format: Option<ResponseFormatStrategy>,
        checkpointer: Option<Arc<dyn Checkpointer>>,
        config: AgentConfig,
    ) -> Self {
        Self {
            model,
            system_prompt,
            tools,
            response_format,
            checkpointer,
            config,
        }
    }

    pub fn model(&self) -> &ChatModel {
        &self.model
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn tools(&self) -> &ToolRegistry<C> {
        &self.tools
    }

    pub fn response_format(&self) -> Option<&ResponseFormatStrategy> {
        self.response_format.as_ref()
    }

    pub fn checkpointer(&self) -> Option<&Arc<dyn Checkpointer>> {
        self.checkpointer.as_ref()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Latest saved state of a thread, if the agent has a checkpointer
    pub async fn get_state(&self, thread_id: &str) -> Result<Option<AgentState>> {
        match &self.checkpointer {
            Some(checkpointer) => Ok(checkpointer.get(thread_id).await?.map(|c| c.state())),
            None => Ok(None),
        }
    }

    /// Run the agent until the model produces a final answer
    pub async fn invoke(
        &self,
        input: impl Into<AgentInput>,
        run: &RunConfig,
        context: &C,
    ) -> Result<AgentState> {
        let thread_id = run.thread_id.as_deref();
        let mut state = AgentState::default();
        let mut parent: Option<Checkpoint> = None;

        if let Some(checkpointer) = &self.checkpointer {
            let thread = thread_id.ok_or_else(|| {
                AgentError::ConfigError(
                    "An agent with a checkpointer requires RunConfig.thread_id".to_string(),
                )
            })?;
            if let Some(checkpoint) = checkpointer.get(thread).await? {
                debug!(thread = thread, step = checkpoint.step, "resuming thread");
                state.messages = checkpoint.messages.clone();
                parent = Some(checkpoint);
            }
        }

        state.messages.extend(input.into().into_messages());
        self.save_checkpoint(thread_id, &mut parent, &state).await?;

        let limit = run.max_iterations.unwrap_or(self.config.max_iterations);
        let mut steps = 0;

        loop {
            if steps >= limit {
                warn!(limit, "agent hit its recursion limit");
                return Err(AgentError::RecursionLimit(limit));
            }
            steps += 1;

            let reply = self.call_model(&state.messages).await?;
            let tool_calls = reply.tool_calls.clone().unwrap_or_default();
            state.messages.push(reply);

            if tool_calls.is_empty() {
                if let Some(ResponseFormatStrategy::Provider(strategy)) = &self.response_format {
                    let text = state.last_message().map(|m| m.content.to_text()).unwrap_or_default();
                    let value = strategy.parse(&text).map_err(AgentError::StructuredOutputError)?;
                    state.structured_response = Some(value);
                }
                self.save_checkpoint(thread_id, &mut parent, &state).await?;
                break;
            }

            let (tool_messages, structured) = self
                .execute_tools(&tool_calls, &state.messages, thread_id, context)
                .await?;
            state.messages.extend(tool_messages);

            let done = structured.is_some();
            if done {
                state.structured_response = structured;
            }
            self.save_checkpoint(thread_id, &mut parent, &state).await?;

            if done {
                break;
            }
        }

        info!(thread = thread_id.unwrap_or("-"), steps, "agent run finished");
        Ok(state)
    }

    async fn call_model(&self, messages: &[Message]) -> Result<Message> {
        let mut request_messages = Vec::with_capacity(messages.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            request_messages.push(Message::system(prompt.clone()));
        }
        request_messages.extend(messages.iter().cloned());

        let mut tools = self.tools.to_tools();
        let mut tool_choice = None;
        let mut response_format = None;

        match &self.response_format {
            Some(ResponseFormatStrategy::Tool(strategy)) => {
                tools.push(strategy.tool());
                tool_choice = Some(ToolChoice::required());
            }
            Some(ResponseFormatStrategy::Provider(strategy)) => {
                response_format = Some(strategy.response_format());
            }
            None => {}
        }

        if tool_choice.is_none() && !tools.is_empty() {
            tool_choice = Some(ToolChoice::auto());
        }
        let tools = if tools.is_empty() { None } else { Some(tools) };

        debug!(
            model = self.model.model_name(),
            messages = request_messages.len(),
            tools = tools.as_ref().map(|t| t.len()).unwrap_or(0),
            "calling model"
        );

        let request = self.model.request(request_messages, tools, tool_choice, response_format);
        let response = self.model.complete(request).await?;

        let mut message = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| AiError::MalformedResponse {
                message: "No choices in response".to_string(),
                raw_response: None,
            })?;
        message.role = Role::Assistant;

        debug!(
            tool_calls = message.tool_calls.as_ref().map(|c| c.len()).unwrap_or(0),
            "model replied"
        );
        Ok(message)
    }

    /// Answer every call of one assistant turn, in call order
    ///
    /// Returns the tool messages and the structured response when a
    /// structured-output call was accepted.
    async fn execute_tools(
        &self,
        calls: &[ToolCall],
        messages: &[Message],
        thread_id: Option<&str>,
        context: &C,
    ) -> Result<(Vec<Message>, Option<Value>)> {
        let strategy = match &self.response_format {
            Some(ResponseFormatStrategy::Tool(strategy)) => Some(strategy),
            _ => None,
        };
        let is_structured =
            |call: &ToolCall| strategy.is_some_and(|s| s.tool_name() == call.function.name);

        let regular: Vec<&ToolCall> = calls.iter().filter(|&c| !is_structured(c)).collect();
        let results = join_all(
            regular
                .iter()
                .map(|call| self.execute_tool(call, messages, thread_id, context)),
        )
        .await;
        let mut regular_results = results.into_iter();

        let structured_calls: Vec<&ToolCall> = calls.iter().filter(|&c| is_structured(c)).collect();
        let mut structured_messages = match strategy {
            Some(strategy) if !structured_calls.is_empty() => {
                Some(self.apply_structured_calls(strategy, &structured_calls)?)
            }
            _ => None,
        };

        let mut tool_messages = Vec::with_capacity(calls.len());
        let mut structured_index = 0;
        for call in calls {
            if is_structured(call) {
                if let Some((messages, _)) = &structured_messages {
                    if let Some(message) = messages.get(structured_index) {
                        tool_messages.push(message.clone());
                    }
                }
                structured_index += 1;
            } else if let Some(result) = regular_results.next() {
                tool_messages.push(result?);
            }
        }

        let structured = structured_messages.take().and_then(|(_, value)| value);
        Ok((tool_messages, structured))
    }

    async fn execute_tool(
        &self,
        call: &ToolCall,
        messages: &[Message],
        thread_id: Option<&str>,
        context: &C,
    ) -> Result<Message> {
        let name = &call.function.name;
        debug!(tool = %name, call_id = %call.id, "executing tool");

        let content = match self.tools.get_executor(name) {
            None => {
                warn!(tool = %name, "model called an unknown tool");
                format!(
                    "Error: {} is not a valid tool, try one of [{}].",
                    name,
                    self.tools.names().join(", ")
                )
            }
            Some(executor) => match parse_arguments(&call.function.arguments) {
                Err(e) => {
                    warn!(tool = %name, error = %e, "tool called with malformed arguments");
                    format!("Error: invalid arguments for tool '{}': {}", name, e)
                }
                Ok(arguments) => {
                    let runtime = ToolRuntime::new(context, &call.id, messages).with_thread(thread_id);
                    let result = executor
                        .execute(&arguments, &runtime)
                        .await
                        .map_err(|e| AgentError::ToolError(format!("{}: {}", name, e)))?;
                    result.to_content()
                }
            },
        };

        Ok(Message::tool(call.id.clone(), name.clone(), content))
    }

    /// Validate the structured-output calls of one turn
    fn apply_structured_calls(
        &self,
        strategy: &ToolStrategy,
        calls: &[&ToolCall],
    ) -> Result<(Vec<Message>, Option<Value>)> {
        let outcome = if calls.len() > 1 {
            let names: Vec<&str> = calls.iter().map(|c| c.function.name.as_str()).collect();
            Err(format!(
                "Model incorrectly returned multiple structured responses ({}) when only one is expected.",
                names.join(", ")
            ))
        } else {
            strategy.parse(&calls[0].function.arguments)
        };

        match outcome {
            Ok(value) => {
                let call = calls[0];
                let message = Message::tool(
                    call.id.clone(),
                    call.function.name.clone(),
                    strategy.success_message(&value),
                );
                Ok((vec![message], Some(value)))
            }
            Err(error) if strategy.handle_errors => {
                warn!(error = %error, "structured output rejected, asking the model to retry");
                let messages = calls
                    .iter()
                    .map(|call| {
                        Message::tool(
                            call.id.clone(),
                            call.function.name.clone(),
                            format!("Error: {}\n Please fix your mistakes.", error),
                        )
                    })
                    .collect();
                Ok((messages, None))
            }
            Err(error) => Err(AgentError::StructuredOutputError(error)),
        }
    }

    async fn save_checkpoint(
        &self,
        thread_id: Option<&str>,
        parent: &mut Option<Checkpoint>,
        state: &AgentState,
    ) -> Result<()> {
        let (Some(checkpointer), Some(thread)) = (&self.checkpointer, thread_id) else {
            return Ok(());
        };

        let checkpoint = Checkpoint::next(thread, parent.as_ref(), state);
        checkpointer.put(checkpoint.clone()).await?;
        *parent = Some(checkpoint);
        Ok(())
    }
}

fn parse_arguments(arguments: &str) -> std::result::Result<Value, serde_json::Error> {
    if arguments.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(arguments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_input_conversions() {
        let input: AgentInput = "hello".into();
        assert_eq!(input.into_messages(), vec![Message::user("hello")]);

        let input: AgentInput = vec![Message::system("s"), Message::user("u")].into();
        assert_eq!(input.into_messages().len(), 2);
    }

    #[test]
    fn test_state_accessors() {
        let state = AgentState {
            messages: vec![
                Message::user("hi"),
                Message::assistant("Hello there"),
                Message::tool("call_1", "lookup", "done"),
            ],
            structured_response: Some(json!({"punny_response": "ok"})),
        };

        assert_eq!(state.last_text().as_deref(), Some("Hello there"));
        assert_eq!(state.last_message().map(|m| m.role), Some(Role::Tool));

        let value: Value = state.structured().unwrap();
        assert_eq!(value["punny_response"], "ok");

        let empty = AgentState::default();
        assert!(matches!(
            empty.structured::<Value>(),
            Err(AgentError::StructuredOutputError(_))
        ));
    }

    #[test]
    fn test_parse_arguments_accepts_empty() {
        assert_eq!(parse_arguments("").unwrap(), json!({}));
        assert_eq!(parse_arguments(r#"{"city":"SF"}"#).unwrap(), json!({"city": "SF"}));
        assert!(parse_arguments("{").is_err());
    }

    #[test]
    fn test_run_config() {
        let run = RunConfig::for_thread("1").max_iterations(3);
        assert_eq!(run.thread_id.as_deref(), Some("1"));
        assert_eq!(run.max_iterations, Some(3));
        assert_eq!(AgentConfig::default().max_iterations, 25);
    }
}
