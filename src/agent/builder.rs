use serde::de::DeserializeOwned;
use std::sync::Arc;

use super::agent::{AgentConfig, Result};
use super::{
    Agent, AgentError, Checkpointer, ResponseFormatStrategy, StructuredProvider, ToolExecutor,
    ToolRegistry, ToolStrategy, TypedAgent,
};
use crate::ChatModel;

/// Builder for creating an Agent with a fluent API
pub struct AgentBuilder<C = ()> {
    model: Option<ChatModel>,
    system_prompt: Option<String>,
    tools: ToolRegistry<C>,
    response_format: Option<ResponseFormatStrategy>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    config: AgentConfig,
}

impl<C: Send + Sync + 'static> AgentBuilder<C> {
    /// Create a new agent builder
    pub fn new() -> Self {
        Self {
            model: None,
            system_prompt: None,
            tools: ToolRegistry::new(),
            response_format: None,
            checkpointer: None,
            config: AgentConfig::default(),
        }
    }

    /// Set the chat model
    pub fn model(mut self, model: ChatModel) -> Self {
        self.model = Some(model);
        self
    }

    /// Set the system prompt
    pub fn system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Add a single tool under the name from its definition
    pub fn tool<E: ToolExecutor<C> + 'static>(mut self, executor: E) -> Self {
        self.tools.add(executor);
        self
    }

    /// Add a single tool under an explicit name
    pub fn tool_named<S, E>(mut self, name: S, executor: E) -> Self
    where
        S: Into<String>,
        E: ToolExecutor<C> + 'static,
    {
        self.tools.register(name, executor);
        self
    }

    /// Replace the tools with a prepared registry
    pub fn tools(mut self, tools: ToolRegistry<C>) -> Self {
        self.tools = tools;
        self
    }

    /// Coerce the final answer into a schema
    pub fn response_format(mut self, format: impl Into<ResponseFormatStrategy>) -> Self {
        self.response_format = Some(format.into());
        self
    }

    /// Persist conversation state per thread
    pub fn checkpointer<S: Checkpointer + 'static>(mut self, checkpointer: S) -> Self {
        self.checkpointer = Some(Arc::new(checkpointer));
        self
    }

    /// Persist conversation state per thread (Arc version)
    pub fn checkpointer_arc(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    /// Set the maximum number of model calls per invocation
    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Build the agent
    pub fn build(self) -> Result<Agent<C>> {
        let model = self
            .model
            .ok_or_else(|| AgentError::ConfigError("A chat model is required".to_string()))?;

        if self.config.max_iterations == 0 {
            return Err(AgentError::ConfigError(
                "max_iterations must be at least 1".to_string(),
            ));
        }

        if let Some(ResponseFormatStrategy::Tool(strategy)) = &self.response_format {
            if self.tools.contains(strategy.tool_name()) {
                return Err(AgentError::ConfigError(format!(
                    "Tool name '{}' clashes with the structured output tool",
                    strategy.tool_name()
                )));
            }
        }

        Ok(Agent::new(
            model,
            self.system_prompt,
            self.tools,
            self.response_format,
            self.checkpointer,
            self.config,
        ))
    }

    /// Build an agent whose runs return `T`
    ///
    /// Installs `ToolStrategy::of::<T>()` unless a response format was already set.
    pub fn build_typed<T>(mut self) -> Result<TypedAgent<T, C>>
    where
        T: DeserializeOwned + StructuredProvider,
    {
        if self.response_format.is_none() {
            self.response_format = Some(ToolStrategy::of::<T>().into());
        }
        Ok(TypedAgent::new(self.build()?))
    }
}

impl<C: Send + Sync + 'static> Default for AgentBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}
