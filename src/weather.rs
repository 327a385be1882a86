//! The weather demonstration: prompts, tools and the two agents built from them.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::agent::{
    Agent, AgentBuilder, AgentError, Checkpointer, NoArgs, ToolExecutor, ToolRuntime, TypedAgent,
    TypedTool,
};
use crate::{ChatModel, Structured};

pub const BASIC_SYSTEM_PROMPT: &str = "You are a helpful assistant";

pub const FORECASTER_SYSTEM_PROMPT: &str = "You are an expert weather forecaster, who speaks in puns.

You have access to two tools:

- get_weather_for_location: use this to get the weather for a specific location
- get_user_location: use this to get the user's location

If a user asks you for the weather, make sure you know the location.
If you can tell from the question that they mean wherever they are,
use the get_user_location tool to find their location.";

/// Runtime context supplied with every forecaster invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Structured)]
pub struct CityArgs {
    /// Name of the city
    pub city: String,
}

/// Response schema for the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Structured)]
pub struct WeatherReport {
    /// A punny response (always required)
    pub punny_response: String,
    /// Any interesting information about the weather if available
    #[serde(default)]
    pub weather_conditions: Option<String>,
}

impl std::fmt::Display for WeatherReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "punny_response: {}", self.punny_response)?;
        match &self.weather_conditions {
            Some(conditions) => write!(f, "\nweather_conditions: {}", conditions),
            None => write!(f, "\nweather_conditions: (none)"),
        }
    }
}

pub fn weather_for(city: &str) -> String {
    format!("It's always sunny in {}!", city)
}

pub fn location_for_user(user_id: &str) -> &'static str {
    if user_id == "1" {
        "Florida"
    } else {
        "SF"
    }
}

/// `get_weather(city)` for agents of any context type
pub fn get_weather<C: Send + Sync + 'static>() -> impl ToolExecutor<C> {
    TypedTool::new(
        "get_weather",
        "Get weather for a given city.",
        |args: CityArgs, _rt: &ToolRuntime<'_, C>| Ok(weather_for(&args.city)),
    )
}

/// `get_weather_for_location(city)` for agents of any context type
pub fn get_weather_for_location<C: Send + Sync + 'static>() -> impl ToolExecutor<C> {
    TypedTool::new(
        "get_weather_for_location",
        "Get weather for a given city.",
        |args: CityArgs, _rt: &ToolRuntime<'_, C>| Ok(weather_for(&args.city)),
    )
}

/// `get_user_location()`, answered from the caller's [`UserContext`]
pub fn get_user_location() -> impl ToolExecutor<UserContext> {
    TypedTool::new(
        "get_user_location",
        "Retrieve user information based on user ID.",
        |_args: NoArgs, rt: &ToolRuntime<'_, UserContext>| {
            Ok(location_for_user(&rt.context.user_id))
        },
    )
}

/// Tool-only agent with a plain system prompt and no memory
pub fn basic_agent(model: ChatModel) -> Result<Agent, AgentError> {
    AgentBuilder::new()
        .model(model)
        .system_prompt(BASIC_SYSTEM_PROMPT)
        .tool(get_weather())
        .build()
}

/// Pun-speaking forecaster with user context, thread memory and a [`WeatherReport`] answer
pub fn forecaster_agent(
    model: ChatModel,
    checkpointer: Arc<dyn Checkpointer>,
    max_iterations: Option<usize>,
) -> Result<TypedAgent<WeatherReport, UserContext>, AgentError> {
    let mut builder = AgentBuilder::new()
        .model(model)
        .system_prompt(FORECASTER_SYSTEM_PROMPT)
        .tool(get_user_location())
        .tool(get_weather_for_location())
        .checkpointer_arc(checkpointer);

    if let Some(max_iterations) = max_iterations {
        builder = builder.max_iterations(max_iterations);
    }

    builder.build_typed::<WeatherReport>()
}
