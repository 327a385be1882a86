use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;

use super::{Agent, AgentError, AgentInput, AgentState, RunConfig};
use crate::{JsonSchema, ResponseFormat, Tool, ToolFunction, ToolType};

/// Trait for types that can provide a JSON schema
pub trait StructuredProvider {
    /// Get the JSON schema for this type
    fn schema() -> JsonSchema;
}

/// Structured output through an extra tool the model must call with the answer
#[derive(Debug, Clone)]
pub struct ToolStrategy {
    pub schema: JsonSchema,
    /// Content of the tool message acknowledging the structured call
    pub tool_message_content: Option<String>,
    /// Feed validation errors back to the model instead of failing the run
    pub handle_errors: bool,
}

impl ToolStrategy {
    pub fn new(schema: JsonSchema) -> Self {
        Self {
            schema,
            tool_message_content: None,
            handle_errors: true,
        }
    }

    pub fn of<T: StructuredProvider>() -> Self {
        Self::new(T::schema())
    }

    pub fn tool_message_content(mut self, content: impl Into<String>) -> Self {
        self.tool_message_content = Some(content.into());
        self
    }

    pub fn handle_errors(mut self, handle_errors: bool) -> Self {
        self.handle_errors = handle_errors;
        self
    }

    pub fn tool_name(&self) -> &str {
        &self.schema.name
    }

    /// The tool definition offered to the model
    pub fn tool(&self) -> Tool {
        Tool {
            r#type: ToolType::Function,
            function: ToolFunction {
                name: self.schema.name.clone(),
                description: Some(
                    self.schema
                        .description
                        .clone()
                        .unwrap_or_else(|| format!("Respond with a {} object", self.schema.name)),
                ),
                parameters: self.schema.schema.clone(),
            },
        }
    }

    /// Parse and validate the arguments of a structured-output tool call
    pub fn parse(&self, arguments: &str) -> Result<Value, String> {
        let value: Value = if arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(arguments).map_err(|e| {
                format!(
                    "Failed to parse structured output for tool '{}': {}",
                    self.schema.name, e
                )
            })?
        };

        validate_against_schema(&value, &self.schema.schema).map_err(|e| {
            format!(
                "Failed to parse structured output for tool '{}': {}",
                self.schema.name, e
            )
        })?;

        Ok(value)
    }

    pub(crate) fn success_message(&self, value: &Value) -> String {
        match &self.tool_message_content {
            Some(content) => content.clone(),
            None => format!("Returning structured response: {}", value),
        }
    }
}

/// Structured output through the provider's native JSON schema mode
#[derive(Debug, Clone)]
pub struct ProviderStrategy {
    pub schema: JsonSchema,
}

impl ProviderStrategy {
    pub fn new(schema: JsonSchema) -> Self {
        Self { schema }
    }

    pub fn of<T: StructuredProvider>() -> Self {
        Self::new(T::schema())
    }

    pub fn response_format(&self) -> ResponseFormat {
        ResponseFormat::json_schema(self.schema.clone())
    }

    /// Parse the model's final text, tolerating a fenced code block
    pub fn parse(&self, text: &str) -> Result<Value, String> {
        let body = strip_code_fence(text);
        let value: Value = serde_json::from_str(body)
            .map_err(|e| format!("Native structured output is not valid JSON: {}", e))?;
        validate_against_schema(&value, &self.schema.schema)?;
        Ok(value)
    }
}

/// How an agent coerces its final answer into a schema
#[derive(Debug, Clone)]
pub enum ResponseFormatStrategy {
    Tool(ToolStrategy),
    Provider(ProviderStrategy),
}

impl ResponseFormatStrategy {
    pub fn schema(&self) -> &JsonSchema {
        match self {
            ResponseFormatStrategy::Tool(strategy) => &strategy.schema,
            ResponseFormatStrategy::Provider(strategy) => &strategy.schema,
        }
    }
}

impl From<ToolStrategy> for ResponseFormatStrategy {
    fn from(strategy: ToolStrategy) -> Self {
        ResponseFormatStrategy::Tool(strategy)
    }
}

impl From<ProviderStrategy> for ResponseFormatStrategy {
    fn from(strategy: ProviderStrategy) -> Self {
        ResponseFormatStrategy::Provider(strategy)
    }
}

impl From<JsonSchema> for ResponseFormatStrategy {
    fn from(schema: JsonSchema) -> Self {
        ResponseFormatStrategy::Tool(ToolStrategy::new(schema))
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Check a value against the subset of JSON schema produced by `#[derive(Structured)]`
///
/// Errors name the offending path so the model can correct itself.
pub fn validate_against_schema(value: &Value, schema: &Value) -> Result<(), String> {
    validate_at("$", value, schema)
}

fn validate_at(path: &str, value: &Value, schema: &Value) -> Result<(), String> {
    if let Some(expected) = schema.get("type") {
        let allowed: Vec<&str> = match expected {
            Value::String(t) => vec![t.as_str()],
            Value::Array(types) => types.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| matches_type(value, t)) {
            return Err(format!(
                "{} should be of type {}, got {}",
                path,
                allowed.join(" or "),
                type_name(value)
            ));
        }
    }

    if let Some(Value::Array(options)) = schema.get("enum") {
        if !options.contains(value) {
            return Err(format!("{} must be one of {}", path, Value::Array(options.clone())));
        }
    }

    match value {
        Value::Object(map) => {
            let required = schema
                .get("required")
                .and_then(Value::as_array)
                .map(|keys| keys.iter().filter_map(Value::as_str).collect::<Vec<_>>())
                .unwrap_or_default();

            for key in &required {
                match map.get(*key) {
                    None => return Err(format!("{} is missing required field '{}'", path, key)),
                    Some(Value::Null) => {
                        return Err(format!("{}.{} is required and cannot be null", path, key))
                    }
                    Some(_) => {}
                }
            }

            if let Some(Value::Object(properties)) = schema.get("properties") {
                for (key, field) in map {
                    let Some(property) = properties.get(key) else {
                        continue;
                    };
                    // Optional fields may be null even when the schema names a single type
                    if field.is_null() && !required.contains(&key.as_str()) {
                        continue;
                    }
                    validate_at(&format!("{}.{}", path, key), field, property)?;
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for (index, item) in items.iter().enumerate() {
                    validate_at(&format!("{}[{}]", path, index), item, item_schema)?;
                }
            }
        }
        _ => {}
    }

    Ok(())
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// An agent whose runs end in a value of type `T`
pub struct TypedAgent<T, C = ()> {
    agent: Agent<C>,
    _phantom: PhantomData<fn() -> T>,
}

impl<T, C> TypedAgent<T, C>
where
    T: DeserializeOwned + StructuredProvider,
    C: Send + Sync + 'static,
{
    pub(crate) fn new(agent: Agent<C>) -> Self {
        Self {
            agent,
            _phantom: PhantomData,
        }
    }

    /// Run the agent and return its structured response
    pub async fn invoke(
        &self,
        input: impl Into<AgentInput>,
        run: &RunConfig,
        context: &C,
    ) -> Result<T, AgentError> {
        let state = self.agent.invoke(input, run, context).await?;
        state.structured()
    }

    /// Run the agent and return both the full state and the structured response
    pub async fn invoke_with_state(
        &self,
        input: impl Into<AgentInput>,
        run: &RunConfig,
        context: &C,
    ) -> Result<(T, AgentState), AgentError> {
        let state = self.agent.invoke(input, run, context).await?;
        let response = state.structured()?;
        Ok((response, state))
    }

    /// Get the underlying agent for advanced operations
    pub fn inner(&self) -> &Agent<C> {
        &self.agent
    }
}
