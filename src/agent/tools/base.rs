use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::agent::{StructuredProvider, ToolRuntime};
use crate::{Structured, Tool, ToolFunction, ToolType};

/// Error type returned by tool implementations
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a tool execution
#[derive(Debug, Clone)]
pub enum ToolResult {
    Success(Value),
    /// A failure the model should see and may recover from
    Error(String),
}

impl ToolResult {
    /// Text sent back to the model. Strings are sent verbatim, other values as JSON.
    pub fn to_content(&self) -> String {
        match self {
            ToolResult::Success(Value::String(s)) => s.clone(),
            ToolResult::Success(value) => value.to_string(),
            ToolResult::Error(error) => format!("Error: {}", error),
        }
    }
}

/// Trait for implementing tool executors
///
/// `C` is the runtime context type supplied with each agent invocation.
#[async_trait]
pub trait ToolExecutor<C: Send + Sync = ()>: Send + Sync {
    /// Execute the tool with the given arguments
    async fn execute(&self, arguments: &Value, runtime: &ToolRuntime<'_, C>) -> Result<ToolResult, BoxError>;

    /// Get the tool definition
    fn definition(&self) -> ToolFunction;
}

/// Registry for managing tools, kept in registration order
pub struct ToolRegistry<C = ()> {
    tools: HashMap<String, Arc<dyn ToolExecutor<C>>>,
    order: Vec<String>,
}

impl<C: Send + Sync + 'static> ToolRegistry<C> {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a tool under an explicit name, replacing any tool with that name
    pub fn register<S: Into<String>, E: ToolExecutor<C> + 'static>(&mut self, name: S, executor: E) {
        let name = name.into();
        if self.tools.insert(name.clone(), Arc::new(executor)).is_none() {
            self.order.push(name);
        }
    }

    /// Register a tool under the name from its definition
    pub fn add<E: ToolExecutor<C> + 'static>(&mut self, executor: E) {
        let name = executor.definition().name;
        self.register(name, executor);
    }

    /// Get a tool executor by name
    pub fn get_executor(&self, name: &str) -> Option<Arc<dyn ToolExecutor<C>>> {
        self.tools.get(name).cloned()
    }

    /// Convert to a vector of Tool definitions for API calls
    pub fn to_tools(&self) -> Vec<Tool> {
        self.order
            .iter()
            .filter_map(|name| {
                let executor = self.tools.get(name)?;
                let mut definition = executor.definition();
                definition.name = name.clone(); // Ensure name matches registry key

                Some(Tool {
                    r#type: ToolType::Function,
                    function: definition,
                })
            })
            .collect()
    }

    /// Get all tool names
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    /// Check if a tool exists
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Remove a tool
    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn ToolExecutor<C>>> {
        self.order.retain(|n| n != name);
        self.tools.remove(name)
    }

    /// Get the number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl<C: Send + Sync + 'static> Default for ToolRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Arguments for tools that take none
#[derive(Debug, Clone, Default, Serialize, Deserialize, Structured)]
pub struct NoArgs {}

/// A tool backed by a closure over raw JSON arguments
pub struct FunctionTool<C, F> {
    name: String,
    description: String,
    parameters: Value,
    func: F,
    _context: PhantomData<fn(&C)>,
}

impl<C, F> FunctionTool<C, F>
where
    C: Send + Sync,
    F: Fn(Value, &ToolRuntime<'_, C>) -> Result<Value, BoxError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value, func: F) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            func,
            _context: PhantomData,
        }
    }
}

#[async_trait]
impl<C, F> ToolExecutor<C> for FunctionTool<C, F>
where
    C: Send + Sync,
    F: Fn(Value, &ToolRuntime<'_, C>) -> Result<Value, BoxError> + Send + Sync,
{
    async fn execute(&self, arguments: &Value, runtime: &ToolRuntime<'_, C>) -> Result<ToolResult, BoxError> {
        match (self.func)(arguments.clone(), runtime) {
            Ok(result) => Ok(ToolResult::Success(result)),
            Err(e) => Ok(ToolResult::Error(e.to_string())),
        }
    }

    fn definition(&self) -> ToolFunction {
        ToolFunction {
            name: self.name.clone(),
            description: Some(self.description.clone()),
            parameters: self.parameters.clone(),
        }
    }
}

/// A tool backed by a closure over typed arguments
///
/// The parameter schema comes from `A`'s [`StructuredProvider`] implementation,
/// usually generated with `#[derive(Structured)]`.
pub struct TypedTool<A, C, R, F> {
    name: String,
    description: String,
    func: F,
    _marker: PhantomData<fn(A, &C) -> R>,
}

impl<A, C, R, F> TypedTool<A, C, R, F>
where
    A: DeserializeOwned + StructuredProvider,
    C: Send + Sync,
    R: Serialize,
    F: Fn(A, &ToolRuntime<'_, C>) -> Result<R, BoxError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, description: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            func,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<A, C, R, F> ToolExecutor<C> for TypedTool<A, C, R, F>
where
    A: DeserializeOwned + StructuredProvider,
    C: Send + Sync,
    R: Serialize,
    F: Fn(A, &ToolRuntime<'_, C>) -> Result<R, BoxError> + Send + Sync,
{
    async fn execute(&self, arguments: &Value, runtime: &ToolRuntime<'_, C>) -> Result<ToolResult, BoxError> {
        let args: A = match serde_json::from_value(arguments.clone()) {
            Ok(args) => args,
            Err(e) => {
                return Ok(ToolResult::Error(format!(
                    "Invalid arguments for tool '{}': {}",
                    self.name, e
                )))
            }
        };

        match (self.func)(args, runtime) {
            Ok(result) => Ok(ToolResult::Success(serde_json::to_value(result)?)),
            Err(e) => Ok(ToolResult::Error(e.to_string())),
        }
    }

    fn definition(&self) -> ToolFunction {
        ToolFunction {
            name: self.name.clone(),
            description: Some(self.description.clone()),
            parameters: A::schema().schema,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, Structured)]
    struct AddArgs {
        a: f64,
        b: f64,
    }

    fn runtime<'a>(context: &'a (), messages: &'a [crate::Message]) -> ToolRuntime<'a, ()> {
        ToolRuntime {
            context,
            tool_call_id: "call_1",
            thread_id: None,
            messages,
        }
    }

    #[tokio::test]
    async fn test_typed_tool_executes() {
        let add = TypedTool::new("add", "Add two numbers", |args: AddArgs, _rt: &ToolRuntime<'_, ()>| {
            Ok(args.a + args.b)
        });

        let result = add.execute(&json!({"a": 5, "b": 3}), &runtime(&(), &[])).await.unwrap();
        match result {
            ToolResult::Success(val) => assert_eq!(val, 8.0),
            ToolResult::Error(e) => panic!("Unexpected error: {}", e),
        }

        let definition = add.definition();
        assert_eq!(definition.parameters["required"], json!(["a", "b"]));
        assert_eq!(definition.parameters["properties"]["a"]["type"], "number");
    }

    #[tokio::test]
    async fn test_typed_tool_reports_bad_arguments() {
        let add = TypedTool::new("add", "Add two numbers", |args: AddArgs, _rt: &ToolRuntime<'_, ()>| {
            Ok(args.a + args.b)
        });

        let result = add.execute(&json!({"a": "five"}), &runtime(&(), &[])).await.unwrap();
        match result {
            ToolResult::Error(e) => assert!(e.contains("Invalid arguments for tool 'add'")),
            ToolResult::Success(_) => panic!("Expected an argument error"),
        }
    }

    #[tokio::test]
    async fn test_function_tool_error_is_reported() {
        let failing = FunctionTool::new("fail", "Always fails", json!({"type": "object"}), |_args, _rt: &ToolRuntime<'_, ()>| {
            Err("boom".into())
        });

        let result = failing.execute(&json!({}), &runtime(&(), &[])).await.unwrap();
        assert_eq!(result.to_content(), "Error: boom");
    }

    #[test]
    fn test_tool_registry_keeps_order() {
        let mut registry: ToolRegistry = ToolRegistry::new();
        registry.add(FunctionTool::new("zeta", "z", json!({}), |_args, _rt: &ToolRuntime<'_, ()>| Ok(Value::Null)));
        registry.add(FunctionTool::new("alpha", "a", json!({}), |_args, _rt: &ToolRuntime<'_, ()>| Ok(Value::Null)));

        assert!(registry.contains("alpha"));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["zeta", "alpha"]);

        let tools = registry.to_tools();
        assert_eq!(tools[0].function.name, "zeta");

        registry.remove("zeta");
        assert_eq!(registry.names(), vec!["alpha"]);
    }

    #[test]
    fn test_string_results_are_sent_verbatim() {
        let result = ToolResult::Success(json!("It's always sunny in SF!"));
        assert_eq!(result.to_content(), "It's always sunny in SF!");

        let result = ToolResult::Success(json!({"temp": 21}));
        assert_eq!(result.to_content(), r#"{"temp":21}"#);
    }
}
