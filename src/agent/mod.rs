pub mod agent;
pub mod builder;
pub mod checkpoint;
pub mod context;
pub mod structured;
pub mod tools;

pub use agent::{AgentConfig, AgentError, AgentInput, AgentState, Agent, RunConfig};
pub use builder::AgentBuilder;
pub use checkpoint::{Checkpoint, Checkpointer, InMemorySaver, SqliteSaver};
pub use context::ToolRuntime;
pub use structured::{
    validate_against_schema, ProviderStrategy, ResponseFormatStrategy, StructuredProvider,
    ToolStrategy, TypedAgent,
};
pub use tools::{BoxError, FunctionTool, NoArgs, ToolExecutor, ToolRegistry, ToolResult, TypedTool};
