// Base tools functionality
mod base;
pub use base::{BoxError, FunctionTool, NoArgs, ToolExecutor, ToolRegistry, ToolResult, TypedTool};
