mod errors;
mod facade;
mod runtime;
mod settings;
mod tools;


pub use errors::{AgentError, ToolError};
pub use facade::Agent;
pub use runtime::{AgentRuntime, ToolCallingRuntime};
pub use settings::AgentSettings;
pub use tools::{
    RemoteTool, RemoteTools, Tool, ToolSet, ToolSetResult, WeatherTool, assemble_tool_set,
    remote_tool_name,
};
