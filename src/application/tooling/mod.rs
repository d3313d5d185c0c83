mod client;
mod discovery;
mod error;
mod host;
mod interface;
mod process;

pub use client::McpServerClient;
pub use discovery::{ServerDiscovery, discover_tools};
pub use error::BridgeError;
pub use host::McpHost;
pub use interface::{CommandDispatch, HostReply, HostRequest, ToolDescriptor, ToolOutcome};
pub use process::McpProcess;
