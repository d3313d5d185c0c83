use crate::application::tooling::BridgeError;
use crate::infrastructure::model::ModelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("agent exceeded maximum iterations ({0}) without a final answer")]
    MaxIterationsReached(usize),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool '{0}' is not available")]
    UnknownTool(String),
    #[error("invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("tool '{tool}' failed: {source}")]
    Bridge {
        tool: String,
        #[source]
        source: BridgeError,
    },
}
