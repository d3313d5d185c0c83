//! Model infrastructure
//!
//! - `types`: request, response, streaming event and error types
//! - `traits`: the `ChatModel` and `ModelFactory` seams
//! - `openai`: OpenAI-compatible chat completions client
//! - `stream`: assembly of streamed completion chunks
//! - `factory`: builds clients from the config store

mod factory;
mod openai;
mod stream;
mod traits;
mod types;

pub use factory::OpenAiModelFactory;
pub use openai::{OpenAiChatModel, OpenAiSettings};
pub use stream::StreamAssembler;
pub use traits::{ChatModel, ModelFactory};
pub use types::{ModelError, ModelEvent, ModelRequest, ModelResponse, ModelSink, ToolSpec};
