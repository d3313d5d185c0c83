use super::errors::AgentError;
use super::runtime::{AgentRuntime, ToolCallingRuntime};
use super::settings::AgentSettings;
use super::tools::{RemoteTools, ToolSet, ToolSetResult, assemble_tool_set};
use crate::application::conversation::Conversation;
use crate::domain::types::ChatMessage;
use crate::infrastructure::model::{ModelEvent, ModelFactory, ModelSink};
use desk_agent_log::{LogSink, Logger};
use std::sync::{Arc, Mutex};

/// Entry point used by the UI: keeps the conversation and runs one agent
/// invocation per prompt.
pub struct Agent {
    settings: AgentSettings,
    models: Arc<dyn ModelFactory>,
    runtime: Arc<dyn AgentRuntime>,
    remote: Option<Arc<RemoteTools>>,
    conversation: Conversation,
    log: Logger,
}

impl Agent {
    pub fn new(settings: AgentSettings, models: Arc<dyn ModelFactory>, sink: &LogSink) -> Self {
        let runtime = Arc::new(ToolCallingRuntime::from_settings(&settings));
        Self {
            settings,
            models,
            runtime,
            remote: None,
            conversation: Conversation::new(),
            log: sink.logger("Agent"),
        }
    }

    pub fn with_runtime(mut self, runtime: Arc<dyn AgentRuntime>) -> Self {
        self.runtime = runtime;
        self
    }

    /// Remote tools are only offered when `settings.remote_tools` is set.
    pub fn with_remote_tools(mut self, remote: Arc<RemoteTools>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.conversation.messages().await
    }

    /// Appends `input`, runs the agent over the whole history and returns the
    /// reply, which is appended as well.
    pub async fn run_agent(&self, input: &str) -> Result<String, AgentError> {
        self.run(input, None).await
    }

    /// Like [`Agent::run_agent`], but `on_token` receives the text of the
    /// current model turn each time it grows. The last payload delivered
    /// always equals the returned reply.
    pub async fn run_agent_stream<F>(&self, input: &str, on_token: F) -> Result<String, AgentError>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let relay = Arc::new(StreamRelay::new(on_token));
        let sink: ModelSink = {
            let relay = Arc::clone(&relay);
            Arc::new(move |event: ModelEvent| relay.handle(event))
        };

        let reply = self.run(input, Some(&sink)).await?;
        relay.finish(&reply);
        Ok(reply)
    }

    async fn run(&self, input: &str, sink: Option<&ModelSink>) -> Result<String, AgentError> {
        let _turn = self.conversation.begin_turn().await;
        self.conversation.add_message(ChatMessage::user(input)).await;
        self.log.info(format!("Running agent with input: {input}"));

        let model = self.models.build(&self.settings).await?;
        let tools = self.tool_set().await;
        let history = self.request_history().await;

        let produced = self
            .runtime
            .invoke(model.as_ref(), history, &tools, sink)
            .await?;
        self.log.debug(format!(
            "Agent result: {}",
            serde_json::to_string(&produced).unwrap_or_default()
        ));

        let reply = produced.last().map(ChatMessage::text).unwrap_or_default();
        self.conversation
            .add_message(ChatMessage::assistant(reply.as_str()))
            .await;
        Ok(reply)
    }

    async fn tool_set(&self) -> ToolSet {
        let remote = match (&self.remote, self.settings.remote_tools) {
            (Some(remote), true) => Some(remote.as_ref()),
            _ => None,
        };
        match assemble_tool_set(remote).await {
            ToolSetResult::Full(tools) => tools,
            ToolSetResult::Degraded { tools, reason } => {
                self.log
                    .warn(format!("Remote tools unavailable, using built-in tools only: {reason}"));
                tools
            }
        }
    }

    async fn request_history(&self) -> Vec<ChatMessage> {
        let mut history = self.conversation.messages().await;
        if let Some(window) = self.settings.history_window {
            let skip = history.len().saturating_sub(window.max(1));
            history.drain(..skip);
        }
        history
    }
}

/// Re-delivers the running text of the current model turn to the callback.
struct StreamRelay {
    on_token: Box<dyn Fn(&str) + Send + Sync>,
    state: Mutex<RelayState>,
}

#[derive(Default)]
struct RelayState {
    current: String,
    last_delivered: Option<String>,
}

impl StreamRelay {
    fn new<F>(on_token: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            on_token: Box::new(on_token),
            state: Mutex::new(RelayState::default()),
        }
    }

    fn handle(&self, event: ModelEvent) {
        let payload = {
            let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            match event {
                ModelEvent::TurnStarted => {
                    state.current.clear();
                    return;
                }
                ModelEvent::Token(token) => {
                    state.current.push_str(&token);
                    let payload = state.current.clone();
                    state.last_delivered = Some(payload.clone());
                    payload
                }
            }
        };
        (self.on_token)(&payload);
    }

    fn finish(&self, reply: &str) {
        let needs_final = {
            let state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            state.last_delivered.as_deref() != Some(reply)
        };
        if needs_final {
            (self.on_token)(reply);
        }
    }
}
