/// Fixed configuration of the agent. Callers cannot change it per call.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    pub model: String,
    pub temperature: f32,
    pub system_prompt: Option<String>,
    /// Upper bound on model calls per invocation.
    pub max_iterations: usize,
    /// Expose tools from the configured MCP servers.
    pub remote_tools: bool,
    /// Number of most recent messages sent to the model. `None` sends all.
    pub history_window: Option<usize>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            temperature: 0.7,
            system_prompt: None,
            max_iterations: 10,
            remote_tools: false,
            history_window: None,
        }
    }
}

impl AgentSettings {
    pub fn with_remote_tools(mut self, enabled: bool) -> Self {
        self.remote_tools = enabled;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_history_window(mut self, window: Option<usize>) -> Self {
        self.history_window = window;
        self
    }
}
