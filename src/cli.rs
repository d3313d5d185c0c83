use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "desk-agent",
    version,
    about = "Chat with an LLM agent that can call a weather tool and MCP server tools"
)]
pub struct Cli {
    /// Prefer ./dev.appconfig.json over the platform config file
    #[arg(long, global = true)]
    pub dev: bool,
    /// Silence console logging
    #[arg(long, short, global = true)]
    pub quiet: bool,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Interactive chat on stdin/stdout (default)
    Chat {
        /// Offer tools from the configured MCP servers to the agent
        #[arg(long)]
        remote_tools: bool,
        /// Wait for the full reply instead of streaming tokens
        #[arg(long)]
        no_stream: bool,
    },
    /// Connect to every configured MCP server and list its tools
    Discover,
}

impl Default for Command {
    fn default() -> Self {
        Command::Chat {
            remote_tools: false,
            no_stream: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_is_the_default_command() {
        let cli = Cli::parse_from(["desk-agent"]);
        assert_eq!(cli.command.unwrap_or_default(), Command::default());
        assert!(!cli.dev);
    }

    #[test]
    fn parses_chat_flags_and_global_options() {
        let cli = Cli::parse_from(["desk-agent", "chat", "--remote-tools", "--no-stream", "--dev", "-q"]);
        assert!(cli.dev);
        assert!(cli.quiet);
        assert_eq!(
            cli.command,
            Some(Command::Chat {
                remote_tools: true,
                no_stream: true
            })
        );
    }

    #[test]
    fn parses_discover() {
        let cli = Cli::parse_from(["desk-agent", "--dev", "discover"]);
        assert_eq!(cli.command, Some(Command::Discover));
        assert!(cli.dev);
    }
}
