use crate::application::agent::Agent;
use std::io::Write;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("stdin/stdout I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads prompts line by line from stdin and prints the agent's replies.
/// Agent failures are printed and the loop continues.
pub async fn run(agent: Arc<Agent>, stream: bool) -> Result<(), ChatError> {
    let mut lines = BufReader::new(io::stdin()).lines();
    prompt()?;

    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            prompt()?;
            continue;
        }
        if matches!(input, "exit" | "quit") {
            break;
        }
        debug!("Received chat line");

        let result = if stream {
            let printer = Arc::new(Mutex::new(StreamPrinter::default()));
            let sink = Arc::clone(&printer);
            agent
                .run_agent_stream(input, move |text| {
                    let mut printer = sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    printer.print(text);
                })
                .await
                .map(|_| ())
        } else {
            agent.run_agent(input).await.map(|reply| println!("{reply}"))
        };

        match result {
            Ok(()) => {
                if stream {
                    println!();
                }
            }
            Err(err) => {
                error!(%err, "Agent request failed");
                eprintln!("error: {err}");
            }
        }
        prompt()?;
    }
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "> ")?;
    stdout.flush()
}

/// Turns running-text payloads into incremental terminal output.
#[derive(Default)]
struct StreamPrinter {
    printed: String,
}

impl StreamPrinter {
    fn print(&mut self, payload: &str) {
        let mut stdout = std::io::stdout();
        let delta = match payload.strip_prefix(self.printed.as_str()) {
            Some(rest) => rest.to_string(),
            None => {
                // A new model turn started; put it on its own line.
                let _ = writeln!(stdout);
                payload.to_string()
            }
        };
        let _ = write!(stdout, "{delta}");
        let _ = stdout.flush();
        self.printed = payload.to_string();
    }
}
