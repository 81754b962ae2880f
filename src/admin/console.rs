//! Line-oriented admin console.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::lifecycle::Shutdown;

/// A recognised console command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Close,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "close" => Some(ConsoleCommand::Close),
            _ => None,
        }
    }
}

/// Read commands from `input` until `close` or end of input.
///
/// `close` triggers `shutdown`. End of input stops the console without
/// touching the server, so a detached stdin never shuts the proxy down.
pub async fn run_console<R>(input: R, shutdown: Shutdown)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::debug!("Admin console input closed");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Admin console read failed");
                return;
            }
        };

        match ConsoleCommand::parse(&line) {
            Some(ConsoleCommand::Close) => {
                tracing::info!("Close requested from admin console");
                shutdown.trigger();
                return;
            }
            None if line.trim().is_empty() => {}
            None => tracing::debug!(input = %line.trim(), "Ignoring console input"),
        }
    }
}
