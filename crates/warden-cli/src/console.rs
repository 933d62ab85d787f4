//! Terminal-based authenticator

use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use warden_core::{AuthError, AuthMethod, Authenticator};

/// Asks the user to confirm on stdin
///
/// A single reader thread owns stdin and forwards lines over a channel, so
/// a challenge that is superseded or cancelled never holds on to the
/// terminal. `y`/`yes` verifies, anything else is a rejection and end of
/// input cancels.
#[derive(Debug)]
pub struct ConsoleAuthenticator {
    lines: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl ConsoleAuthenticator {
    /// Start reading answers from stdin
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        std::thread::spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        Self::from_lines(rx)
    }

    /// Read answers from an existing line source
    pub fn from_lines(lines: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            lines: Mutex::new(lines),
        }
    }
}

impl Default for ConsoleAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Authenticator for ConsoleAuthenticator {
    fn available_method(&self) -> AuthMethod {
        AuthMethod::None
    }

    async fn challenge(&self, reason: &str) -> Result<bool, AuthError> {
        let mut stdout = io::stdout();
        write!(stdout, "{} [y/N]: ", reason).map_err(|e| AuthError::Platform(e.to_string()))?;
        stdout
            .flush()
            .map_err(|e| AuthError::Platform(e.to_string()))?;

        let mut lines = self.lines.lock().await;

        // Input typed before this prompt answers nothing
        while lines.try_recv().is_ok() {}

        match lines.recv().await {
            Some(line) => Ok(parse_answer(&line)),
            None => Err(AuthError::Cancelled),
        }
    }
}

fn parse_answer(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
