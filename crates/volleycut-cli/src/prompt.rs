//! Terminal input
//!
//! One stdin line reader shared by the session and the credential prompt.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tracing::warn;
use volleycut_core::credentials::CredentialPrompt;

/// Stdin lines shared by the session loop and the credential prompt
pub type SharedStdin = Arc<Mutex<Lines<BufReader<Stdin>>>>;

pub fn shared_stdin() -> SharedStdin {
    Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines()))
}

/// Reads the next line; `None` at end of input
pub async fn read_line(stdin: &SharedStdin) -> std::io::Result<Option<String>> {
    stdin.lock().await.next_line().await
}

/// Asks for a credential on the terminal
pub struct StdinPrompt {
    stdin: SharedStdin,
}

impl StdinPrompt {
    pub fn new(stdin: SharedStdin) -> Self {
        Self { stdin }
    }
}

#[async_trait]
impl CredentialPrompt for StdinPrompt {
    async fn prompt(&self, message: &str) -> Option<String> {
        eprint!("{}: ", message);
        let _ = std::io::stderr().flush();

        match read_line(&self.stdin).await {
            Ok(Some(line)) => Some(line.trim().to_string()).filter(|k| !k.is_empty()),
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read credential: {}", e);
                None
            }
        }
    }
}
