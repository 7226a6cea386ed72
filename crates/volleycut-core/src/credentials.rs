//! Credential Cache
//!
//! Holds the Anthropic API key for the direct labeling service in memory.
//! The key is seeded from configuration or asked from the user once, then
//! reused for the rest of the session. It is never persisted here and only
//! ever logged redacted.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::{CoreError, CoreResult};

/// Longest accepted key, in bytes
pub const MAX_KEY_LEN: usize = 1024;

/// Prompt shown when no key is available
pub const API_KEY_PROMPT: &str = "Enter your Anthropic API Key";

/// Validates the format of an Anthropic API key.
///
/// Format checks are advisory; the service rejects bad keys itself.
pub fn validate_api_key(value: &str) -> CoreResult<()> {
    if value.is_empty() {
        return Err(CoreError::InvalidCredential("API key is empty".to_string()));
    }

    if value.len() > MAX_KEY_LEN {
        return Err(CoreError::InvalidCredential(format!(
            "API key exceeds {} bytes",
            MAX_KEY_LEN
        )));
    }

    if !value.starts_with("sk-ant-") {
        warn!("Anthropic API key does not match expected format (sk-ant-*), proceeding anyway");
    }

    Ok(())
}

/// Returns a redacted preview of a credential for logging
pub fn redact(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() < 12 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

/// Asks the user for a secret
#[async_trait]
pub trait CredentialPrompt: Send + Sync {
    /// Returns `None` when the user cancels
    async fn prompt(&self, message: &str) -> Option<String>;
}

/// In-memory API key, prompted for at most once per successful entry
pub struct CredentialCache {
    key: RwLock<Option<String>>,
    prompt: Option<Arc<dyn CredentialPrompt>>,
    prompting: Mutex<()>,
}

impl CredentialCache {
    /// Creates a cache, seeded with `initial` when it is a valid key
    pub fn new(initial: Option<String>) -> Self {
        let key = initial
            .map(|k| k.trim().to_string())
            .filter(|k| match validate_api_key(k) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Ignoring configured API key: {}", e);
                    false
                }
            });

        if let Some(key) = &key {
            debug!("Credential cache seeded with {}", redact(key));
        }

        Self {
            key: RwLock::new(key),
            prompt: None,
            prompting: Mutex::new(()),
        }
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn CredentialPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub async fn get(&self) -> Option<String> {
        self.key.read().await.clone()
    }

    pub async fn set(&self, key: &str) -> CoreResult<()> {
        let key = key.trim();
        validate_api_key(key)?;
        info!("Cached API key {}", redact(key));
        *self.key.write().await = Some(key.to_string());
        Ok(())
    }

    /// Returns the cached key, prompting the user if none is cached yet
    pub async fn resolve(&self) -> CoreResult<String> {
        if let Some(key) = self.get().await {
            return Ok(key);
        }

        let prompt = self.prompt.as_ref().ok_or(CoreError::MissingCredential)?;

        // One prompt at a time; a concurrent caller may have filled the cache.
        let _guard = self.prompting.lock().await;
        if let Some(key) = self.get().await {
            return Ok(key);
        }

        let entered = prompt
            .prompt(API_KEY_PROMPT)
            .await
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(CoreError::MissingCredential)?;

        self.set(&entered).await?;
        Ok(entered)
    }
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new(None)
    }
}
