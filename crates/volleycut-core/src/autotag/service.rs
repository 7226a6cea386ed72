//! Labeling service chain
//!
//! Services are tried in order; the first one that answers wins. A service
//! that needs a credential gets it from the shared [`CredentialCache`].

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::anthropic::AnthropicLabelService;
use super::proxy::ProxyLabelService;
use crate::credentials::CredentialCache;
use crate::labels::Label;
use crate::playback::EncodedFrame;
use crate::settings::AutoTagSettings;
use crate::{CoreError, CoreResult};

/// A vision-capable service that describes a clip from its frames
#[async_trait]
pub trait LabelService: Send + Sync {
    /// Service name, for logs
    fn name(&self) -> &str;

    /// Whether [`describe`](Self::describe) needs an API key
    fn requires_credential(&self) -> bool;

    /// Returns the service's free-text answer for the ordered frames
    async fn describe(&self, frames: &[EncodedFrame], credential: Option<&str>) -> CoreResult<String>;
}

pub struct AutoTagClient {
    services: Vec<Arc<dyn LabelService>>,
    credentials: Arc<CredentialCache>,
}

impl AutoTagClient {
    pub fn new(credentials: Arc<CredentialCache>) -> Self {
        Self {
            services: Vec::new(),
            credentials,
        }
    }

    /// Appends a service to the end of the chain
    pub fn with_service(mut self, service: Arc<dyn LabelService>) -> Self {
        self.services.push(service);
        self
    }

    /// Builds the proxy-then-direct chain from settings.
    ///
    /// `no_proxy` drops the proxy regardless of settings.
    pub fn from_settings(
        settings: &AutoTagSettings,
        credentials: Arc<CredentialCache>,
        no_proxy: bool,
    ) -> CoreResult<Self> {
        let timeout = settings.request_timeout();
        let mut client = Self::new(credentials);

        if settings.proxy_enabled && !no_proxy && !settings.proxy_url.is_empty() {
            client = client.with_service(Arc::new(ProxyLabelService::new(
                settings.proxy_url.clone(),
                timeout,
            )?));
        }

        client = client.with_service(Arc::new(AnthropicLabelService::new(
            settings.anthropic_base_url.clone(),
            timeout,
        )?));

        debug!("Auto-tag services: {:?}", client.service_names());
        Ok(client)
    }

    pub fn service_names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name()).collect()
    }

    /// Asks each service in turn, returning the first answer.
    ///
    /// Failures fall through to the next service; the last failure is returned.
    pub async fn describe(&self, frames: &[EncodedFrame]) -> CoreResult<String> {
        let mut last_error = None;

        for service in &self.services {
            match self.describe_with(service.as_ref(), frames).await {
                Ok(text) => {
                    debug!("{} answered: {:?}", service.name(), text);
                    return Ok(text);
                }
                Err(e) => {
                    warn!("Labeling service {} failed: {}", service.name(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| CoreError::NotSupported("No labeling service configured".to_string())))
    }

    async fn describe_with(
        &self,
        service: &dyn LabelService,
        frames: &[EncodedFrame],
    ) -> CoreResult<String> {
        if service.requires_credential() {
            let key = self.credentials.resolve().await?;
            service.describe(frames, Some(&key)).await
        } else {
            service.describe(frames, None).await
        }
    }

    /// Classifies the frames into one of the fixed labels
    pub async fn classify(&self, frames: &[EncodedFrame]) -> CoreResult<Label> {
        let text = self.describe(frames).await?;
        let label = Label::from_response(&text);
        info!("Classified {} frame(s) as {}", frames.len(), label);
        Ok(label)
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::ScriptedService;
    use super::*;
    use crate::credentials::CredentialPrompt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingPrompt {
        asked: AtomicUsize,
    }

    #[async_trait]
    impl CredentialPrompt for CountingPrompt {
        async fn prompt(&self, _message: &str) -> Option<String> {
            self.asked.fetch_add(1, Ordering::SeqCst);
            Some("sk-ant-from-prompt".to_string())
        }
    }

    fn frames() -> Vec<EncodedFrame> {
        vec![EncodedFrame::jpeg(vec![1]); 3]
    }

    #[tokio::test]
    async fn test_proxy_answer_skips_direct_service() {
        let proxy = ScriptedService::answering("proxy", false, "Block");
        let direct = ScriptedService::answering("anthropic", true, "Set");
        let client = AutoTagClient::new(Arc::new(CredentialCache::default()))
            .with_service(proxy.clone())
            .with_service(direct.clone());

        assert_eq!(client.classify(&frames()).await.unwrap(), Label::Block);
        assert_eq!(proxy.calls.lock().unwrap()[0], (3, None));
        assert_eq!(direct.call_count(), 0);
    }

    #[tokio::test]
    async fn test_proxy_failure_falls_back_with_prompted_key() {
        let prompt = Arc::new(CountingPrompt {
            asked: AtomicUsize::new(0),
        });
        let credentials = Arc::new(CredentialCache::new(None).with_prompt(prompt.clone()));
        let proxy = ScriptedService::failing("proxy", false);
        let direct =
            ScriptedService::answering("anthropic", true, "I think this was a great Dig by the player");
        let client = AutoTagClient::new(credentials)
            .with_service(proxy.clone())
            .with_service(direct.clone());

        assert_eq!(client.classify(&frames()).await.unwrap(), Label::Dig);
        assert_eq!(client.classify(&frames()).await.unwrap(), Label::Dig);

        assert_eq!(proxy.call_count(), 2);
        assert_eq!(
            direct.calls.lock().unwrap()[1],
            (3, Some("sk-ant-from-prompt".to_string()))
        );
        assert_eq!(prompt.asked.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_credential_surfaces_after_fallback() {
        let client = AutoTagClient::new(Arc::new(CredentialCache::default()))
            .with_service(ScriptedService::failing("proxy", false))
            .with_service(ScriptedService::answering("anthropic", true, "Serve"));

        let err = client.classify(&frames()).await.unwrap_err();
        assert!(matches!(err, CoreError::MissingCredential));
        assert_eq!(err.to_string(), "API key required");
    }

    #[tokio::test]
    async fn test_unrecognized_text_is_error_label() {
        let client = AutoTagClient::new(Arc::new(CredentialCache::default()))
            .with_service(ScriptedService::answering("proxy", false, "no idea"));
        assert_eq!(client.classify(&frames()).await.unwrap(), Label::Error);
    }

    #[tokio::test]
    async fn test_empty_chain() {
        let client = AutoTagClient::new(Arc::new(CredentialCache::default()));
        assert!(matches!(
            client.describe(&frames()).await,
            Err(CoreError::NotSupported(_))
        ));
    }

    #[test]
    fn test_from_settings_chain() {
        let credentials = Arc::new(CredentialCache::default());
        let settings = AutoTagSettings::default();

        let client = AutoTagClient::from_settings(&settings, credentials.clone(), false).unwrap();
        assert_eq!(client.service_names(), vec!["proxy", "anthropic"]);

        let client = AutoTagClient::from_settings(&settings, credentials.clone(), true).unwrap();
        assert_eq!(client.service_names(), vec!["anthropic"]);

        let disabled = AutoTagSettings {
            proxy_enabled: false,
            ..AutoTagSettings::default()
        };
        let client = AutoTagClient::from_settings(&disabled, credentials, false).unwrap();
        assert_eq!(client.service_names(), vec!["anthropic"]);
    }
}
