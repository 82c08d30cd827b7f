use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

/// Failure obtaining a bot-mitigation token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MitigationError {
    #[error("bot mitigation provider was not ready after {waited_ms} ms")]
    Unavailable { waited_ms: u64 },
    #[error("bot mitigation provider rejected the request: {0}")]
    Rejected(String),
}

/// Proof-of-humanity token source (reCAPTCHA-style `ready` / `execute`).
#[async_trait]
pub trait MitigationProvider: Send + Sync {
    /// Resolves once the provider can issue tokens. May never resolve.
    async fn ready(&self);

    async fn execute(&self, site_key: &str, action: &str) -> Result<String, MitigationError>;
}

/// Fetch a fresh single-use token, waiting at most `wait` for the provider.
pub async fn request_mitigation_token(
    provider: &dyn MitigationProvider,
    site_key: &str,
    action: &str,
    wait: Duration,
) -> Result<String, MitigationError> {
    if tokio::time::timeout(wait, provider.ready()).await.is_err() {
        return Err(MitigationError::Unavailable {
            waited_ms: u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
        });
    }

    let token = provider.execute(site_key, action).await?;
    if token.trim().is_empty() {
        return Err(MitigationError::Rejected(
            "provider returned an empty token".to_string(),
        ));
    }

    debug!(action, "bot mitigation token issued");
    Ok(token)
}

/// Provider backed by a token the browser obtained for this one request.
///
/// The token is handed out at most once; a second `execute` is rejected.
#[derive(Debug, Default)]
pub struct ClientTokenProvider {
    token: Mutex<Option<String>>,
}

impl ClientTokenProvider {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: Mutex::new(token.filter(|value| !value.trim().is_empty())),
        }
    }
}

#[async_trait]
impl MitigationProvider for ClientTokenProvider {
    async fn ready(&self) {}

    async fn execute(&self, _site_key: &str, _action: &str) -> Result<String, MitigationError> {
        self.token
            .lock()
            .expect("token mutex poisoned")
            .take()
            .ok_or_else(|| {
                MitigationError::Rejected(
                    "no verification token accompanied the submission".to_string(),
                )
            })
    }
}
