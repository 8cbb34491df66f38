//! Conversation API webhook client.
//!
//! Authenticates with OAuth2 client credentials (project key id/secret) and
//! manages webhooks under `/v1/projects/{project_id}/webhooks`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use super::{SubscriptionHandle, SubscriptionProvider, TriggerKind};
use crate::config::{PlatformCredentials, WebhookSettings};
use crate::utilities::errors::SubscriptionError;

pub const DEFAULT_AUTH_URL: &str = "https://auth.sinch.com/oauth2/token";

/// Refresh the token this long before it expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Base URL of the Conversation API in `region`.
pub fn regional_api_url(region: &str) -> String {
    format!("https://{}.conversation.api.sinch.com", region)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct WebhookResponse {
    id: Option<String>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Webhook registration against the Conversation API.
pub struct ConversationWebhooks {
    client: reqwest::Client,
    credentials: Option<PlatformCredentials>,
    app_id: Option<String>,
    auth_url: String,
    api_base_url: String,
    token: Mutex<Option<CachedToken>>,
}

impl ConversationWebhooks {
    pub fn new(
        credentials: Option<PlatformCredentials>,
        app_id: Option<String>,
        region: &str,
        timeout: Duration,
    ) -> Result<Self, SubscriptionError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            credentials,
            app_id,
            auth_url: DEFAULT_AUTH_URL.to_string(),
            api_base_url: regional_api_url(region),
            token: Mutex::new(None),
        })
    }

    pub fn from_settings(settings: &WebhookSettings) -> Result<Self, SubscriptionError> {
        Self::new(
            settings.credentials.clone(),
            settings.app_id.clone(),
            &settings.region,
            settings.subscription_timeout,
        )
    }

    /// Point the client at other token and API endpoints.
    pub fn with_endpoints(
        mut self,
        auth_url: impl Into<String>,
        api_base_url: impl Into<String>,
    ) -> Self {
        self.auth_url = auth_url.into();
        self.api_base_url = api_base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn credentials(&self) -> Result<&PlatformCredentials, SubscriptionError> {
        self.credentials.as_ref().ok_or_else(|| {
            SubscriptionError::Unavailable("registration credentials are not configured".to_string())
        })
    }

    fn webhooks_url(&self, credentials: &PlatformCredentials) -> String {
        format!(
            "{}/v1/projects/{}/webhooks",
            self.api_base_url, credentials.project_id
        )
    }

    async fn access_token(&self, credentials: &PlatformCredentials) -> Result<String, SubscriptionError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .client
            .post(&self.auth_url)
            .basic_auth(&credentials.key_id, Some(&credentials.key_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SubscriptionError::Auth(format!("{}: {}", status, body)));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SubscriptionError::Auth(format!("unreadable token response: {}", e)))?;

        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3600));
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN),
        });
        Ok(token.access_token)
    }
}

#[async_trait]
impl SubscriptionProvider for ConversationWebhooks {
    async fn create(
        &self,
        public_url: &str,
        triggers: &[TriggerKind],
    ) -> Result<SubscriptionHandle, SubscriptionError> {
        let credentials = self.credentials()?;
        let app_id = self.app_id.as_deref().ok_or_else(|| {
            SubscriptionError::Unavailable("no Conversation app id is configured".to_string())
        })?;
        let token = self.access_token(credentials).await?;

        let response = self
            .client
            .post(self.webhooks_url(credentials))
            .bearer_auth(token)
            .json(&json!({
                "app_id": app_id,
                "target": public_url,
                "target_type": "HTTP",
                "triggers": triggers,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SubscriptionError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let webhook: WebhookResponse = response.json().await?;
        let subscription_id = webhook.id.filter(|id| !id.is_empty()).ok_or_else(|| {
            SubscriptionError::Unavailable("platform response carried no webhook id".to_string())
        })?;

        log::info!("Webhook {} created for {}", subscription_id, public_url);
        Ok(SubscriptionHandle { subscription_id })
    }

    async fn delete(&self, handle: &SubscriptionHandle) -> Result<(), SubscriptionError> {
        let credentials = self.credentials()?;
        let token = self.access_token(credentials).await?;

        let response = self
            .client
            .delete(format!(
                "{}/{}",
                self.webhooks_url(credentials),
                handle.subscription_id
            ))
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                log::info!("Webhook {} deleted", handle.subscription_id);
                Ok(())
            }
            status if status == StatusCode::NOT_FOUND => {
                log::info!("Webhook {} was already gone", handle.subscription_id);
                Ok(())
            }
            status => Err(SubscriptionError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }
}
