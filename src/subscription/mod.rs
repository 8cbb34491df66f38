//! Subscription Manager: registers the tunnel URL as a webhook target on the
//! platform and removes it again at shutdown.

pub mod conversation;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::utilities::errors::SubscriptionError;

pub use conversation::ConversationWebhooks;

/// A registered webhook on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    pub subscription_id: String,
}

/// Events the platform pushes to a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerKind {
    MessageDelivery,
    MessageSubmit,
}

/// Triggers whose payloads the receiver stores.
pub const DEFAULT_TRIGGERS: &[TriggerKind] =
    &[TriggerKind::MessageDelivery, TriggerKind::MessageSubmit];

#[async_trait]
pub trait SubscriptionProvider: Send + Sync {
    /// Register `public_url` for `triggers`.
    ///
    /// Fails with [`SubscriptionError::Unavailable`] when registration
    /// credentials or the application id are absent.
    async fn create(
        &self,
        public_url: &str,
        triggers: &[TriggerKind],
    ) -> Result<SubscriptionHandle, SubscriptionError>;

    /// Remove the subscription. Callers log failures and carry on.
    async fn delete(&self, handle: &SubscriptionHandle) -> Result<(), SubscriptionError>;
}
