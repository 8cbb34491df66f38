//! Process configuration: the environment probe, credential groups and
//! command-line arguments.
//!
//! Every capability group reads a fixed set of environment keys. The probe is
//! a pure lookup; nothing here caches values, so a re-registration pass sees
//! the environment as it is at that moment.

pub mod args;

use std::collections::HashMap;
use std::time::Duration;

pub use args::{parse_args, CliArgs, CliCommand};

// ---------------------------------------------------------------------------
// Environment keys
// ---------------------------------------------------------------------------

pub const CONVERSATION_PROJECT_ID: &str = "CONVERSATION_PROJECT_ID";
pub const CONVERSATION_KEY_ID: &str = "CONVERSATION_KEY_ID";
pub const CONVERSATION_KEY_SECRET: &str = "CONVERSATION_KEY_SECRET";
pub const CONVERSATION_APP_ID: &str = "CONVERSATION_APP_ID";
pub const CONVERSATION_REGION: &str = "CONVERSATION_REGION";
pub const VERIFICATION_APPLICATION_KEY: &str = "VERIFICATION_APPLICATION_KEY";
pub const VERIFICATION_APPLICATION_SECRET: &str = "VERIFICATION_APPLICATION_SECRET";
pub const VOICE_APPLICATION_KEY: &str = "VOICE_APPLICATION_KEY";
pub const VOICE_APPLICATION_SECRET: &str = "VOICE_APPLICATION_SECRET";
pub const MAILGUN_API_KEY: &str = "MAILGUN_API_KEY";
pub const NGROK_AUTH_TOKEN: &str = "NGROK_AUTH_TOKEN";
pub const NGROK_PATH: &str = "NGROK_PATH";
pub const TUNNEL_TIMEOUT_SECS: &str = "SINCH_MCP_TUNNEL_TIMEOUT_SECS";
pub const SUBSCRIPTION_TIMEOUT_SECS: &str = "SINCH_MCP_SUBSCRIPTION_TIMEOUT_SECS";

/// Default bound on tunnel negotiation.
pub const DEFAULT_TUNNEL_TIMEOUT_SECS: u64 = 30;
/// Default bound on one subscription request.
pub const DEFAULT_SUBSCRIPTION_TIMEOUT_SECS: u64 = 20;

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Read access to configuration values.
///
/// A key is present only when it is set to a non-empty value.
pub trait Environment: Send + Sync {
    /// Raw lookup.
    fn get(&self, key: &str) -> Option<String>;

    /// Whether `key` is set to a non-empty value.
    fn is_present(&self, key: &str) -> bool {
        self.get(key).map_or(false, |v| !v.trim().is_empty())
    }

    /// Every key of `keys` that is absent, preserving input order.
    fn missing(&self, keys: &[&str]) -> Vec<String> {
        keys.iter()
            .filter(|key| !self.is_present(**key))
            .map(|key| key.to_string())
            .collect()
    }

    /// Non-empty value of `key`.
    fn value(&self, key: &str) -> Option<String> {
        self.get(key).filter(|v| !v.trim().is_empty())
    }
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// A fixed key/value environment, used by tests and embedders.
#[derive(Debug, Clone, Default)]
pub struct MapEnvironment {
    values: HashMap<String, String>,
}

impl MapEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set a key.
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }

    /// Builder: set every key of a group to a placeholder value.
    pub fn with_group(mut self, group: ConfigGroup) -> Self {
        for key in group.keys() {
            self.values.insert(key.to_string(), format!("test-{}", key.to_lowercase()));
        }
        self
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }
}

impl Environment for MapEnvironment {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

// ---------------------------------------------------------------------------
// ConfigGroup
// ---------------------------------------------------------------------------

/// Named sets of environment keys required by a capability group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigGroup {
    /// Conversation API project credentials.
    Conversation,
    /// Verification application credentials.
    Verification,
    /// Voice application credentials.
    Voice,
    /// Mailgun API key.
    Email,
    /// Tunnel provider credential.
    Tunnel,
    /// Conversation app that receives the webhook subscription.
    WebhookTarget,
}

impl ConfigGroup {
    /// Required keys in declaration order.
    pub fn keys(&self) -> &'static [&'static str] {
        match self {
            Self::Conversation => &[
                CONVERSATION_PROJECT_ID,
                CONVERSATION_KEY_ID,
                CONVERSATION_KEY_SECRET,
            ],
            Self::Verification => &[VERIFICATION_APPLICATION_KEY, VERIFICATION_APPLICATION_SECRET],
            Self::Voice => &[VOICE_APPLICATION_KEY, VOICE_APPLICATION_SECRET],
            Self::Email => &[MAILGUN_API_KEY],
            Self::Tunnel => &[NGROK_AUTH_TOKEN],
            Self::WebhookTarget => &[CONVERSATION_APP_ID],
        }
    }

    /// Missing keys of this group in `env`.
    pub fn missing(&self, env: &dyn Environment) -> Vec<String> {
        env.missing(self.keys())
    }

    pub fn is_configured(&self, env: &dyn Environment) -> bool {
        self.missing(env).is_empty()
    }
}

// ---------------------------------------------------------------------------
// Webhook settings
// ---------------------------------------------------------------------------

/// Conversation API project credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformCredentials {
    pub project_id: String,
    pub key_id: String,
    pub key_secret: String,
}

impl PlatformCredentials {
    pub fn from_env(env: &dyn Environment) -> Option<Self> {
        Some(Self {
            project_id: env.value(CONVERSATION_PROJECT_ID)?,
            key_id: env.value(CONVERSATION_KEY_ID)?,
            key_secret: env.value(CONVERSATION_KEY_SECRET)?,
        })
    }
}

/// Everything the lifecycle coordinator needs to bring the webhook
/// subsystem up.
#[derive(Debug, Clone)]
pub struct WebhookSettings {
    /// Tunnel credential.
    pub tunnel_token: Option<String>,
    /// Remote registration credentials.
    pub credentials: Option<PlatformCredentials>,
    /// Application the subscription is attached to.
    pub app_id: Option<String>,
    /// Conversation API region (`us`, `eu`, `br`).
    pub region: String,
    /// Path to the tunnel agent binary.
    pub tunnel_cli: String,
    /// Bound on one tunnel negotiation attempt.
    pub tunnel_timeout: Duration,
    /// Bound on one subscription request.
    pub subscription_timeout: Duration,
}

impl WebhookSettings {
    pub fn from_env(env: &dyn Environment) -> Self {
        Self {
            tunnel_token: env.value(NGROK_AUTH_TOKEN),
            credentials: PlatformCredentials::from_env(env),
            app_id: env.value(CONVERSATION_APP_ID),
            region: env
                .value(CONVERSATION_REGION)
                .map(|r| r.trim().to_lowercase())
                .unwrap_or_else(|| "us".to_string()),
            tunnel_cli: env.value(NGROK_PATH).unwrap_or_else(|| "ngrok".to_string()),
            tunnel_timeout: Duration::from_secs(parse_secs(
                env.value(TUNNEL_TIMEOUT_SECS),
                DEFAULT_TUNNEL_TIMEOUT_SECS,
            )),
            subscription_timeout: Duration::from_secs(parse_secs(
                env.value(SUBSCRIPTION_TIMEOUT_SECS),
                DEFAULT_SUBSCRIPTION_TIMEOUT_SECS,
            )),
        }
    }

    /// Whether tunnel credential, registration credentials and application
    /// id are all present.
    pub fn is_complete(&self) -> bool {
        self.tunnel_token.is_some() && self.credentials.is_some() && self.app_id.is_some()
    }

    /// Human-readable list of what is missing, for the operator log.
    pub fn missing_parts(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.tunnel_token.is_none() {
            missing.push(NGROK_AUTH_TOKEN);
        }
        if self.credentials.is_none() {
            missing.push("CONVERSATION_PROJECT_ID/KEY_ID/KEY_SECRET");
        }
        if self.app_id.is_none() {
            missing.push(CONVERSATION_APP_ID);
        }
        missing
    }
}

fn parse_secs(raw: Option<String>, default: u64) -> u64 {
    match raw.map(|v| v.trim().parse::<u64>()) {
        Some(Ok(secs)) if secs > 0 => secs,
        Some(_) => {
            log::warn!("Ignoring invalid timeout value, using {}s", default);
            default
        }
        None => default,
    }
}
