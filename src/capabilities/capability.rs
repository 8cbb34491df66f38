//! Capability descriptors, the static table of every tool the server knows.
//!
//! A descriptor says what a capability is called, which activation tags
//! select it and which environment keys it needs. Whether it is usable is
//! decided later, in one pass, by the [`CapabilityRegistry`].
//!
//! [`CapabilityRegistry`]: super::registry::CapabilityRegistry

use crate::config::{
    CONVERSATION_APP_ID, CONVERSATION_KEY_ID, CONVERSATION_KEY_SECRET, CONVERSATION_PROJECT_ID,
    MAILGUN_API_KEY, NGROK_AUTH_TOKEN, VERIFICATION_APPLICATION_KEY,
    VERIFICATION_APPLICATION_SECRET, VOICE_APPLICATION_KEY, VOICE_APPLICATION_SECRET,
};

/// Stable internal key of a capability, distinct from its public tool name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CapabilityKey {
    // Conversation
    SendTextMessage,
    SendMediaMessage,
    SendLocationMessage,
    SendChoiceMessage,
    SendTemplateMessage,
    ListConversationApps,
    ListMessagingTemplates,
    GetMessageEvents,
    // Verification
    NumberLookup,
    StartSmsVerification,
    ReportSmsVerification,
    // Voice
    TtsCallout,
    ConferenceCallout,
    ManageConferenceParticipant,
    CloseConference,
    GetCallInformation,
    // Email
    SendEmail,
    ListEmailTemplates,
    ListEmailEvents,
    RetrieveEmailInfo,
    AnalyticsMetrics,
    // Built-in
    Configuration,
}

/// Immutable description of one capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityDescriptor {
    pub key: CapabilityKey,
    /// Public tool name.
    pub name: &'static str,
    /// Description shown to the agent in `tools/list`.
    pub description: &'static str,
    /// Tags that select this capability. The wildcard `all` is implicit.
    pub activation_tags: &'static [&'static str],
    /// Environment keys that must be present, in reporting order.
    pub required_config_keys: &'static [&'static str],
}

impl CapabilityDescriptor {
    pub const fn new(
        key: CapabilityKey,
        name: &'static str,
        description: &'static str,
        activation_tags: &'static [&'static str],
        required_config_keys: &'static [&'static str],
    ) -> Self {
        Self {
            key,
            name,
            description,
            activation_tags,
            required_config_keys,
        }
    }
}

const CONVERSATION_KEYS: &[&str] = &[
    CONVERSATION_PROJECT_ID,
    CONVERSATION_KEY_ID,
    CONVERSATION_KEY_SECRET,
];

/// Message events only arrive once the webhook subsystem is live.
const MESSAGE_EVENTS_KEYS: &[&str] = &[
    CONVERSATION_PROJECT_ID,
    CONVERSATION_KEY_ID,
    CONVERSATION_KEY_SECRET,
    CONVERSATION_APP_ID,
    NGROK_AUTH_TOKEN,
];

const VERIFICATION_KEYS: &[&str] = &[VERIFICATION_APPLICATION_KEY, VERIFICATION_APPLICATION_SECRET];
const VOICE_KEYS: &[&str] = &[VOICE_APPLICATION_KEY, VOICE_APPLICATION_SECRET];
const EMAIL_KEYS: &[&str] = &[MAILGUN_API_KEY];

/// Public name of the diagnostics capability.
pub const CONFIGURATION_TOOL_NAME: &str = "sinch-mcp-configuration";

/// Public name of the message events capability.
pub const GET_MESSAGE_EVENTS_TOOL_NAME: &str = "get-message-events";

/// Descriptor of the diagnostics capability. It is registered outside tag
/// filtering and needs no configuration.
pub const CONFIGURATION: CapabilityDescriptor = CapabilityDescriptor::new(
    CapabilityKey::Configuration,
    CONFIGURATION_TOOL_NAME,
    "Retrieve the configuration of the Sinch MCP server: which tools are enabled and \
     disabled, with troubleshooting information about why a tool would be disabled.",
    &[],
    &[],
);

/// Every tag-filtered capability, in registration order.
pub const BUILTIN_CAPABILITIES: &[CapabilityDescriptor] = &[
    // ---- Conversation ----
    CapabilityDescriptor::new(
        CapabilityKey::SendTextMessage,
        "send-text-message",
        "Send a text message to a contact on the specified channel. The contact can be a \
         phone number in E.164 format, or the identifier for the specified channel.",
        &["conversation", "notification", "send-text-message"],
        CONVERSATION_KEYS,
    ),
    CapabilityDescriptor::new(
        CapabilityKey::SendMediaMessage,
        "send-media-message",
        "Send a media message, given by its URL, to a contact on the specified channel.",
        &["conversation", "notification", "send-media-message"],
        CONVERSATION_KEYS,
    ),
    CapabilityDescriptor::new(
        CapabilityKey::SendLocationMessage,
        "send-location-message",
        "Send a location message from an address to a contact on the specified channel.",
        &["conversation", "notification", "send-location-message"],
        CONVERSATION_KEYS,
    ),
    CapabilityDescriptor::new(
        CapabilityKey::SendChoiceMessage,
        "send-choice-message",
        "Send a choice message (call, location, text or URL choices) to a contact on the \
         specified channel.",
        &["conversation", "notification", "send-choice-message"],
        CONVERSATION_KEYS,
    ),
    CapabilityDescriptor::new(
        CapabilityKey::SendTemplateMessage,
        "send-template-message",
        "Send a template message to a contact on the specified channel.",
        &["conversation", "notification", "send-template-message"],
        CONVERSATION_KEYS,
    ),
    CapabilityDescriptor::new(
        CapabilityKey::ListConversationApps,
        "list-conversation-apps",
        "Get a list of all Conversation apps in the account.",
        &["conversation", "notification", "list-conversation-apps"],
        CONVERSATION_KEYS,
    ),
    CapabilityDescriptor::new(
        CapabilityKey::ListMessagingTemplates,
        "list-messaging-templates",
        "Get a list of all messaging-related templates (omni-channel or channel specific) \
         belonging to the account. Email templates are not included.",
        &["conversation", "notification", "list-messaging-templates"],
        CONVERSATION_KEYS,
    ),
    CapabilityDescriptor::new(
        CapabilityKey::GetMessageEvents,
        GET_MESSAGE_EVENTS_TOOL_NAME,
        "Get the events of a message in a conversation. The events include delivery, read, \
         and other status updates related to the message.",
        &["conversation", "notification", GET_MESSAGE_EVENTS_TOOL_NAME],
        MESSAGE_EVENTS_KEYS,
    ),
    // ---- Verification ----
    CapabilityDescriptor::new(
        CapabilityKey::NumberLookup,
        "number-lookup",
        "Validate a phone number against first-party numbering sources.",
        &["verification", "number-lookup"],
        VERIFICATION_KEYS,
    ),
    CapabilityDescriptor::new(
        CapabilityKey::StartSmsVerification,
        "start-sms-verification",
        "Start a new SMS phone number verification request.",
        &["verification", "start-sms-verification"],
        VERIFICATION_KEYS,
    ),
    CapabilityDescriptor::new(
        CapabilityKey::ReportSmsVerification,
        "report-sms-verification",
        "Report the verification code received by the user to verify it.",
        &["verification", "report-sms-verification"],
        VERIFICATION_KEYS,
    ),
    // ---- Voice ----
    CapabilityDescriptor::new(
        CapabilityKey::TtsCallout,
        "tts-callout",
        "Make a callout with a Text-To-Speech prompt.",
        &["voice", "notification", "tts-callout"],
        VOICE_KEYS,
    ),
    CapabilityDescriptor::new(
        CapabilityKey::ConferenceCallout,
        "conference-callout",
        "Call a phone number and connect it to a conference room when answered.",
        &["voice", "conference-callout"],
        VOICE_KEYS,
    ),
    CapabilityDescriptor::new(
        CapabilityKey::ManageConferenceParticipant,
        "manage-conference-participant",
        "Manage a participant of a conference identified by its conference id.",
        &["voice", "manage-conference-participant"],
        VOICE_KEYS,
    ),
    CapabilityDescriptor::new(
        CapabilityKey::CloseConference,
        "close-conference",
        "Close a conference callout.",
        &["voice", "close-conference"],
        VOICE_KEYS,
    ),
    CapabilityDescriptor::new(
        CapabilityKey::GetCallInformation,
        "get-call-information",
        "Get information about a call using its ID.",
        &["voice", "notification", "get-call-information"],
        VOICE_KEYS,
    ),
    // ---- Email ----
    CapabilityDescriptor::new(
        CapabilityKey::SendEmail,
        "send-email",
        "Send an email, optionally from a template.",
        &["email", "notification", "send-email"],
        EMAIL_KEYS,
    ),
    CapabilityDescriptor::new(
        CapabilityKey::ListEmailTemplates,
        "list-email-templates",
        "List the email templates of a domain.",
        &["email", "notification", "list-email-templates"],
        EMAIL_KEYS,
    ),
    CapabilityDescriptor::new(
        CapabilityKey::ListEmailEvents,
        "list-email-events",
        "List the events recorded for sent emails.",
        &["email", "list-email-events"],
        EMAIL_KEYS,
    ),
    CapabilityDescriptor::new(
        CapabilityKey::RetrieveEmailInfo,
        "retrieve-email-info",
        "Retrieve the content and metadata of a stored email.",
        &["email", "notification", "retrieve-email-info"],
        EMAIL_KEYS,
    ),
    CapabilityDescriptor::new(
        CapabilityKey::AnalyticsMetrics,
        "analytics-metrics",
        "Retrieve email analytics metrics for a domain.",
        &["email", "analytics-metrics"],
        EMAIL_KEYS,
    ),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_and_keys_are_unique() {
        let names: HashSet<_> = BUILTIN_CAPABILITIES.iter().map(|d| d.name).collect();
        let keys: HashSet<_> = BUILTIN_CAPABILITIES.iter().map(|d| d.key).collect();
        assert_eq!(names.len(), BUILTIN_CAPABILITIES.len());
        assert_eq!(keys.len(), BUILTIN_CAPABILITIES.len());
        assert!(!names.contains(CONFIGURATION_TOOL_NAME));
    }

    #[test]
    fn test_every_descriptor_is_selectable_by_its_own_name() {
        for descriptor in BUILTIN_CAPABILITIES {
            assert!(
                descriptor.activation_tags.contains(&descriptor.name),
                "{} cannot be selected by name",
                descriptor.name
            );
        }
    }

    #[test]
    fn test_every_descriptor_requires_configuration() {
        assert!(BUILTIN_CAPABILITIES
            .iter()
            .all(|d| !d.required_config_keys.is_empty()));
    }
}
