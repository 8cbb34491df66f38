//! Capability Registry: decides which capabilities are exposed and why the
//! others are not.
//!
//! Registration is a single pass over the descriptor table:
//!
//! 1. Resolve the active tags (empty means the `all` wildcard).
//! 2. For each descriptor, check tag selection, then required configuration.
//! 3. Install every enabled capability into the dispatcher.
//! 4. Replace the status table wholesale, disabled capabilities included.
//!
//! A disabled capability is never an error; it is recorded with its reason
//! and left out of dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::capability::{CapabilityDescriptor, CapabilityKey, BUILTIN_CAPABILITIES, CONFIGURATION};
use super::status::{CapabilityStatus, DisabledReason, StatusEntry, StatusReader, StatusTable};
use super::tags::ActiveTags;
use crate::config::Environment;
use crate::mcp::dispatcher::{ToolDispatcher, ToolHandler, UnboundHandler};
use crate::mcp::prompts::{self, CONVERSATION_PROMPT_TAGS};
use crate::tools::ConfigurationTool;
use crate::utilities::errors::ConfigurationMissing;

/// Owner of the capability table and the process-wide status map.
pub struct CapabilityRegistry {
    descriptors: Vec<CapabilityDescriptor>,
    handlers: HashMap<CapabilityKey, Arc<dyn ToolHandler>>,
    status: Arc<RwLock<StatusTable>>,
}

impl CapabilityRegistry {
    /// Registry over an explicit descriptor table.
    pub fn new(descriptors: Vec<CapabilityDescriptor>) -> Self {
        Self {
            descriptors,
            handlers: HashMap::new(),
            status: Arc::new(RwLock::new(StatusTable::default())),
        }
    }

    /// Registry over every built-in capability.
    pub fn with_builtin() -> Self {
        Self::new(BUILTIN_CAPABILITIES.to_vec())
    }

    /// Bind the handler serving `key`. Enabled capabilities without a handler
    /// are exposed with an [`UnboundHandler`].
    pub fn bind_handler(&mut self, key: CapabilityKey, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(key, handler);
    }

    pub fn descriptors(&self) -> &[CapabilityDescriptor] {
        &self.descriptors
    }

    /// Read accessor for the status map.
    pub fn status_reader(&self) -> StatusReader {
        StatusReader::new(Arc::clone(&self.status))
    }

    /// Snapshot of the status map as of the last registration pass.
    pub fn statuses(&self) -> StatusTable {
        self.status.read().clone()
    }

    /// Decide the status of one descriptor. Pure: no registry state is read
    /// or written.
    pub fn evaluate(
        descriptor: &CapabilityDescriptor,
        active: &ActiveTags,
        env: &dyn Environment,
    ) -> CapabilityStatus {
        if !active.selects(descriptor.activation_tags) {
            return CapabilityStatus::Disabled(DisabledReason::NotSelected {
                capability_tags: descriptor
                    .activation_tags
                    .iter()
                    .map(|t| t.to_string())
                    .collect(),
            });
        }

        let missing = env.missing(descriptor.required_config_keys);
        if !missing.is_empty() {
            return CapabilityStatus::Disabled(DisabledReason::MissingConfiguration(
                ConfigurationMissing { missing },
            ));
        }

        CapabilityStatus::Enabled
    }

    /// Run a full registration pass.
    ///
    /// The dispatcher is cleared first and the status table is replaced, so
    /// nothing from a previous pass survives. Returns the new table.
    pub fn register<S: AsRef<str>>(
        &self,
        active_tags: &[S],
        env: &dyn Environment,
        dispatcher: &mut ToolDispatcher,
    ) -> StatusTable {
        let active = ActiveTags::resolve(active_tags);
        dispatcher.clear();

        let mut entries = Vec::with_capacity(self.descriptors.len() + 1);
        for descriptor in &self.descriptors {
            let status = Self::evaluate(descriptor, &active, env);
            match &status {
                CapabilityStatus::Enabled => {
                    let handler = self.handlers.get(&descriptor.key).cloned().unwrap_or_else(|| {
                        Arc::new(UnboundHandler::new(descriptor.name)) as Arc<dyn ToolHandler>
                    });
                    dispatcher.register_tool(descriptor.name, descriptor.description, handler);
                }
                CapabilityStatus::Disabled(reason) => {
                    log::debug!("Capability '{}' disabled: {}", descriptor.name, reason);
                }
            }
            entries.push(StatusEntry {
                name: descriptor.name.to_string(),
                status,
            });
        }

        // Diagnostics are always available, whatever the tags select.
        let configuration = self
            .handlers
            .get(&CapabilityKey::Configuration)
            .cloned()
            .unwrap_or_else(|| {
                Arc::new(ConfigurationTool::new(self.status_reader())) as Arc<dyn ToolHandler>
            });
        dispatcher.register_tool(CONFIGURATION.name, CONFIGURATION.description, configuration);
        entries.push(StatusEntry {
            name: CONFIGURATION.name.to_string(),
            status: CapabilityStatus::Enabled,
        });

        if active.selects(CONVERSATION_PROMPT_TAGS) {
            dispatcher.register_prompt(prompts::conversation_app_id());
        }

        let table = StatusTable::new(entries);
        log::info!(
            "Registered {} of {} capabilities",
            table.enabled_names().len(),
            table.len()
        );
        *self.status.write() = table.clone();
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigGroup, MapEnvironment, NGROK_AUTH_TOKEN};

    fn descriptor(
        key: CapabilityKey,
        name: &'static str,
        tags: &'static [&'static str],
        keys: &'static [&'static str],
    ) -> CapabilityDescriptor {
        CapabilityDescriptor::new(key, name, "test", tags, keys)
    }

    fn builtin_names_with_tag(tag: &str) -> Vec<&'static str> {
        BUILTIN_CAPABILITIES
            .iter()
            .filter(|d| d.activation_tags.contains(&tag))
            .map(|d| d.name)
            .collect()
    }

    #[test]
    fn test_registered_iff_selected_and_configured() {
        let descriptors = vec![
            descriptor(CapabilityKey::TtsCallout, "a", &["voice"], &["K1"]),
            descriptor(CapabilityKey::SendEmail, "b", &["email"], &["K2"]),
            descriptor(CapabilityKey::NumberLookup, "c", &["voice", "verification"], &["K2"]),
            descriptor(CapabilityKey::CloseConference, "d", &["misc"], &[]),
        ];
        let registry = CapabilityRegistry::new(descriptors.clone());
        let env = MapEnvironment::new().with("K1", "x");

        let tag_sets: Vec<Vec<&str>> = vec![
            vec![],
            vec!["all"],
            vec!["voice"],
            vec!["EMAIL"],
            vec!["misc", "verification"],
            vec!["unknown"],
        ];
        for tags in tag_sets {
            let mut dispatcher = ToolDispatcher::new();
            registry.register(&tags, &env, &mut dispatcher);
            let active = ActiveTags::resolve(&tags);
            for d in &descriptors {
                let selected = tags.is_empty()
                    || tags.iter().any(|t| t.eq_ignore_ascii_case("all"))
                    || d.activation_tags
                        .iter()
                        .any(|dt| tags.iter().any(|t| t.eq_ignore_ascii_case(dt)));
                let configured = d.required_config_keys.iter().all(|k| *k == "K1");
                assert_eq!(
                    dispatcher.has_tool(d.name),
                    selected && configured,
                    "tags {:?}, capability {}",
                    tags,
                    d.name
                );
                assert_eq!(
                    CapabilityRegistry::evaluate(d, &active, &env).is_enabled(),
                    selected && configured
                );
            }
        }
    }

    #[test]
    fn test_empty_descriptor_set_registers_only_diagnostics() {
        let registry = CapabilityRegistry::new(vec![]);
        let mut dispatcher = ToolDispatcher::new();
        let table = registry.register(&["voice"], &MapEnvironment::new(), &mut dispatcher);
        assert_eq!(dispatcher.tool_names(), vec![CONFIGURATION.name.to_string()]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_missing_keys_enumerated_in_declaration_order() {
        let registry = CapabilityRegistry::new(vec![descriptor(
            CapabilityKey::SendTextMessage,
            "send",
            &["conversation"],
            &["Z_KEY", "A_KEY", "M_KEY"],
        )]);
        let env = MapEnvironment::new().with("A_KEY", "set");
        let mut dispatcher = ToolDispatcher::new();
        let table = registry.register(&Vec::<String>::new(), &env, &mut dispatcher);

        match table.get("send").unwrap() {
            CapabilityStatus::Disabled(DisabledReason::MissingConfiguration(missing)) => {
                assert_eq!(missing.missing, vec!["Z_KEY", "M_KEY"]);
            }
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[test]
    fn test_voice_only_scenario() {
        let registry = CapabilityRegistry::with_builtin();
        let env = MapEnvironment::new().with_group(ConfigGroup::Voice);
        let mut dispatcher = ToolDispatcher::new();
        let table = registry.register(&["voice"], &env, &mut dispatcher);

        let voice = builtin_names_with_tag("voice");
        assert!(!voice.is_empty());
        for entry in table.entries() {
            if voice.contains(&entry.name.as_str()) || entry.name == CONFIGURATION.name {
                assert!(entry.status.is_enabled(), "{} should be enabled", entry.name);
            } else {
                assert!(!entry.status.is_enabled(), "{} should be disabled", entry.name);
            }
        }
        assert!(dispatcher.prompt("conversation-app-id").is_none());
    }

    #[test]
    fn test_voice_tag_case_insensitive() {
        let registry = CapabilityRegistry::with_builtin();
        let env = MapEnvironment::new().with_group(ConfigGroup::Voice);
        let mut dispatcher = ToolDispatcher::new();
        registry.register(&["Voice"], &env, &mut dispatcher);
        assert!(dispatcher.has_tool("tts-callout"));
    }

    #[test]
    fn test_wildcard_reports_missing_configuration() {
        let registry = CapabilityRegistry::with_builtin();
        let env = MapEnvironment::new().with_group(ConfigGroup::Voice);
        let mut dispatcher = ToolDispatcher::new();
        let table = registry.register(&Vec::<String>::new(), &env, &mut dispatcher);

        let send_email = table.get("send-email").unwrap();
        assert_eq!(
            send_email.to_string(),
            "missing configuration keys: MAILGUN_API_KEY"
        );
        assert!(table.get("tts-callout").unwrap().is_enabled());
    }

    #[test]
    fn test_empty_tags_equivalent_to_all() {
        let registry = CapabilityRegistry::with_builtin();
        let env = MapEnvironment::new()
            .with_group(ConfigGroup::Conversation)
            .with_group(ConfigGroup::Email);

        let mut d1 = ToolDispatcher::new();
        let t1 = registry.register(&Vec::<String>::new(), &env, &mut d1);
        let mut d2 = ToolDispatcher::new();
        let t2 = registry.register(&["all"], &env, &mut d2);

        assert_eq!(t1, t2);
        assert_eq!(d1.tool_names(), d2.tool_names());
        assert!(d1.prompt("conversation-app-id").is_some());
    }

    #[test]
    fn test_tunnel_credential_gates_message_events_only() {
        let registry = CapabilityRegistry::with_builtin();
        let env = MapEnvironment::new()
            .with_group(ConfigGroup::Conversation)
            .with_group(ConfigGroup::WebhookTarget);
        let mut dispatcher = ToolDispatcher::new();
        let table = registry.register(&["conversation"], &env, &mut dispatcher);

        assert!(table.get("send-text-message").unwrap().is_enabled());
        let events = table.get("get-message-events").unwrap();
        assert_eq!(
            events.to_string(),
            format!("missing configuration keys: {}", NGROK_AUTH_TOKEN)
        );
    }

    #[test]
    fn test_reregistration_replaces_statuses() {
        let registry = CapabilityRegistry::with_builtin();
        let mut env = MapEnvironment::new();
        let mut dispatcher = ToolDispatcher::new();
        let reader = registry.status_reader();

        registry.register(&["email"], &env, &mut dispatcher);
        assert!(!reader.snapshot().get("send-email").unwrap().is_enabled());

        env.set("MAILGUN_API_KEY", "key");
        registry.register(&["voice"], &env, &mut dispatcher);
        let snapshot = reader.snapshot();
        assert_eq!(
            snapshot.get("send-email").unwrap().reason().map(|r| matches!(r, DisabledReason::NotSelected { .. })),
            Some(true)
        );
        assert!(!dispatcher.has_tool("send-email"));
        assert_eq!(snapshot.len(), BUILTIN_CAPABILITIES.len() + 1);
    }

    #[tokio::test]
    async fn test_bound_handler_is_used() {
        use crate::mcp::dispatcher::ToolResponse;
        use async_trait::async_trait;
        use serde_json::Value;

        struct Fixed;

        #[async_trait]
        impl ToolHandler for Fixed {
            async fn call(&self, _arguments: Value) -> ToolResponse {
                ToolResponse::text("fixed")
            }
        }

        let mut registry = CapabilityRegistry::with_builtin();
        registry.bind_handler(CapabilityKey::SendEmail, Arc::new(Fixed));
        let env = MapEnvironment::new().with_group(ConfigGroup::Email);
        let mut dispatcher = ToolDispatcher::new();
        registry.register(&["email"], &env, &mut dispatcher);

        let bound = dispatcher.tool("send-email").unwrap().handler.clone();
        assert_eq!(bound.call(Value::Null).await.joined_text(), "fixed");

        let unbound = dispatcher.tool("list-email-events").unwrap().handler.clone();
        assert!(unbound.call(Value::Null).await.is_error);
    }
}
