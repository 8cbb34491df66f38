//! Prompts offered to the agent alongside the tools.

use super::dispatcher::{PromptArgument, PromptDefinition};

/// Tags that select the conversation prompts.
pub const CONVERSATION_PROMPT_TAGS: &[&str] = &["conversation", "notification"];

/// Reminds the agent which Conversation app to use.
pub fn conversation_app_id() -> PromptDefinition {
    PromptDefinition {
        name: "conversation-app-id".to_string(),
        description: "Set the Conversation API app used by the messaging tools".to_string(),
        arguments: vec![PromptArgument {
            name: "appId".to_string(),
            description: "The ID of the app to use for the Sinch conversation API".to_string(),
            required: true,
        }],
        template: "Please include the app ID {appId} when the request will require to use a \
                   tool related to the Sinch Conversation API."
            .to_string(),
    }
}
