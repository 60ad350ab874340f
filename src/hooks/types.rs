//! Wire types for the hook protocol.
//!
//! Inbound events arrive as one JSON object on stdin; every field is
//! optional because hosts differ in what they send and a missing field is
//! never an error. Outbound responses are exactly one JSON object on
//! stdout per invocation, no matter what happened inside the handler.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One inbound hook event. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookEvent {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_input: Option<Value>,
    #[serde(default)]
    pub tool_response: Option<Value>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default, alias = "teammate", alias = "subagent_id")]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub agent_type: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub transcript_path: Option<String>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub observation_type: Option<String>,
    #[serde(default)]
    pub concepts: Option<Vec<String>>,
    #[serde(default)]
    pub worktree_path: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
}

impl HookEvent {
    /// The best available transcript text for this event.
    pub fn transcript_text(&self) -> &str {
        self.transcript
            .as_deref()
            .or(self.stop_reason.as_deref())
            .or(self.content.as_deref())
            .unwrap_or("")
    }

    fn tool_input_str(&self, key: &str) -> Option<&str> {
        self.tool_input.as_ref()?.get(key)?.as_str()
    }

    pub fn file_path(&self) -> Option<&str> {
        self.tool_input_str("file_path")
            .or_else(|| self.tool_input_str("filePath"))
    }

    pub fn command(&self) -> Option<&str> {
        self.tool_input_str("command")
    }

    pub fn skill_name(&self) -> Option<&str> {
        self.tool_input_str("skill").or_else(|| self.tool_input_str("name"))
    }

    pub fn task_ref(&self) -> Option<&str> {
        self.task_id
            .as_deref()
            .or_else(|| self.tool_input_str("task_id"))
    }
}

/// Block/allow verdict. The host treats anything but `Block` as allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Block,
}

/// The outbound envelope. An all-`None` value serializes to `{}`, the
/// explicit empty acknowledgement.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_specific_output: Option<Value>,
}

impl HookResponse {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn message(text: impl Into<String>) -> Self {
        Self {
            system_message: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn block(text: impl Into<String>) -> Self {
        Self {
            system_message: Some(text.into()),
            decision: Some(Decision::Block),
            ..Self::default()
        }
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.hook_specific_output = Some(output);
        self
    }
}
