// In-memory dialogue history for a single session

use crate::types::{RequestId, ToolInvocation, ToolResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum TurnKind {
    User {
        text: String,
    },
    /// Final textual answer from the model
    Model {
        text: String,
    },
    /// Tool calls the model requested in one response
    ToolRequest {
        invocations: Vec<ToolInvocation>,
    },
    ToolResult {
        request_id: RequestId,
        tool: String,
        result: ToolResult,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub kind: TurnKind,
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn new(kind: TurnKind) -> Self {
        Self {
            kind,
            at: Utc::now(),
        }
    }

    /// One-line rendering for transcripts
    pub fn summary(&self) -> String {
        match &self.kind {
            TurnKind::User { text } => format!("You: {}", text),
            TurnKind::Model { text } => format!("Model: {}", text),
            TurnKind::ToolRequest { invocations } => {
                let calls = invocations
                    .iter()
                    .map(|i| format!("{}({})", i.name, serde_json::Value::Object(i.arguments.clone())))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("Tool request: {}", calls)
            }
            TurnKind::ToolResult { tool, result, .. } => {
                let status = if result.is_error() { "error" } else { "ok" };
                format!("Tool result [{} {}]: {}", tool, status, result.text())
            }
        }
    }
}

/// Append-only sequence of turns
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: TurnKind) {
        self.turns.push(Turn::new(kind));
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.push(TurnKind::User { text: text.into() });
    }

    pub fn push_model(&mut self, text: impl Into<String>) {
        self.push(TurnKind::Model { text: text.into() });
    }

    pub fn push_tool_request(&mut self, invocations: Vec<ToolInvocation>) {
        self.push(TurnKind::ToolRequest { invocations });
    }

    pub fn push_tool_result(&mut self, invocation: &ToolInvocation, result: ToolResult) {
        self.push(TurnKind::ToolResult {
            request_id: invocation.request_id.clone(),
            tool: invocation.name.clone(),
            result,
        });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn transcript(&self) -> String {
        self.turns
            .iter()
            .map(Turn::summary)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContentBlock;
    use serde_json::Map;

    #[test]
    fn test_tool_result_keeps_request_id() {
        let mut state = ConversationState::new();
        let invocation = ToolInvocation::new("list-tables", Map::new());
        state.push_tool_request(vec![invocation.clone()]);
        state.push_tool_result(
            &invocation,
            ToolResult::Success(vec![ContentBlock::text("users")]),
        );

        match &state.turns()[1].kind {
            TurnKind::ToolResult { request_id, tool, .. } => {
                assert_eq!(request_id, &invocation.request_id);
                assert_eq!(tool, "list-tables");
            }
            other => panic!("unexpected turn: {:?}", other),
        }
    }

    #[test]
    fn test_transcript() {
        let mut state = ConversationState::new();
        state.push_user("which tables exist?");
        state.push_model("users and orders");
        assert_eq!(state.len(), 2);
        assert_eq!(
            state.transcript(),
            "You: which tables exist?\nModel: users and orders"
        );
    }

    #[test]
    fn test_error_result_summary() {
        let invocation = ToolInvocation::new("execute-sql", Map::new());
        let mut state = ConversationState::new();
        state.push_tool_result(&invocation, ToolResult::error("syntax error at or near \"SELEC\""));
        assert!(state.turns()[0].summary().contains("[execute-sql error]"));
    }
}
