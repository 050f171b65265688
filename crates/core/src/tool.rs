//! Tool descriptors and tool call requests.
//!
//! A `ToolDescriptor` is the JSON-Schema-shaped advertisement of a callable
//! surface sent to the LLM. A `ToolCallRequest` is the model's request to
//! invoke one, carried inside an assistant message.

use serde::{Deserialize, Serialize};

/// Reserved built-in tool names handled inline by the agent loop.
pub mod builtin {
    pub const PLAN_TASK: &str = "plan_task";
    pub const MEMORY_REMEMBER: &str = "memory_remember";
    pub const MEMORY_RECALL: &str = "memory_recall";
    pub const DAG_CREATE_TASK: &str = "dag_create_task";
    pub const DAG_GET_STATUS: &str = "dag_get_status";
    pub const DAG_EXECUTE: &str = "dag_execute";

    /// Whether a tool name is one of the reserved built-ins.
    pub fn is_builtin(name: &str) -> bool {
        matches!(
            name,
            PLAN_TASK | MEMORY_REMEMBER | MEMORY_RECALL | DAG_CREATE_TASK | DAG_GET_STATUS
                | DAG_EXECUTE
        )
    }
}

/// A tool definition advertised to the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Dotted `source.action` path, or a reserved built-in name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters. Treated as opaque;
    /// argument validation is delegated to handlers.
    pub parameters: serde_json::Value,
}

/// A tool call emitted by the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique call ID (matches the provider's tool_call id)
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a JSON string
    pub arguments: String,
}

impl ToolCallRequest {
    /// Parse the arguments string as JSON, defaulting to an empty object
    /// when the model produced nothing or malformed fragments.
    pub fn parsed_arguments(&self) -> serde_json::Value {
        if self.arguments.trim().is_empty() {
            return serde_json::Value::Object(serde_json::Map::new());
        }
        serde_json::from_str(&self.arguments)
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names() {
        assert!(builtin::is_builtin("plan_task"));
        assert!(builtin::is_builtin("dag_execute"));
        assert!(!builtin::is_builtin("files.read"));
    }

    #[test]
    fn parsed_arguments_defaults_to_empty_object() {
        let call = ToolCallRequest {
            id: "call_1".into(),
            name: "files.read".into(),
            arguments: "".into(),
        };
        assert!(call.parsed_arguments().is_object());

        let broken = ToolCallRequest {
            id: "call_2".into(),
            name: "files.read".into(),
            arguments: "{not json".into(),
        };
        assert!(broken.parsed_arguments().is_object());
    }

    #[test]
    fn descriptor_serialization() {
        let tool = ToolDescriptor {
            name: "files.list_directory".into(),
            description: "List the entries of a directory".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Directory path" }
                },
                "required": ["path"]
            }),
        };
        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("list_directory"));
        assert!(json.contains("required"));
    }
}
