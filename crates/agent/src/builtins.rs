//! Built-in tool descriptors handled inline by the agent loop.

use switchyard_core::tool::{builtin, ToolDescriptor};

fn plan_task() -> ToolDescriptor {
    ToolDescriptor {
        name: builtin::PLAN_TASK.into(),
        description: "Think through the request and lay out an ordered plan before acting."
            .into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "thought": {
                    "type": "string",
                    "description": "Your reasoning about the request"
                },
                "steps": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Ordered steps you will take"
                }
            },
            "required": ["thought", "steps"]
        }),
    }
}

fn memory_remember() -> ToolDescriptor {
    ToolDescriptor {
        name: builtin::MEMORY_REMEMBER.into(),
        description: "Save an important fact to long-term memory.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The fact to remember"
                },
                "tags": {
                    "type": "string",
                    "description": "Comma-separated tags (optional)"
                }
            },
            "required": ["content"]
        }),
    }
}

fn memory_recall() -> ToolDescriptor {
    ToolDescriptor {
        name: builtin::MEMORY_RECALL.into(),
        description: "Search long-term memory for relevant facts.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to look for"
                },
                "limit": {
                    "type": "number",
                    "description": "Maximum results (default 5)"
                }
            },
            "required": ["query"]
        }),
    }
}

fn dag_create_task() -> ToolDescriptor {
    ToolDescriptor {
        name: builtin::DAG_CREATE_TASK.into(),
        description: "Persist a task into the session's task graph. The description may be \
                      free-form text, or a JSON object {\"tool\", \"params\"} to dispatch a tool."
            .into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "description": {
                    "type": "string",
                    "description": "What the task should do"
                },
                "dependencies": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Ids of tasks that must complete first (optional)"
                }
            },
            "required": ["description"]
        }),
    }
}

fn dag_get_status() -> ToolDescriptor {
    ToolDescriptor {
        name: builtin::DAG_GET_STATUS.into(),
        description: "Inspect the session's task graph: tasks, statuses, and dependency edges."
            .into(),
        parameters: serde_json::json!({"type": "object", "properties": {}}),
    }
}

fn dag_execute() -> ToolDescriptor {
    ToolDescriptor {
        name: builtin::DAG_EXECUTE.into(),
        description: "Run the session's ready tasks in dependency order.".into(),
        parameters: serde_json::json!({"type": "object", "properties": {}}),
    }
}

/// The built-in descriptors advertised for a run. `plan_task` is always
/// present; memory tools require long-term memory; DAG tools require a
/// task store.
pub fn descriptors(has_memory: bool, has_dag: bool) -> Vec<ToolDescriptor> {
    let mut tools = vec![plan_task()];
    if has_memory {
        tools.push(memory_remember());
        tools.push(memory_recall());
    }
    if has_dag {
        tools.push(dag_create_task());
        tools.push(dag_get_status());
        tools.push(dag_execute());
    }
    tools
}
