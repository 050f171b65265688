//! Skill system for Switchyard.
//!
//! Skills are named groups of actions. They reach the agent through the
//! [`SkillRegistry`], which aggregates tool descriptors from heterogeneous
//! sources: local SKILL.md manifests bound to in-process handlers, and
//! remote MCP servers spoken to over stdio or SSE.

pub mod local;
pub mod manifest;
pub mod mcp;
pub mod registry;

pub use local::{handler, ActionHandler, HandlerFuture, LocalSkillSource, SkillModule};
pub use manifest::{parse_manifest, ActionSpec, ParamSpec, SkillManifest};
pub use mcp::{McpSource, McpTransport, SseTransport, StdioTransport};
pub use registry::SkillRegistry;
