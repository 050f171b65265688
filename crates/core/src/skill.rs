//! Skill source trait — the abstraction over tool providers.
//!
//! A source advertises tool descriptors and executes invocations routed to
//! it by the registry. The polymorphism is closed: sources are either local
//! (manifests on disk) or remote (a protocol client), but the trait keeps
//! the seam open.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SkillError;
use crate::session::SessionContext;
use crate::tool::ToolDescriptor;

/// Which kind of provider backs a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Skill manifests loaded from disk
    Local,
    /// A remote tool server spoken to over a protocol client
    Remote,
}

/// A provider of tool descriptors and an executor for them.
///
/// Lifecycle: `initialize` is called exactly once before the source becomes
/// visible to lookups; `destroy` is called when the source is replaced or
/// unregistered and must release transports and timers.
#[async_trait]
pub trait SkillSource: Send + Sync {
    /// Globally unique source name.
    fn name(&self) -> &str;

    /// Local or remote.
    fn kind(&self) -> SourceKind;

    /// Establish the source (load manifests, connect transports).
    async fn initialize(&self) -> Result<(), SkillError>;

    /// The tools this source currently advertises. A disconnected remote
    /// source returns an empty list rather than an error.
    async fn get_tools(&self) -> Result<Vec<ToolDescriptor>, SkillError>;

    /// Execute a tool this source advertises.
    async fn execute(
        &self,
        tool_name: &str,
        params: serde_json::Value,
        ctx: &SessionContext,
    ) -> Result<serde_json::Value, SkillError>;

    /// Tear down the source. Close errors are swallowed and logged.
    async fn destroy(&self);
}

/// Metadata describing a loaded skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillMetadata {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}
