//! Configuration loading and validation for Switchyard.
//!
//! Loads configuration from a TOML file with serde defaults so a partial
//! file (or none at all) still yields a working runtime. Validates all
//! settings at startup; a malformed remote-server entry fails fast with a
//! `ConfigError` naming the offending field.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use switchyard_core::error::ConfigError;

/// The root configuration structure.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Context window budgets
    #[serde(default)]
    pub context: ContextConfig,

    /// Short-term memory limits
    #[serde(default)]
    pub short_term: ShortTermConfig,

    /// Local skill directories
    #[serde(default)]
    pub skills: SkillsConfig,

    /// Remote tool server entries
    #[serde(default)]
    pub mcp_servers: Vec<McpServerConfig>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("agent", &self.agent)
            .field("context", &self.context)
            .field("short_term", &self.short_term)
            .field("skills", &self.skills)
            .field("mcp_servers", &self.mcp_servers)
            .finish()
    }
}

/// Agent loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Default model sent to the LLM backend
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum think-act iterations per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Hard per-tool-call timeout in seconds
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

fn default_model() -> String {
    "claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_iterations() -> u32 {
    10
}
fn default_tool_timeout_secs() -> u64 {
    60
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_iterations: default_max_iterations(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

/// Context window budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Total token budget for the assembled message list
    #[serde(default = "default_context_max_tokens")]
    pub max_tokens: usize,

    /// Tokens reserved for the model's own response
    #[serde(default = "default_reserved_tokens")]
    pub reserved_tokens: usize,
}

fn default_context_max_tokens() -> usize {
    8192
}
fn default_reserved_tokens() -> usize {
    1024
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_context_max_tokens(),
            reserved_tokens: default_reserved_tokens(),
        }
    }
}

/// Short-term memory limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortTermConfig {
    /// Maximum concurrently held sessions before LRU eviction
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_max_sessions() -> usize {
    1000
}

impl Default for ShortTermConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
        }
    }
}

/// Local skill loading.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SkillsConfig {
    /// Directories scanned for `<skill>/SKILL.md` manifests
    #[serde(default)]
    pub dirs: Vec<PathBuf>,
}

/// Transport kind for a remote tool server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpTransport {
    Stdio,
    Sse,
}

/// One remote tool server entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Server name; the registered source is `mcp-<name>`
    pub name: String,

    /// How to reach the server
    pub transport: McpTransport,

    /// Command to spawn (stdio transport)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Arguments for the command
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Event stream URL (sse transport)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl McpServerConfig {
    /// Check that the entry carries the fields its transport requires.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingField {
                context: "mcp server".into(),
                field: "name".into(),
            });
        }
        match self.transport {
            McpTransport::Stdio if self.command.is_none() => Err(ConfigError::MissingField {
                context: format!("mcp server '{}'", self.name),
                field: "command".into(),
            }),
            McpTransport::Sse if self.url.is_none() => Err(ConfigError::MissingField {
                context: format!("mcp server '{}'", self.name),
                field: "url".into(),
            }),
            _ => Ok(()),
        }
    }
}

impl AppConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
        let config: Self =
            toml::from_str(&raw).map_err(|e| ConfigError::Load(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.context.reserved_tokens >= self.context.max_tokens {
            return Err(ConfigError::InvalidValue {
                field: "context.reserved_tokens".into(),
                reason: "must be smaller than context.max_tokens".into(),
            });
        }
        if self.short_term.max_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "short_term.max_sessions".into(),
                reason: "must be at least 1".into(),
            });
        }
        for server in &self.mcp_servers {
            server.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.agent.max_iterations, 10);
        assert_eq!(config.agent.tool_timeout_secs, 60);
        assert_eq!(config.context.max_tokens, 8192);
    }

    #[test]
    fn parse_full_toml() {
        let raw = r#"
            [agent]
            model = "gpt-4o"
            max_iterations = 5

            [context]
            max_tokens = 4096
            reserved_tokens = 512

            [skills]
            dirs = ["./skills"]

            [[mcp_servers]]
            name = "file-manager"
            transport = "stdio"
            command = "file-manager-mcp"
            args = ["--root", "/data"]

            [[mcp_servers]]
            name = "search"
            transport = "sse"
            url = "http://localhost:9090/sse"
            enabled = false
        "#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        config.validate().unwrap();
        assert_eq!(config.agent.model, "gpt-4o");
        assert_eq!(config.mcp_servers.len(), 2);
        assert_eq!(config.mcp_servers[0].transport, McpTransport::Stdio);
        assert!(!config.mcp_servers[1].enabled);
    }

    #[test]
    fn stdio_without_command_rejected() {
        let raw = r#"
            [[mcp_servers]]
            name = "broken"
            transport = "stdio"
        "#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("command"));
    }

    #[test]
    fn sse_without_url_rejected() {
        let raw = r#"
            [[mcp_servers]]
            name = "broken"
            transport = "sse"
        "#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("url"));
    }

    #[test]
    fn reserved_tokens_must_fit_budget() {
        let mut config = AppConfig::default();
        config.context.reserved_tokens = config.context.max_tokens;
        assert!(config.validate().is_err());
    }
}
