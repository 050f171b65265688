//! Local skill source — discovers SKILL.md manifests under configured
//! directories and binds their declared actions to handlers.
//!
//! Handlers come from [`SkillModule`] implementations registered per skill
//! name. Binding order for each declared action:
//! 1. the module's handler for the action name,
//! 2. the module's fallback handler,
//! 3. a placeholder that always fails.
//!
//! Module `init`/`destroy` hooks run during source initialize/destroy.

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use switchyard_core::error::SkillError;
use switchyard_core::session::SessionContext;
use switchyard_core::skill::{SkillSource, SourceKind};
use switchyard_core::tool::ToolDescriptor;

use crate::manifest::{parse_manifest, SkillManifest};

/// Boxed future returned by action handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<serde_json::Value, SkillError>> + Send>>;

/// An action implementation: `(context, params) → result | error`.
pub type ActionHandler =
    Arc<dyn Fn(SessionContext, serde_json::Value) -> HandlerFuture + Send + Sync>;

/// The implementation companion of a skill manifest.
///
/// Where the manifest declares actions, the module supplies behavior.
#[async_trait]
pub trait SkillModule: Send + Sync {
    /// Called while the source initializes.
    async fn init(&self) -> Result<(), SkillError> {
        Ok(())
    }

    /// Called while the source is destroyed.
    async fn destroy(&self) {}

    /// The handler for a named action, when the module has one.
    fn action(&self, name: &str) -> Option<ActionHandler>;

    /// A catch-all handler used when no named handler exists.
    fn fallback(&self) -> Option<ActionHandler> {
        None
    }
}

/// Wrap an async closure as an [`ActionHandler`].
pub fn handler<F, Fut>(f: F) -> ActionHandler
where
    F: Fn(SessionContext, serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value, SkillError>> + Send + 'static,
{
    Arc::new(move |ctx, params| Box::pin(f(ctx, params)))
}

struct LoadedSkill {
    manifest: SkillManifest,
    handlers: HashMap<String, ActionHandler>,
    module: Option<Arc<dyn SkillModule>>,
}

/// A skill source backed by manifests on disk.
pub struct LocalSkillSource {
    name: String,
    dirs: Vec<PathBuf>,
    modules: HashMap<String, Arc<dyn SkillModule>>,
    loaded: RwLock<Vec<LoadedSkill>>,
}

impl LocalSkillSource {
    /// Create a source scanning the given directories.
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self {
            name: "local".into(),
            dirs,
            modules: HashMap::new(),
            loaded: RwLock::new(Vec::new()),
        }
    }

    /// Override the source name (default "local").
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Register the implementation module for a skill name.
    pub fn with_module(mut self, skill: impl Into<String>, module: Arc<dyn SkillModule>) -> Self {
        self.modules.insert(skill.into(), module);
        self
    }

    /// Number of loaded skills.
    pub async fn skill_count(&self) -> usize {
        self.loaded.read().await.len()
    }

    fn bind(&self, manifest: &SkillManifest) -> LoadedSkill {
        let module = self.modules.get(&manifest.metadata.name).cloned();
        let mut handlers = HashMap::new();

        for action in &manifest.actions {
            let bound = module
                .as_ref()
                .and_then(|m| m.action(&action.name))
                .or_else(|| module.as_ref().and_then(|m| m.fallback()))
                .unwrap_or_else(|| placeholder(&manifest.metadata.name, &action.name));
            handlers.insert(action.name.clone(), bound);
        }

        LoadedSkill {
            manifest: manifest.clone(),
            handlers,
            module,
        }
    }
}

/// A handler standing in for a missing implementation.
fn placeholder(skill: &str, action: &str) -> ActionHandler {
    let tool = format!("{skill}.{action}");
    Arc::new(move |_ctx, _params| {
        let tool = tool.clone();
        Box::pin(async move {
            Err(SkillError::execution(
                tool,
                "action declared in manifest but no handler is bound",
            ))
        })
    })
}

#[async_trait]
impl SkillSource for LocalSkillSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Local
    }

    async fn initialize(&self) -> Result<(), SkillError> {
        let mut loaded = Vec::new();

        for dir in &self.dirs {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Skipping unreadable skill directory");
                    continue;
                }
            };

            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                let manifest_path = path.join("SKILL.md");
                if !manifest_path.exists() {
                    continue;
                }

                let dir_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();

                let content = match std::fs::read_to_string(&manifest_path) {
                    Ok(content) => content,
                    Err(e) => {
                        warn!(path = %manifest_path.display(), error = %e, "Skipping unreadable manifest");
                        continue;
                    }
                };

                match parse_manifest(&content, &dir_name) {
                    Ok(manifest) => {
                        debug!(
                            skill = %manifest.metadata.name,
                            actions = manifest.actions.len(),
                            "Loaded skill manifest"
                        );
                        loaded.push(self.bind(&manifest));
                    }
                    Err(e) => {
                        warn!(path = %manifest_path.display(), error = %e, "Skipping malformed manifest");
                    }
                }
            }
        }

        // Each module initializes once even when it backs several skills.
        let mut initialized: Vec<usize> = Vec::new();
        for skill in &loaded {
            if let Some(module) = &skill.module {
                let ptr = Arc::as_ptr(module) as *const () as usize;
                if !initialized.contains(&ptr) {
                    module.init().await?;
                    initialized.push(ptr);
                }
            }
        }

        info!(source = %self.name, skills = loaded.len(), "Local skill source initialized");
        *self.loaded.write().await = loaded;
        Ok(())
    }

    async fn get_tools(&self) -> Result<Vec<ToolDescriptor>, SkillError> {
        let loaded = self.loaded.read().await;
        Ok(loaded
            .iter()
            .flat_map(|skill| {
                skill
                    .manifest
                    .actions
                    .iter()
                    .map(|action| action.to_descriptor(&skill.manifest.metadata.name))
            })
            .collect())
    }

    async fn execute(
        &self,
        tool_name: &str,
        params: serde_json::Value,
        ctx: &SessionContext,
    ) -> Result<serde_json::Value, SkillError> {
        let (skill_name, action_name) = tool_name
            .split_once('.')
            .ok_or_else(|| SkillError::ToolNotFound(tool_name.to_string()))?;

        let handler = {
            let loaded = self.loaded.read().await;
            loaded
                .iter()
                .find(|s| s.manifest.metadata.name == skill_name)
                .and_then(|s| s.handlers.get(action_name).cloned())
                .ok_or_else(|| SkillError::ToolNotFound(tool_name.to_string()))?
        };

        handler(ctx.clone(), params).await
    }

    async fn destroy(&self) {
        let drained: Vec<LoadedSkill> = self.loaded.write().await.drain(..).collect();
        let mut destroyed: Vec<usize> = Vec::new();
        for skill in &drained {
            if let Some(module) = &skill.module {
                let ptr = Arc::as_ptr(module) as *const () as usize;
                if !destroyed.contains(&ptr) {
                    module.destroy().await;
                    destroyed.push(ptr);
                }
            }
        }
    }
}
