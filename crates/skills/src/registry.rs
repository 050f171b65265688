//! Skill registry — aggregates tool descriptors from N sources and routes
//! invocations to the owning source.
//!
//! Registration is atomic: a replaced source is destroyed before the new
//! one becomes visible, and a source that fails `initialize` is never
//! installed. Lookups go through a `tool → source` cache invalidated on
//! any register/unregister.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use switchyard_core::error::SkillError;
use switchyard_core::session::SessionContext;
use switchyard_core::skill::SkillSource;
use switchyard_core::tool::ToolDescriptor;

/// The registry of active skill sources.
pub struct SkillRegistry {
    sources: RwLock<HashMap<String, Arc<dyn SkillSource>>>,
    route_cache: RwLock<HashMap<String, String>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(HashMap::new()),
            route_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Install a source under its name.
    ///
    /// An existing source with the same name is destroyed first; the
    /// destruction completes before the new source becomes visible. If the
    /// new source fails to initialize the error propagates and nothing is
    /// installed.
    pub async fn register_source(&self, source: Arc<dyn SkillSource>) -> Result<(), SkillError> {
        let name = source.name().to_string();

        let replaced = self.sources.write().await.remove(&name);
        if let Some(old) = replaced {
            info!(source = %name, "Destroying replaced skill source");
            self.route_cache.write().await.clear();
            old.destroy().await;
        }

        source.initialize().await?;

        self.sources.write().await.insert(name.clone(), source);
        self.route_cache.write().await.clear();
        info!(source = %name, "Skill source registered");
        Ok(())
    }

    /// Destroy and remove a source. Returns whether one was removed.
    pub async fn unregister_source(&self, name: &str) -> bool {
        let removed = self.sources.write().await.remove(name);
        match removed {
            Some(source) => {
                self.route_cache.write().await.clear();
                source.destroy().await;
                info!(source = %name, "Skill source unregistered");
                true
            }
            None => false,
        }
    }

    /// Names of the active sources.
    pub async fn source_names(&self) -> Vec<String> {
        self.sources.read().await.keys().cloned().collect()
    }

    /// The union of every source's advertised tools.
    ///
    /// A source whose `get_tools` fails is logged and contributes nothing
    /// to this call.
    pub async fn get_tool_descriptors(&self) -> Vec<ToolDescriptor> {
        let sources: Vec<(String, Arc<dyn SkillSource>)> = {
            let map = self.sources.read().await;
            map.iter().map(|(n, s)| (n.clone(), s.clone())).collect()
        };

        let mut descriptors = Vec::new();
        for (name, source) in sources {
            match source.get_tools().await {
                Ok(tools) => descriptors.extend(tools),
                Err(e) => warn!(source = %name, error = %e, "Source failed to list tools"),
            }
        }
        descriptors
    }

    /// Case-insensitive substring search over tool names and descriptions.
    pub async fn search_tools(&self, query: &str) -> Vec<ToolDescriptor> {
        let query = query.to_lowercase();
        self.get_tool_descriptors()
            .await
            .into_iter()
            .filter(|t| {
                t.name.to_lowercase().contains(&query)
                    || t.description.to_lowercase().contains(&query)
            })
            .collect()
    }

    /// Route an invocation to the source that advertises `tool_name`.
    pub async fn execute_action(
        &self,
        tool_name: &str,
        params: serde_json::Value,
        ctx: &SessionContext,
    ) -> Result<serde_json::Value, SkillError> {
        if let Some(source) = self.cached_source(tool_name).await {
            return source.execute(tool_name, params, ctx).await;
        }

        let sources: Vec<(String, Arc<dyn SkillSource>)> = {
            let map = self.sources.read().await;
            map.iter().map(|(n, s)| (n.clone(), s.clone())).collect()
        };

        for (name, source) in sources {
            let tools = match source.get_tools().await {
                Ok(tools) => tools,
                Err(e) => {
                    warn!(source = %name, error = %e, "Source failed to list tools during lookup");
                    continue;
                }
            };
            if tools.iter().any(|t| t.name == tool_name) {
                self.route_cache
                    .write()
                    .await
                    .insert(tool_name.to_string(), name.clone());
                debug!(tool = %tool_name, source = %name, "Routed tool invocation");
                return source.execute(tool_name, params, ctx).await;
            }
        }

        Err(SkillError::ToolNotFound(tool_name.to_string()))
    }

    /// Destroy every source. Called on process shutdown.
    pub async fn shutdown(&self) {
        let drained: Vec<Arc<dyn SkillSource>> =
            self.sources.write().await.drain().map(|(_, s)| s).collect();
        self.route_cache.write().await.clear();
        for source in drained {
            source.destroy().await;
        }
    }

    async fn cached_source(&self, tool_name: &str) -> Option<Arc<dyn SkillSource>> {
        let source_name = self.route_cache.read().await.get(tool_name).cloned()?;
        self.sources.read().await.get(&source_name).cloned()
    }
}

impl Default for SkillRegistry {
    fn default() -> Self {
        Self::new()
    }
}
