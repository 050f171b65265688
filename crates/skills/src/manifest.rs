//! SKILL.md manifest parsing.
//!
//! A manifest is a text file with a `---`-delimited YAML header holding
//! `{name, version, description, author?, dependencies?}` and a Markdown
//! body whose `## Actions` section enumerates `### <action>` blocks. The
//! first non-bullet line of a block is the action description; bullets
//! shaped `` - **参数**: `name` (type) - desc `` or `` - `name` (type) - desc ``
//! declare parameters. A parameter is required unless its description
//! contains the 可选 marker.

use serde::Deserialize;

use switchyard_core::error::SkillError;
use switchyard_core::skill::SkillMetadata;
use switchyard_core::tool::ToolDescriptor;

/// Marker flagging a parameter optional.
const OPTIONAL_MARKER: &str = "可选";

/// A parsed skill manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct SkillManifest {
    pub metadata: SkillMetadata,
    pub actions: Vec<ActionSpec>,
}

/// One action declared by a manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub ty: String,
    pub description: String,
    pub required: bool,
}

impl ActionSpec {
    /// Build the JSON-Schema-shaped descriptor advertised to the LLM.
    pub fn to_descriptor(&self, skill_name: &str) -> ToolDescriptor {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for param in &self.params {
            properties.insert(
                param.name.clone(),
                serde_json::json!({
                    "type": schema_type(&param.ty),
                    "description": param.description,
                }),
            );
            if param.required {
                required.push(serde_json::Value::String(param.name.clone()));
            }
        }

        ToolDescriptor {
            name: format!("{}.{}", skill_name, self.name),
            description: self.description.clone(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }
}

/// Map a manifest type token onto a JSON Schema type name.
fn schema_type(ty: &str) -> &str {
    match ty {
        "string" | "number" | "integer" | "boolean" | "object" | "array" => ty,
        _ => "string",
    }
}

/// YAML header deserialization target. Every field is optional; defaults
/// come from the directory name.
#[derive(Debug, Default, Deserialize)]
struct RawHeader {
    name: Option<String>,
    version: Option<String>,
    description: Option<String>,
    author: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
}

/// Parse a SKILL.md file. `dir_name` supplies the default skill name.
pub fn parse_manifest(content: &str, dir_name: &str) -> Result<SkillManifest, SkillError> {
    let (header, body) = split_frontmatter(content);
    let raw: RawHeader = match header {
        Some(text) => serde_yaml::from_str(text)
            .map_err(|e| SkillError::Manifest(format!("invalid header: {e}")))?,
        None => RawHeader::default(),
    };

    let metadata = SkillMetadata {
        name: raw.name.unwrap_or_else(|| dir_name.to_string()),
        version: raw.version.unwrap_or_else(|| "1.0.0".to_string()),
        description: raw.description.unwrap_or_default(),
        author: raw.author,
        dependencies: raw.dependencies,
    };

    Ok(SkillManifest {
        metadata,
        actions: parse_actions(body),
    })
}

/// Split a `---`-delimited header from the body.
///
/// Handles CRLF line endings and whitespace around delimiter lines. A file
/// without a header is all body.
fn split_frontmatter(content: &str) -> (Option<&str>, &str) {
    let trimmed = content.trim_start();
    let Some(after_open) = trimmed.strip_prefix("---") else {
        return (None, content);
    };
    let after_open = after_open.trim_start_matches(['\r', '\n']);

    let mut offset = 0;
    for line in after_open.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']).trim() == "---" {
            let header = after_open[..offset].trim_end();
            let body = &after_open[offset + line.len()..];
            return (Some(header), body.trim_start_matches(['\r', '\n']));
        }
        offset += line.len();
    }
    (None, content)
}

/// Parse the `## Actions` section into action specs.
fn parse_actions(body: &str) -> Vec<ActionSpec> {
    let mut actions = Vec::new();
    let mut in_actions = false;
    let mut current: Option<ActionSpec> = None;

    for line in body.lines() {
        let line = line.trim_end();

        if let Some(heading) = line.strip_prefix("## ") {
            if let Some(action) = current.take() {
                actions.push(action);
            }
            in_actions = heading.trim() == "Actions";
            continue;
        }

        if !in_actions {
            continue;
        }

        if let Some(name) = line.strip_prefix("### ") {
            if let Some(action) = current.take() {
                actions.push(action);
            }
            current = Some(ActionSpec {
                name: name.trim().to_string(),
                description: String::new(),
                params: Vec::new(),
            });
            continue;
        }

        let Some(action) = current.as_mut() else {
            continue;
        };

        let trimmed = line.trim_start();
        if let Some(bullet) = trimmed.strip_prefix("- ") {
            if let Some(param) = parse_param_line(bullet) {
                action.params.push(param);
            }
        } else if action.description.is_empty() && !trimmed.is_empty() {
            action.description = trimmed.to_string();
        }
    }

    if let Some(action) = current.take() {
        actions.push(action);
    }
    actions
}

/// Parse one parameter bullet (the leading `- ` already stripped).
///
/// Accepted shapes:
///   **参数**: `name` (type) - description
///   `name` (type) - description
fn parse_param_line(bullet: &str) -> Option<ParamSpec> {
    let mut rest = bullet.trim_start();
    if let Some(after_marker) = rest.strip_prefix("**参数**:") {
        rest = after_marker.trim_start();
    }

    let rest = rest.strip_prefix('`')?;
    let close = rest.find('`')?;
    let name = rest[..close].trim().to_string();
    if name.is_empty() {
        return None;
    }

    let rest = rest[close + 1..].trim_start();
    let rest = rest.strip_prefix('(')?;
    let close = rest.find(')')?;
    let ty = rest[..close].trim().to_string();

    let mut description = rest[close + 1..].trim_start();
    if let Some(after_dash) = description.strip_prefix('-') {
        description = after_dash.trim_start();
    }

    Some(ParamSpec {
        name,
        ty,
        description: description.to_string(),
        required: !description.contains(OPTIONAL_MARKER),
    })
}
