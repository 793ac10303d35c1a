//! Checks file parser.
//!
//! The file holds one `[checks.<project>.<name>]` table per check. Any
//! string in it may reference environment variables as `${VAR}`; unset
//! variables expand to the empty string. Projects and checks keep the
//! order in which they appear in the file.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ConfigError, ConfigResult};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex"));

/// Configuration of one check, as written in the checks file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckDefinition {
    #[serde(default)]
    pub description: String,
    pub module: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Seconds; falls back to the process default when absent.
    pub ttl: Option<u64>,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
    pub plot: Option<String>,
}

/// A check definition with its position in the file.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckEntry {
    pub project: String,
    pub name: String,
    pub definition: CheckDefinition,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChecksFile {
    pub checks: Vec<CheckEntry>,
}

impl ChecksFile {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, |name| std::env::var(name).ok())
    }

    /// Parse file content, resolving `${VAR}` through `lookup`.
    pub fn parse(content: &str, lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let mut root: toml::Table = toml::from_str(content)?;
        let Some(checks) = root.remove("checks") else {
            return Ok(Self::default());
        };
        let toml::Value::Table(projects) = interpolate(checks, &lookup) else {
            return Err(ConfigError::InvalidCheck {
                check: "checks".to_string(),
                reason: "expected a table of projects".to_string(),
            });
        };

        let mut entries = Vec::new();
        for (project, checks) in projects {
            let toml::Value::Table(checks) = checks else {
                return Err(ConfigError::InvalidCheck {
                    check: project,
                    reason: "expected a table of checks".to_string(),
                });
            };
            for (name, value) in checks {
                let definition: CheckDefinition =
                    value.try_into().map_err(|e: toml::de::Error| ConfigError::InvalidCheck {
                        check: format!("{project}/{name}"),
                        reason: e.message().to_string(),
                    })?;
                entries.push(CheckEntry {
                    project: project.clone(),
                    name,
                    definition,
                });
            }
        }
        Ok(Self { checks: entries })
    }
}

fn interpolate(value: toml::Value, lookup: &impl Fn(&str) -> Option<String>) -> toml::Value {
    match value {
        toml::Value::String(s) => toml::Value::String(
            PLACEHOLDER
                .replace_all(&s, |caps: &regex::Captures<'_>| lookup(&caps[1]).unwrap_or_default())
                .into_owned(),
        ),
        toml::Value::Array(items) => {
            toml::Value::Array(items.into_iter().map(|v| interpolate(v, lookup)).collect())
        }
        toml::Value::Table(table) => toml::Value::Table(
            table
                .into_iter()
                .map(|(k, v)| (k, interpolate(v, lookup)))
                .collect(),
        ),
        other => other,
    }
}
