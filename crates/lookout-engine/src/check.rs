//! Check definitions and the module contract.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lookout_core::{
    CheckDefinition, CheckOutcome, ChecksFile, ConfigError, ConfigResult, ParamSchema, Params,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::fetch::Fetcher;
use crate::limiter::ConcurrencyLimiter;
use crate::parallel::ParallelExecutor;

/// Shared resources handed to every check body.
#[derive(Debug, Clone)]
pub struct CheckContext {
    pub fetcher: Fetcher,
    /// Budget for parallel units of work inside a check.
    pub workers: ConcurrencyLimiter,
    pub github_token: Option<String>,
}

impl CheckContext {
    pub fn parallel(&self) -> ParallelExecutor {
        ParallelExecutor::new(self.workers.clone())
    }
}

/// The implementation behind a check.
///
/// A module declares its parameters up front; configuration is cast and
/// validated against [`CheckModule::parameters`] before `run` ever sees it.
#[async_trait]
pub trait CheckModule: Send + Sync + 'static {
    /// Dotted module name referenced from the checks file.
    fn name(&self) -> &'static str;

    fn documentation(&self) -> &'static str {
        ""
    }

    fn parameters(&self) -> ParamSchema;

    /// Parameters shown in check info.
    fn exposed_parameters(&self) -> &'static [&'static str] {
        &[]
    }

    /// Parameters a request may override through its query string.
    fn url_parameters(&self) -> &'static [&'static str] {
        &[]
    }

    /// Path into `data` of the scalar to plot.
    fn default_plot(&self) -> Option<&'static str> {
        None
    }

    /// Execute the check. Application-level failures are `Ok` outcomes with
    /// `success: false`; errors are reserved for things that went wrong.
    async fn run(&self, ctx: &CheckContext, params: &Params) -> anyhow::Result<CheckOutcome>;
}

/// Maps module names to implementations.
#[derive(Default, Clone)]
pub struct ModuleRegistry {
    modules: BTreeMap<&'static str, Arc<dyn CheckModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: Arc<dyn CheckModule>) {
        self.modules.insert(module.name(), module);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CheckModule>> {
        self.modules.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.modules.keys().copied()
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.modules.keys()).finish()
    }
}

/// Public description of a check, as listed by the API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckInfo {
    pub name: String,
    pub project: String,
    pub module: String,
    pub tags: Vec<String>,
    pub description: String,
    pub documentation: String,
    pub url: String,
    /// Seconds.
    pub ttl: u64,
    pub parameters: Params,
    pub troubleshooting: Option<String>,
}

/// An immutable, validated check.
#[derive(Clone)]
pub struct Check {
    pub project: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub ttl: Duration,
    module: Arc<dyn CheckModule>,
    params: Params,
    plot: Option<String>,
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Parameters may hold credentials.
        f.debug_struct("Check")
            .field("project", &self.project)
            .field("name", &self.name)
            .field("module", &self.module.name())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl Check {
    /// Build a check, casting `definition.params` against the module schema.
    /// A zero or missing TTL falls back to `default_ttl`.
    pub fn new(
        project: &str,
        name: &str,
        definition: &CheckDefinition,
        module: Arc<dyn CheckModule>,
        default_ttl: Duration,
    ) -> ConfigResult<Self> {
        let params = module
            .parameters()
            .resolve(module.name(), &definition.params)?;
        let ttl = definition
            .ttl
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(default_ttl);
        Ok(Self {
            project: project.to_string(),
            name: name.to_string(),
            description: definition.description.clone(),
            tags: definition.tags.clone(),
            ttl,
            module,
            params,
            plot: definition.plot.clone(),
        })
    }

    /// `project/name`
    pub fn identifier(&self) -> String {
        format!("{}/{}", self.project, self.name)
    }

    pub fn module_name(&self) -> &'static str {
        self.module.name()
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Cache key: identity plus every effective parameter value.
    ///
    /// The key can contain secrets and must not leave the cache backend.
    pub fn cache_key(&self) -> String {
        format!("{}-{}", self.identifier(), self.params.fingerprint())
    }

    pub fn plot(&self) -> Option<&str> {
        self.plot.as_deref().or(self.module.default_plot())
    }

    pub fn exposed_params(&self) -> Params {
        self.params.subset(self.module.exposed_parameters())
    }

    /// Copy of this check with URL-overridable parameters replaced by the
    /// matching `query` values. Other query keys are ignored.
    pub fn override_params(&self, query: &BTreeMap<String, String>) -> ConfigResult<Check> {
        let schema = self.module.parameters();
        let mut params = self.params.clone();
        for name in self.module.url_parameters() {
            if let Some(raw) = query.get(*name) {
                let value = schema.cast(self.module.name(), name, &Value::String(raw.clone()))?;
                params.insert((*name).to_string(), value);
            }
        }
        Ok(Check {
            params,
            ..self.clone()
        })
    }

    pub fn info(&self, troubleshooting: Option<String>) -> CheckInfo {
        CheckInfo {
            name: self.name.clone(),
            project: self.project.clone(),
            module: self.module.name().to_string(),
            tags: self.tags.clone(),
            description: self.description.clone(),
            documentation: self.module.documentation().trim().to_string(),
            url: format!("/checks/{}/{}", self.project, self.name),
            ttl: self.ttl.as_secs(),
            parameters: self.exposed_params(),
            troubleshooting,
        }
    }

    pub async fn execute(&self, ctx: &CheckContext) -> anyhow::Result<CheckOutcome> {
        self.module.run(ctx, &self.params).await
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("unknown project '{0}'")]
    UnknownProject(String),

    #[error("unknown check '{project}/{name}'")]
    UnknownCheck { project: String, name: String },

    #[error("no check with tags '{0}'")]
    NoTagMatch(String),
}

/// Every configured check, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct Checks {
    all: Vec<Arc<Check>>,
}

impl Checks {
    pub fn new(all: Vec<Arc<Check>>) -> Self {
        Self { all }
    }

    pub fn from_config(
        file: &ChecksFile,
        registry: &ModuleRegistry,
        default_ttl: Duration,
    ) -> ConfigResult<Self> {
        let mut all = Vec::with_capacity(file.checks.len());
        for entry in &file.checks {
            let module = registry
                .get(&entry.definition.module)
                .ok_or_else(|| ConfigError::UnknownModule(entry.definition.module.clone()))?;
            let check = Check::new(
                &entry.project,
                &entry.name,
                &entry.definition,
                module,
                default_ttl,
            )?;
            all.push(Arc::new(check));
        }
        Ok(Self { all })
    }

    pub fn all(&self) -> &[Arc<Check>] {
        &self.all
    }

    /// Select checks by project, then by name or `+`-separated tags (all
    /// of which must match).
    pub fn lookup(
        &self,
        project: Option<&str>,
        name: Option<&str>,
        tags: Option<&str>,
    ) -> Result<Vec<Arc<Check>>, LookupError> {
        let mut selected: Vec<Arc<Check>> = self.all.clone();

        if let Some(project) = project {
            selected.retain(|c| c.project == project);
            if selected.is_empty() {
                return Err(LookupError::UnknownProject(project.to_string()));
            }
        }

        if let Some(name) = name {
            selected.retain(|c| c.name == name);
            if selected.is_empty() {
                return Err(LookupError::UnknownCheck {
                    project: project.unwrap_or_default().to_string(),
                    name: name.to_string(),
                });
            }
        } else if let Some(tags) = tags {
            let wanted: Vec<&str> = tags.split('+').filter(|t| !t.is_empty()).collect();
            selected.retain(|c| wanted.iter().all(|t| c.tags.iter().any(|have| have == t)));
            if selected.is_empty() {
                return Err(LookupError::NoTagMatch(tags.to_string()));
            }
        }

        Ok(selected)
    }
}
