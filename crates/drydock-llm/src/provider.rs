//! Model provider capability trait
//!
//! One interface regardless of backend. HTTP-compatible backends get
//! `analyze_project` and `generate_deployment_config` for free through the
//! default methods (complete → extract → validate); the agentic backend
//! overrides them because it owns its own tool surface.

use crate::chat::{
    CompletionRequest, CompletionResponse, Message, ToolCompletionRequest, ToolCompletionResponse,
};
use crate::error::{Error, Result};
use crate::extract::Extractor;
use crate::schema::{
    analysis_fingerprint_keys, config_fingerprint_keys, DeploymentConfig, ProjectAnalysis,
};
use serde::{Deserialize, Serialize};

/// What the engine knows about a repository before analysis
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectContext {
    /// Project name
    pub project_name: String,
    /// Relative paths of files in the repository
    pub file_listing: Vec<String>,
    /// Selected manifest/config file contents, as (path, content) pairs
    pub manifests: Vec<(String, String)>,
}

impl ProjectContext {
    /// Create a context for a named project
    #[must_use]
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            ..Default::default()
        }
    }

    /// Add the repository file listing
    #[must_use]
    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.file_listing = files;
        self
    }

    /// Add a manifest excerpt
    #[must_use]
    pub fn with_manifest(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.manifests.push((path.into(), content.into()));
        self
    }
}

/// Request for deployment-config generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigRequest {
    /// The repository context
    pub context: ProjectContext,
    /// The prior analysis, if one was produced
    pub analysis: Option<serde_json::Value>,
    /// Preferred configuration kind ("dockerfile", "compose"), if any
    pub preferred_config_type: Option<String>,
}

/// Capability interface implemented by every backend.
///
/// Lifecycle contract: a provider is ready only after [`initialize`] has
/// passed a live connectivity check; until then every other call fails with
/// [`Error::NotReady`] rather than attempting and failing silently.
///
/// [`initialize`]: ModelProvider::initialize
#[async_trait::async_trait]
pub trait ModelProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Check if the provider supports externally supplied tools
    fn supports_tools(&self) -> bool;

    /// Whether [`initialize`](ModelProvider::initialize) has succeeded
    fn is_ready(&self) -> bool;

    /// Verify configuration and connectivity, leaving the provider ready
    async fn initialize(&self) -> Result<()>;

    /// Live connectivity check against the backend
    async fn test_connection(&self) -> Result<()>;

    /// Complete a conversation (text only)
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Complete a conversation with tools
    async fn complete_with_tools(
        &self,
        request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse>;

    /// Analyze a repository and return a validated analysis.
    ///
    /// Default implementation: one completion, structured-output extraction,
    /// then structural validation — a response that parses but is
    /// semantically incomplete is rejected.
    async fn analyze_project(&self, context: &ProjectContext) -> Result<ProjectAnalysis> {
        self.require_ready()?;

        let request = CompletionRequest::new("")
            .with_message(Message::system(prompts::ANALYSIS_SYSTEM))
            .with_message(Message::user(prompts::analysis_user(context)))
            .with_max_tokens(4096)
            .with_temperature(0.2);

        let response = self.complete(request).await?;
        if response.content.trim().is_empty() {
            return Err(Error::EmptyResponse);
        }

        let extraction = Extractor::new(analysis_fingerprint_keys()).extract(&response.content)?;
        let value = extraction.json.ok_or(Error::EmptyResponse)?;
        ProjectAnalysis::validate(value)
    }

    /// Generate deployment configuration files for a repository.
    async fn generate_deployment_config(&self, request: &ConfigRequest) -> Result<DeploymentConfig> {
        self.require_ready()?;

        let completion = CompletionRequest::new("")
            .with_message(Message::system(prompts::CONFIG_SYSTEM))
            .with_message(Message::user(prompts::config_user(request)))
            .with_max_tokens(8192)
            .with_temperature(0.2);

        let response = self.complete(completion).await?;
        if response.content.trim().is_empty() {
            return Err(Error::EmptyResponse);
        }

        let extraction = Extractor::new(config_fingerprint_keys()).extract(&response.content)?;
        let value = extraction.json.ok_or(Error::EmptyResponse)?;
        DeploymentConfig::validate(value)
    }

    /// Fail with [`Error::NotReady`] unless the provider is initialized
    fn require_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(Error::NotReady(format!(
                "provider '{}' has not been initialized; call initialize() first",
                self.name()
            )))
        }
    }
}

/// Prompt assembly for the default trait methods.
///
/// The exact wording is deliberately uninteresting; callers depend only on
/// the structural contract of the responses.
pub(crate) mod prompts {
    use super::{ConfigRequest, ProjectContext};
    use std::fmt::Write;

    pub const ANALYSIS_SYSTEM: &str = "You analyze source repositories for deployment. \
        Respond with a single JSON object containing: summary, frameworks, language, \
        projectType, projectStructure, dependencies, integrations, environmentVariables, \
        buildConfig, security, recommendations. No prose outside the JSON.";

    pub const CONFIG_SYSTEM: &str = "You produce deployment configuration for a repository. \
        Respond with a single JSON object containing configType and files, where each file \
        has a path and full content. No prose outside the JSON.";

    pub fn analysis_user(context: &ProjectContext) -> String {
        let mut prompt = format!("Project: {}\n\nFiles:\n", context.project_name);
        for file in context.file_listing.iter().take(500) {
            let _ = writeln!(prompt, "  {file}");
        }
        for (path, content) in &context.manifests {
            let _ = write!(prompt, "\n--- {path} ---\n{content}\n");
        }
        prompt
    }

    pub fn config_user(request: &ConfigRequest) -> String {
        let mut prompt = analysis_user(&request.context);
        if let Some(analysis) = &request.analysis {
            let _ = write!(
                prompt,
                "\nPrior analysis:\n{}\n",
                serde_json::to_string_pretty(analysis).unwrap_or_default()
            );
        }
        if let Some(kind) = &request.preferred_config_type {
            let _ = write!(prompt, "\nPreferred configuration type: {kind}\n");
        }
        prompt
    }
}
