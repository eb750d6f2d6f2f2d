//! Agentic CLI backend
//!
//! Some backends are full coding agents shipped as local CLIs: they carry
//! their own file and shell tools and run their own internal tool loop.
//! From drydock's side each invocation is a single prompt-in, text-out
//! exchange executed in the project workspace; the external tool registry
//! is never offered to this variant.

use crate::chat::{
    CompletionRequest, CompletionResponse, MessageRole, ToolCompletionRequest,
    ToolCompletionResponse,
};
use crate::error::{Error, Result};
use crate::extract::Extractor;
use crate::provider::{ConfigRequest, ModelProvider};
use crate::schema::{config_fingerprint_keys, DeploymentConfig};
use crate::util::sanitize_api_error;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Configuration for an agentic CLI backend
#[derive(Debug, Clone)]
pub struct AgenticCliConfig {
    /// Provider name used in logs and errors
    pub name: String,
    /// Binary to execute
    pub command: String,
    /// Arguments prepended to every invocation
    pub default_args: Vec<String>,
    /// Workspace the CLI runs in; its native tools are scoped here
    pub workspace: Option<PathBuf>,
    /// Environment variables for the child process
    pub env: HashMap<String, String>,
    /// Timeout per invocation; agentic runs are slow
    pub timeout: Duration,
}

impl AgenticCliConfig {
    /// Create a config for the given binary
    #[must_use]
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            default_args: Vec::new(),
            workspace: None,
            env: HashMap::new(),
            timeout: Duration::from_secs(1800),
        }
    }

    /// Set the workspace directory
    #[must_use]
    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    /// Add a default argument
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.default_args.push(arg.into());
        self
    }

    /// Set the invocation timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Provider backed by an agentic CLI with native tools
pub struct AgenticCliProvider {
    config: AgenticCliConfig,
    ready: AtomicBool,
}

impl AgenticCliProvider {
    /// Create a new provider
    #[must_use]
    pub fn new(config: AgenticCliConfig) -> Self {
        Self {
            config,
            ready: AtomicBool::new(false),
        }
    }

    /// Collapse a conversation into one prompt: system instructions first,
    /// then each user turn. The CLI has no conversation API.
    fn flatten_prompt(request: &CompletionRequest) -> String {
        let mut sections = Vec::new();
        for message in &request.messages {
            match message.role {
                MessageRole::System => sections.insert(0, message.content.clone()),
                MessageRole::User => sections.push(message.content.clone()),
                // Assistant/tool turns belong to the CLI's internal loop
                _ => {}
            }
        }
        sections.join("\n\n")
    }

    async fn run_cli(&self, prompt: &str) -> Result<String> {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.default_args);
        cmd.arg(prompt);
        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }
        if let Some(workspace) = &self.config.workspace {
            cmd.current_dir(workspace);
        }

        debug!(provider = %self.config.name, command = %self.config.command, "executing agentic CLI");

        let output = tokio::time::timeout(self.config.timeout, cmd.output())
            .await
            .map_err(|_| Error::Timeout(self.config.timeout.as_millis() as u64))?
            .map_err(|e| Error::Api(format!("failed to spawn '{}': {e}", self.config.command)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Api(sanitize_api_error(&stderr)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if stdout.trim().is_empty() {
            return Err(Error::EmptyResponse);
        }
        Ok(stdout)
    }
}

#[async_trait::async_trait]
impl ModelProvider for AgenticCliProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    /// The CLI owns a richer native tool surface; externally supplied tools
    /// are rejected rather than silently ignored.
    fn supports_tools(&self) -> bool {
        false
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn initialize(&self) -> Result<()> {
        self.test_connection().await?;
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn test_connection(&self) -> Result<()> {
        let found = Command::new("which")
            .arg(&self.config.command)
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false);

        if found {
            Ok(())
        } else {
            Err(Error::NotConfigured(format!(
                "agentic CLI '{}' not found on PATH",
                self.config.command
            )))
        }
    }

    #[instrument(skip(self, request))]
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.require_ready()?;

        let prompt = Self::flatten_prompt(&request);
        let content = self.run_cli(&prompt).await?;

        Ok(CompletionResponse {
            content,
            usage: None,
            finish_reason: Some("stop".to_string()),
            model: self.config.name.clone(),
        })
    }

    async fn complete_with_tools(
        &self,
        _request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse> {
        Err(Error::NoToolSupport(self.config.name.clone()))
    }

    /// The CLI writes configuration files with its native tools, then
    /// prints a JSON manifest of what it produced; that manifest is
    /// extracted and validated like any other model output.
    async fn generate_deployment_config(&self, request: &ConfigRequest) -> Result<DeploymentConfig> {
        self.require_ready()?;

        let mut prompt = String::from(
            "Generate deployment configuration for this repository. Write the files \
             directly into the workspace, then print a single JSON object with \
             configType and files (each file with its path and full content).\n\n",
        );
        prompt.push_str(&serde_json::to_string_pretty(&request.context).unwrap_or_default());
        if let Some(kind) = &request.preferred_config_type {
            prompt.push_str(&format!("\nPreferred configuration type: {kind}\n"));
        }

        let stdout = self.run_cli(&prompt).await?;
        let extraction = Extractor::new(config_fingerprint_keys()).extract(&stdout)?;
        let value = extraction.json.ok_or(Error::EmptyResponse)?;
        DeploymentConfig::validate(value)
    }
}
