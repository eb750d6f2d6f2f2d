//! Runner - tool execution engine
//!
//! Resolves tools by name, enforces per-call timeouts, and converts tool
//! errors into failed results so the agent loop always gets something to
//! feed back to the model.

use crate::error::{Error, Result};
use crate::registry::{ToolRegistry, ToolResult};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

/// Configuration for the tool runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Default timeout for tool execution
    pub default_timeout: Duration,
    /// Maximum timeout allowed
    pub max_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(60),
            max_timeout: Duration::from_secs(600),
        }
    }
}

impl RunnerConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default timeout (clamped to the maximum)
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout.min(self.max_timeout);
        self
    }
}

/// Tool runner for executing tools with timeouts
pub struct ToolRunner {
    registry: Arc<ToolRegistry>,
    config: RunnerConfig,
}

impl ToolRunner {
    /// Create a new tool runner
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, config: RunnerConfig) -> Self {
        Self { registry, config }
    }

    /// The underlying registry
    #[must_use]
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Execute a tool by name.
    ///
    /// A tool-level failure (bad input, execution error, timeout) is
    /// returned as a failed [`ToolResult`] rather than an `Err`; only an
    /// unknown tool name is an error, since there is nothing to report
    /// a result for.
    #[instrument(skip(self, input), fields(tool = %name))]
    pub async fn execute(&self, name: &str, input: serde_json::Value) -> Result<ToolResult> {
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        if let Err(e) = tool.validate_input(&input) {
            warn!(tool = %name, error = %e, "input validation failed");
            return Ok(ToolResult::failure(e.to_string(), 0));
        }

        let start = Instant::now();
        let result = timeout(self.config.default_timeout, tool.execute(input)).await;
        let elapsed = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(result)) => {
                debug!(tool = %name, success = result.success, duration_ms = elapsed, "tool finished");
                Ok(result)
            }
            Ok(Err(e)) => {
                warn!(tool = %name, error = %e, "tool failed");
                Ok(ToolResult::failure(e.to_string(), elapsed))
            }
            Err(_) => {
                warn!(tool = %name, timeout_ms = self.config.default_timeout.as_millis() as u64, "tool timed out");
                Ok(ToolResult::failure(
                    Error::Timeout(self.config.default_timeout.as_millis() as u64).to_string(),
                    elapsed,
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Tool, ToolDefinition};

    struct SlowTool {
        definition: ToolDefinition,
    }

    #[async_trait::async_trait]
    impl Tool for SlowTool {
        fn definition(&self) -> &ToolDefinition {
            &self.definition
        }

        async fn execute(&self, _input: serde_json::Value) -> Result<ToolResult> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ToolResult::success(serde_json::Value::Null, 0))
        }
    }

    struct FailingTool {
        definition: ToolDefinition,
    }

    #[async_trait::async_trait]
    impl Tool for FailingTool {
        fn definition(&self) -> &ToolDefinition {
            &self.definition
        }

        async fn execute(&self, _input: serde_json::Value) -> Result<ToolResult> {
            Err(Error::Execution("boom".to_string()))
        }
    }

    fn runner_with(tool: Arc<dyn Tool>, timeout: Duration) -> ToolRunner {
        let mut registry = ToolRegistry::new();
        registry.register(tool);
        ToolRunner::new(
            Arc::new(registry),
            RunnerConfig::new().with_timeout(timeout),
        )
    }

    #[tokio::test]
    async fn test_unknown_tool_is_an_error() {
        let runner = ToolRunner::new(Arc::new(ToolRegistry::new()), RunnerConfig::default());
        let err = runner
            .execute("missing", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_timeout_becomes_failed_result() {
        let runner = runner_with(
            Arc::new(SlowTool {
                definition: ToolDefinition::new("slow", "Sleeps"),
            }),
            Duration::from_millis(20),
        );

        let result = runner.execute("slow", serde_json::json!({})).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timeout"));
    }

    #[tokio::test]
    async fn test_tool_error_becomes_failed_result() {
        let runner = runner_with(
            Arc::new(FailingTool {
                definition: ToolDefinition::new("failing", "Always fails"),
            }),
            Duration::from_secs(1),
        );

        let result = runner
            .execute("failing", serde_json::json!({}))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_invalid_input_becomes_failed_result() {
        let runner = runner_with(
            Arc::new(FailingTool {
                definition: ToolDefinition::new("failing", "Always fails"),
            }),
            Duration::from_secs(1),
        );

        let result = runner
            .execute("failing", serde_json::json!([1, 2, 3]))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("invalid input"));
    }
}
