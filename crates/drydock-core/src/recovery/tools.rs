//! Session-control and deployment tools for the recovery agent
//!
//! These sit alongside the file and container builtins in the recovery
//! tool set. They communicate with the outer loop through
//! [`RecoveryShared`] rather than return values, since the loop only sees
//! tool results as model-facing JSON.

use crate::deploy::{DeploymentError, DeploymentMachine, DeploymentSpec, HealthProbe};
use crate::events::{ProgressEvent, ProgressSender};
use crate::recovery::{FixConfidence, FixSuggestion, FixType};
use drydock_tools::{
    ContainerRuntime, Error as ToolError, Result as ToolResultT, RiskLevel, Tool, ToolCategory,
    ToolDefinition, ToolRegistry, ToolResult,
};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// State shared between the outer recovery loop and the agent's tools
#[derive(Debug, Default)]
pub struct RecoveryShared {
    /// Set by `complete_session`
    completion: Mutex<Option<bool>>,
    /// Outcome of the last in-session `attempt_deployment`
    last_deploy: Mutex<Option<Result<(), DeploymentError>>>,
    /// Suggestions collected via `suggest_fix`
    suggestions: Mutex<Vec<FixSuggestion>>,
}

impl RecoveryShared {
    /// Create empty shared state
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The agent's completion signal, if it gave one
    #[must_use]
    pub fn completion(&self) -> Option<bool> {
        *self.completion.lock().unwrap()
    }

    /// Whether an in-session deployment attempt succeeded
    #[must_use]
    pub fn deploy_succeeded(&self) -> Option<bool> {
        self.last_deploy.lock().unwrap().as_ref().map(Result::is_ok)
    }

    /// Take the last in-session deployment error, if any
    #[must_use]
    pub fn take_deploy_error(&self) -> Option<DeploymentError> {
        match self.last_deploy.lock().unwrap().as_ref() {
            Some(Err(e)) => Some(e.clone()),
            _ => None,
        }
    }

    /// Drain collected suggestions
    #[must_use]
    pub fn take_suggestions(&self) -> Vec<FixSuggestion> {
        std::mem::take(&mut self.suggestions.lock().unwrap())
    }
}

/// Register the session-control tools into a recovery registry
pub(crate) fn register_recovery_tools(
    registry: &mut ToolRegistry,
    shared: Arc<RecoveryShared>,
    runtime: Arc<dyn ContainerRuntime>,
    probe: Arc<dyn HealthProbe>,
    spec: DeploymentSpec,
    progress: ProgressSender,
) {
    registry.register(Arc::new(AttemptDeploymentTool {
        definition: ToolDefinition::new(
            "attempt_deployment",
            "Re-run the full deployment (pre-flight, build, start, verify) with the current project files",
        )
        .with_category(ToolCategory::Deploy)
        .with_risk_level(RiskLevel::High),
        shared: shared.clone(),
        runtime: runtime.clone(),
        probe: probe.clone(),
        spec: spec.clone(),
        progress: progress.clone(),
    }));
    registry.register(Arc::new(CheckHealthTool {
        definition: ToolDefinition::new(
            "check_health",
            "Probe the deployed application's HTTP endpoint once",
        )
        .with_category(ToolCategory::Deploy)
        .with_risk_level(RiskLevel::Low),
        probe,
        spec,
    }));
    registry.register(Arc::new(ReportProgressTool {
        definition: ToolDefinition::new(
            "report_progress",
            "Report what you are doing so the user can follow along",
        )
        .with_category(ToolCategory::Session)
        .with_risk_level(RiskLevel::Low)
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "message": {"type": "string", "description": "Short status update"}
            },
            "required": ["message"]
        })),
        progress,
    }));
    registry.register(Arc::new(SuggestFixTool {
        definition: ToolDefinition::new(
            "suggest_fix",
            "Record a fix suggestion, including manual steps you cannot perform yourself",
        )
        .with_category(ToolCategory::Session)
        .with_risk_level(RiskLevel::Low)
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "description": {"type": "string"},
                "confidence": {"type": "string", "enum": ["high", "medium", "low"]},
                "fix_type": {
                    "type": "string",
                    "enum": ["file_edit", "env_var", "command", "config_change", "manual"]
                },
                "details": {"type": "object"}
            },
            "required": ["description", "confidence", "fix_type"]
        })),
        shared: shared.clone(),
    }));
    registry.register(Arc::new(CompleteSessionTool {
        definition: ToolDefinition::new(
            "complete_session",
            "End the recovery session, stating whether the deployment was fixed",
        )
        .with_category(ToolCategory::Session)
        .with_risk_level(RiskLevel::Low)
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "success": {"type": "boolean", "description": "Whether the deployment now runs"},
                "summary": {"type": "string", "description": "What was done"}
            },
            "required": ["success"]
        })),
        shared,
    }));
}

struct AttemptDeploymentTool {
    definition: ToolDefinition,
    shared: Arc<RecoveryShared>,
    runtime: Arc<dyn ContainerRuntime>,
    probe: Arc<dyn HealthProbe>,
    spec: DeploymentSpec,
    progress: ProgressSender,
}

#[async_trait::async_trait]
impl Tool for AttemptDeploymentTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, _input: serde_json::Value) -> ToolResultT<ToolResult> {
        let start = Instant::now();
        let mut machine = DeploymentMachine::new(
            self.runtime.clone(),
            self.probe.clone(),
            self.progress.clone(),
        );
        let outcome = machine.deploy(&self.spec).await;
        let duration = start.elapsed().as_millis() as u64;

        let result = match &outcome {
            Ok(()) => ToolResult::success(
                serde_json::json!({"status": "running"}),
                duration,
            ),
            Err(e) => ToolResult::failure(e.to_string(), duration),
        };
        *self.shared.last_deploy.lock().unwrap() = Some(outcome);
        Ok(result)
    }
}

struct CheckHealthTool {
    definition: ToolDefinition,
    probe: Arc<dyn HealthProbe>,
    spec: DeploymentSpec,
}

#[async_trait::async_trait]
impl Tool for CheckHealthTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, _input: serde_json::Value) -> ToolResultT<ToolResult> {
        let start = Instant::now();
        let Some(port) = self.spec.ports.first().map(|p| p.host) else {
            return Err(ToolError::InvalidInput(
                "deployment has no mapped ports to probe".to_string(),
            ));
        };
        let healthy = self.probe.check(port, &self.spec.health_path).await;
        Ok(ToolResult::success(
            serde_json::json!({"port": port, "healthy": healthy}),
            start.elapsed().as_millis() as u64,
        ))
    }
}

struct ReportProgressTool {
    definition: ToolDefinition,
    progress: ProgressSender,
}

#[async_trait::async_trait]
impl Tool for ReportProgressTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResultT<ToolResult> {
        let message = input
            .get("message")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidInput("missing required field: message".to_string()))?;
        self.progress.emit(ProgressEvent::Status {
            message: message.to_string(),
        });
        Ok(ToolResult::success(serde_json::json!({"reported": true}), 0))
    }
}

struct SuggestFixTool {
    definition: ToolDefinition,
    shared: Arc<RecoveryShared>,
}

#[async_trait::async_trait]
impl Tool for SuggestFixTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResultT<ToolResult> {
        let description = input
            .get("description")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ToolError::InvalidInput("missing required field: description".to_string())
            })?;
        let confidence = match input.get("confidence").and_then(|v| v.as_str()) {
            Some("high") => FixConfidence::High,
            Some("medium") => FixConfidence::Medium,
            Some("low") => FixConfidence::Low,
            other => {
                return Err(ToolError::InvalidInput(format!(
                    "confidence must be high|medium|low, got {other:?}"
                )))
            }
        };
        let fix_type = match input.get("fix_type").and_then(|v| v.as_str()) {
            Some("file_edit") => FixType::FileEdit,
            Some("env_var") => FixType::EnvVar,
            Some("command") => FixType::Command,
            Some("config_change") => FixType::ConfigChange,
            Some("manual") => FixType::Manual,
            other => {
                return Err(ToolError::InvalidInput(format!(
                    "unrecognized fix_type: {other:?}"
                )))
            }
        };

        self.shared.suggestions.lock().unwrap().push(FixSuggestion {
            description: description.to_string(),
            confidence,
            fix_type,
            details: input.get("details").cloned(),
        });
        Ok(ToolResult::success(serde_json::json!({"recorded": true}), 0))
    }
}

struct CompleteSessionTool {
    definition: ToolDefinition,
    shared: Arc<RecoveryShared>,
}

#[async_trait::async_trait]
impl Tool for CompleteSessionTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResultT<ToolResult> {
        let success = input
            .get("success")
            .and_then(|v| v.as_bool())
            .ok_or_else(|| ToolError::InvalidInput("missing required field: success".to_string()))?;
        *self.shared.completion.lock().unwrap() = Some(success);
        Ok(ToolResult::success(
            serde_json::json!({"session_complete": true, "success": success}),
            0,
        ))
    }
}
