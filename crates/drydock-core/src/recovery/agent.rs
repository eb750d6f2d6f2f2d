//! The recovery loop
//!
//! Outer loop around the deployment state machine: deploy, and on failure
//! hand the classified error plus crash logs to the agent with the
//! recovery tool set. One agent invocation is one attempt; attempts are
//! bounded and the session always ends terminal.

use super::tools::{register_recovery_tools, RecoveryShared};
use super::{FixResult, RecoverySession, RecoveryStatus};
use crate::agent::{ToolLoop, ToolLoopConfig};
use crate::deploy::{DeploymentError, DeploymentMachine, DeploymentSpec, HealthProbe};
use crate::events::{ProgressEvent, ProgressSender};
use drydock_llm::{Message, ModelProvider};
use drydock_tools::{
    register_builtins, ContainerRuntime, RunnerConfig, ToolRegistry, ToolRunner, WorkspaceGuard,
};
use std::fmt::Write as _;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

const RECOVERY_SYSTEM: &str = "You are a deployment recovery agent. A container \
    deployment has failed; the failure classification, raw error, and recent logs \
    follow. Inspect the project with the available tools, fix what you can, and \
    re-attempt the deployment with attempt_deployment. Use suggest_fix for steps \
    only a human can take, and finish with complete_session.";

/// How many trailing log lines go into the agent context
const CONTEXT_LOG_LINES: usize = 100;

/// Settings for a recovery agent
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Maximum agent invocations per session
    pub max_attempts: u32,
    /// Budgets for each agent invocation
    pub loop_config: ToolLoopConfig,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            loop_config: ToolLoopConfig::default(),
        }
    }
}

impl RecoveryConfig {
    /// Set the attempt bound
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the per-invocation loop budgets
    #[must_use]
    pub fn with_loop_config(mut self, loop_config: ToolLoopConfig) -> Self {
        self.loop_config = loop_config;
        self
    }
}

/// Deploys a project and recovers from failures with bounded agent attempts
pub struct RecoveryAgent {
    provider: Arc<dyn ModelProvider>,
    runtime: Arc<dyn ContainerRuntime>,
    probe: Arc<dyn HealthProbe>,
    config: RecoveryConfig,
    progress: ProgressSender,
}

impl RecoveryAgent {
    /// Create an agent
    #[must_use]
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        runtime: Arc<dyn ContainerRuntime>,
        probe: Arc<dyn HealthProbe>,
        config: RecoveryConfig,
        progress: ProgressSender,
    ) -> Self {
        Self {
            provider,
            runtime,
            probe,
            config,
            progress,
        }
    }

    /// Run a full session without external cancellation
    pub async fn run(&self, spec: &DeploymentSpec) -> RecoverySession {
        self.run_with_cancellation(spec, CancellationToken::new())
            .await
    }

    /// Run a full session; cancelling the token ends it between attempts
    #[instrument(skip(self, spec, cancel), fields(container = %spec.container_name))]
    pub async fn run_with_cancellation(
        &self,
        spec: &DeploymentSpec,
        cancel: CancellationToken,
    ) -> RecoverySession {
        let mut session = RecoverySession::new(self.config.max_attempts);

        match self.deploy_once(spec).await {
            Ok(()) => {
                session.status = RecoveryStatus::Completed;
                return session;
            }
            Err(error) => {
                warn!(error_type = ?error.error_type, "initial deployment failed");
                session.last_error = Some(error);
            }
        }

        while session.attempt_number < session.max_attempts {
            if cancel.is_cancelled() {
                session.status = RecoveryStatus::Cancelled;
                return session;
            }
            session.attempt_number += 1;
            session.status = RecoveryStatus::Analyzing;
            self.progress.emit(ProgressEvent::Status {
                message: format!(
                    "recovery attempt {} of {}",
                    session.attempt_number, session.max_attempts
                ),
            });

            let shared = RecoveryShared::new();
            let gave_up = self.run_agent_once(spec, &mut session, shared.clone()).await;
            session.suggestions.extend(shared.take_suggestions());

            match shared.deploy_succeeded() {
                Some(true) => {
                    session.status = RecoveryStatus::Completed;
                    info!(attempt = session.attempt_number, "recovery succeeded");
                    return session;
                }
                Some(false) => {
                    session.last_error = shared.take_deploy_error();
                }
                None if !gave_up => {
                    // The agent edited without re-deploying; verify its work
                    session.status = RecoveryStatus::Retrying;
                    match self.deploy_once(spec).await {
                        Ok(()) => {
                            session.status = RecoveryStatus::Completed;
                            return session;
                        }
                        Err(error) => session.last_error = Some(error),
                    }
                }
                None => {}
            }

            if gave_up {
                break;
            }
        }

        session.status = RecoveryStatus::Failed;
        if let Some(error) = &session.last_error {
            self.progress.emit(ProgressEvent::Error {
                message: format!(
                    "recovery exhausted after {} attempts: {}",
                    session.attempt_number, error.message
                ),
                details: serde_json::to_value(error).ok(),
            });
        }
        session
    }

    async fn deploy_once(&self, spec: &DeploymentSpec) -> Result<(), DeploymentError> {
        let mut machine = DeploymentMachine::new(
            self.runtime.clone(),
            self.probe.clone(),
            self.progress.clone(),
        );
        machine.deploy(spec).await
    }

    /// One agent invocation. Returns true when the agent explicitly gave
    /// up (`complete_session(success=false)`).
    async fn run_agent_once(
        &self,
        spec: &DeploymentSpec,
        session: &mut RecoverySession,
        shared: Arc<RecoveryShared>,
    ) -> bool {
        let Some(error) = session.last_error.clone() else {
            return false;
        };

        let registry = match self.build_registry(spec, shared.clone()) {
            Ok(registry) => registry,
            Err(e) => {
                warn!(error = %e, "could not build recovery tool set");
                return true;
            }
        };
        let runner = Arc::new(ToolRunner::new(Arc::new(registry), RunnerConfig::default()));
        let agent_loop = ToolLoop::new(
            self.provider.clone(),
            runner,
            self.config.loop_config.clone(),
            self.progress.clone(),
        );

        session.status = RecoveryStatus::Fixing;
        let context = self.build_context(spec, &error, session).await;
        let messages = vec![Message::system(RECOVERY_SYSTEM), Message::user(context)];

        match agent_loop.run(messages).await {
            Ok(outcome) => {
                Self::collect_fixes(session, &outcome.transcript);
                session.transcript.extend(outcome.transcript);
                if outcome.budget_exhausted {
                    // Attempt still counts; whatever was edited stays
                    warn!(
                        attempt = session.attempt_number,
                        "agent ran out of steps mid-fix"
                    );
                }
            }
            Err(e) => {
                warn!(attempt = session.attempt_number, error = %e, "agent invocation failed");
            }
        }

        shared.completion() == Some(false)
    }

    fn build_registry(
        &self,
        spec: &DeploymentSpec,
        shared: Arc<RecoveryShared>,
    ) -> drydock_tools::Result<ToolRegistry> {
        let guard = WorkspaceGuard::new(&spec.workspace)?;
        let mut registry = ToolRegistry::new();
        register_builtins(&mut registry, self.runtime.clone(), guard);
        register_recovery_tools(
            &mut registry,
            shared,
            self.runtime.clone(),
            self.probe.clone(),
            spec.clone(),
            self.progress.clone(),
        );
        Ok(registry)
    }

    async fn build_context(
        &self,
        spec: &DeploymentSpec,
        error: &DeploymentError,
        session: &RecoverySession,
    ) -> String {
        let mut context = String::new();
        let _ = writeln!(
            context,
            "Deployment of '{}' failed (attempt {} of {}).",
            spec.container_name, session.attempt_number, session.max_attempts
        );
        let _ = writeln!(
            context,
            "Classification: {:?} during {:?} — {}",
            error.error_type, error.stage, error.message
        );
        let _ = writeln!(context, "\nRaw error:\n{}", error.raw_error);
        if !error.context.is_empty() {
            let _ = writeln!(context, "\nAdditional context:");
            for line in &error.context {
                let _ = writeln!(context, "  {line}");
            }
        }

        let logs = self
            .runtime
            .logs(&spec.container_name, CONTEXT_LOG_LINES)
            .await
            .unwrap_or_default();
        if !logs.trim().is_empty() {
            let tail: Vec<&str> = logs.lines().rev().take(CONTEXT_LOG_LINES).collect();
            let _ = writeln!(context, "\nRecent container logs:");
            for line in tail.into_iter().rev() {
                let _ = writeln!(context, "  {line}");
            }
        }
        context
    }

    /// Derive applied-fix records from the file edits in a transcript
    fn collect_fixes(session: &mut RecoverySession, transcript: &crate::transcript::Transcript) {
        for turn in transcript.turns() {
            for result in &turn.tool_results {
                let call = &turn.tool_calls[result.tool_call_index];
                if call.name == "write_file" || call.name == "write_env_file" {
                    let target = call
                        .input
                        .get("path")
                        .or_else(|| call.input.get("file_name"))
                        .and_then(|v| v.as_str())
                        .unwrap_or(".env");
                    session.fixes_applied.push(FixResult {
                        description: format!("{} {}", call.name, target),
                        success: result.error.is_none(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drydock_llm::{
        CompletionRequest, CompletionResponse, ToolCall, ToolCompletionRequest,
        ToolCompletionResponse,
    };
    use drydock_tools::{BuildOutput, BuildRequest, ContainerState, PortMapping, RunRequest};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Runtime whose builds fail until `succeed_after` builds have run
    struct FlakyRuntime {
        builds: AtomicU32,
        succeed_after: u32,
    }

    impl FlakyRuntime {
        fn failing_forever() -> Self {
            Self {
                builds: AtomicU32::new(0),
                succeed_after: u32::MAX,
            }
        }

        fn healing_after(n: u32) -> Self {
            Self {
                builds: AtomicU32::new(0),
                succeed_after: n,
            }
        }
    }

    #[async_trait::async_trait]
    impl ContainerRuntime for FlakyRuntime {
        async fn ping(&self) -> drydock_tools::Result<()> {
            Ok(())
        }

        async fn build_image(
            &self,
            _request: &BuildRequest,
        ) -> drydock_tools::Result<BuildOutput> {
            let n = self.builds.fetch_add(1, Ordering::SeqCst) + 1;
            if n > self.succeed_after {
                Ok(BuildOutput {
                    image_id: "sha256:fixed".to_string(),
                    log: String::new(),
                })
            } else {
                Err(drydock_tools::Error::Execution(
                    "ERROR: No matching distribution found for flask==99".to_string(),
                ))
            }
        }

        async fn run_container(&self, _request: &RunRequest) -> drydock_tools::Result<String> {
            Ok("cid".to_string())
        }

        async fn stop_container(&self, _name: &str) -> drydock_tools::Result<()> {
            Ok(())
        }

        async fn start_container(&self, _name: &str) -> drydock_tools::Result<()> {
            Ok(())
        }

        async fn restart_container(&self, _name: &str) -> drydock_tools::Result<()> {
            Ok(())
        }

        async fn remove_container(&self, _name: &str) -> drydock_tools::Result<()> {
            Ok(())
        }

        async fn logs(&self, _name: &str, _tail: usize) -> drydock_tools::Result<String> {
            Ok("pip failed\n".to_string())
        }

        async fn status(&self, _name: &str) -> drydock_tools::Result<ContainerState> {
            Ok(ContainerState::Running)
        }
    }

    struct AlwaysHealthy;

    #[async_trait::async_trait]
    impl crate::deploy::HealthProbe for AlwaysHealthy {
        async fn check(&self, _port: u16, _path: &str) -> bool {
            true
        }
    }

    /// Provider replaying scripted turns; when the script runs out it
    /// answers without tools
    struct ScriptedProvider {
        turns: Mutex<Vec<ToolCompletionResponse>>,
    }

    impl ScriptedProvider {
        fn new(turns: Vec<ToolCompletionResponse>) -> Self {
            Self {
                turns: Mutex::new(turns),
            }
        }
    }

    fn call_tool(tool: &str, args: &str) -> ToolCompletionResponse {
        ToolCompletionResponse {
            content: None,
            tool_calls: vec![ToolCall {
                id: format!("call_{tool}"),
                name: tool.to_string(),
                arguments: args.to_string(),
            }],
            usage: None,
            finish_reason: Some("tool_calls".to_string()),
            model: "scripted".to_string(),
        }
    }

    fn text_only(text: &str) -> ToolCompletionResponse {
        ToolCompletionResponse {
            content: Some(text.to_string()),
            tool_calls: Vec::new(),
            usage: None,
            finish_reason: Some("stop".to_string()),
            model: "scripted".to_string(),
        }
    }

    #[async_trait::async_trait]
    impl ModelProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }
        fn supports_tools(&self) -> bool {
            true
        }
        fn is_ready(&self) -> bool {
            true
        }
        async fn initialize(&self) -> drydock_llm::Result<()> {
            Ok(())
        }
        async fn test_connection(&self) -> drydock_llm::Result<()> {
            Ok(())
        }
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> drydock_llm::Result<CompletionResponse> {
            unimplemented!()
        }
        async fn complete_with_tools(
            &self,
            _request: ToolCompletionRequest,
        ) -> drydock_llm::Result<ToolCompletionResponse> {
            let mut turns = self.turns.lock().unwrap();
            if turns.is_empty() {
                Ok(text_only("nothing more I can do"))
            } else {
                Ok(turns.remove(0))
            }
        }
    }

    fn workspace() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM alpine\n").unwrap();
        dir
    }

    fn spec(dir: &TempDir) -> DeploymentSpec {
        let port = std::net::TcpListener::bind(("127.0.0.1", 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        DeploymentSpec::new("app:latest", "app-1", dir.path())
            .with_port(PortMapping::same(port))
            .with_timings(Duration::from_millis(1), Duration::from_millis(10))
    }

    fn agent(
        provider: ScriptedProvider,
        runtime: Arc<FlakyRuntime>,
        max_attempts: u32,
    ) -> RecoveryAgent {
        RecoveryAgent::new(
            Arc::new(provider),
            runtime,
            Arc::new(AlwaysHealthy),
            RecoveryConfig::default().with_max_attempts(max_attempts),
            ProgressSender::disabled(),
        )
    }

    #[tokio::test]
    async fn test_clean_deploy_needs_no_recovery() {
        let dir = workspace();
        let runtime = Arc::new(FlakyRuntime::healing_after(0));
        let session = agent(ScriptedProvider::new(Vec::new()), runtime, 3)
            .run(&spec(&dir))
            .await;

        assert_eq!(session.status, RecoveryStatus::Completed);
        assert_eq!(session.attempt_number, 0);
    }

    #[tokio::test]
    async fn test_agent_redeploy_completes_session() {
        let dir = workspace();
        // First build (the initial deploy) fails; the agent's re-attempt
        // succeeds
        let runtime = Arc::new(FlakyRuntime::healing_after(1));
        let provider = ScriptedProvider::new(vec![
            call_tool("attempt_deployment", "{}"),
            text_only("deployment fixed"),
        ]);
        let session = agent(provider, runtime, 3).run(&spec(&dir)).await;

        assert_eq!(session.status, RecoveryStatus::Completed);
        assert_eq!(session.attempt_number, 1);
    }

    #[tokio::test]
    async fn test_unfixable_failure_is_bounded_and_terminal() {
        let dir = workspace();
        let runtime = Arc::new(FlakyRuntime::failing_forever());
        let session = agent(ScriptedProvider::new(Vec::new()), runtime.clone(), 2)
            .run(&spec(&dir))
            .await;

        assert_eq!(session.status, RecoveryStatus::Failed);
        assert_eq!(session.attempt_number, 2);
        assert!(session.status.is_terminal());
        let error = session.last_error.unwrap();
        assert_eq!(
            error.error_type,
            crate::deploy::DeploymentErrorType::DependencyInstallFailed
        );
    }

    #[tokio::test]
    async fn test_agent_giving_up_stops_early() {
        let dir = workspace();
        let runtime = Arc::new(FlakyRuntime::failing_forever());
        let provider = ScriptedProvider::new(vec![
            call_tool(
                "suggest_fix",
                r#"{"description": "pin flask to an existing version", "confidence": "high", "fix_type": "file_edit"}"#,
            ),
            call_tool("complete_session", r#"{"success": false}"#),
            text_only("done"),
        ]);
        let session = agent(provider, runtime, 5).run(&spec(&dir)).await;

        assert_eq!(session.status, RecoveryStatus::Failed);
        // Gave up on the first attempt instead of burning the budget
        assert_eq!(session.attempt_number, 1);
        assert_eq!(session.suggestions.len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_is_terminal() {
        let dir = workspace();
        let runtime = Arc::new(FlakyRuntime::failing_forever());
        let token = CancellationToken::new();
        token.cancel();

        let session = agent(ScriptedProvider::new(Vec::new()), runtime, 3)
            .run_with_cancellation(&spec(&dir), token)
            .await;
        assert_eq!(session.status, RecoveryStatus::Cancelled);
        assert_eq!(session.attempt_number, 0);
    }

    #[tokio::test]
    async fn test_file_edits_recorded_as_fixes() {
        let dir = workspace();
        let runtime = Arc::new(FlakyRuntime::healing_after(1));
        let provider = ScriptedProvider::new(vec![
            call_tool(
                "write_file",
                r#"{"path": "requirements.txt", "content": "flask==3.0.0\n"}"#,
            ),
            call_tool("attempt_deployment", "{}"),
            text_only("fixed"),
        ]);
        let session = agent(provider, runtime, 3).run(&spec(&dir)).await;

        assert_eq!(session.status, RecoveryStatus::Completed);
        assert_eq!(session.fixes_applied.len(), 1);
        assert!(session.fixes_applied[0].success);
        assert!(session.fixes_applied[0].description.contains("requirements.txt"));
    }
}
