//! Deployment state machine
//!
//! Drives one deployment attempt: pre-flight, build, container start, and
//! the running gate. The machine never retries; a failure is classified
//! and handed back to the caller (normally the recovery agent).
//!
//! `deploying → running` is never automatic. Two independent checks must
//! pass after the container starts: the runtime must not report the
//! container as crashed, and an HTTP probe against the mapped port must
//! succeed. A clean `docker run` alone proves nothing about the
//! application inside.

use super::error::{classify, DeploymentError, DeploymentErrorType, DeploymentStage};
use crate::events::{ProgressEvent, ProgressSender};
use drydock_tools::{
    all_checks_passed, run_pre_flight, BuildRequest, ContainerRuntime, PortMapping,
    PreFlightCheck, RunRequest,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Where a deployment currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Created, nothing run yet
    Pending,
    /// Pre-flight checks running
    PreFlight,
    /// Image build in progress
    Building,
    /// Container starting and being verified
    Deploying,
    /// Both running-gate checks passed
    Running,
    /// Stopped by request
    Stopped,
    /// Failed; see the attached error
    Failed,
    /// Removed by request
    Terminated,
}

impl DeploymentStatus {
    /// String form used in events and logs
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PreFlight => "pre_flight",
            Self::Building => "building",
            Self::Deploying => "deploying",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
            Self::Terminated => "terminated",
        }
    }
}

/// Everything needed to run one deployment
#[derive(Debug, Clone)]
pub struct DeploymentSpec {
    /// Image tag to build
    pub image_tag: String,
    /// Container name
    pub container_name: String,
    /// Dockerfile path relative to the workspace
    pub dockerfile: String,
    /// Project workspace (build context)
    pub workspace: PathBuf,
    /// Port mappings
    pub ports: Vec<PortMapping>,
    /// Environment variables
    pub env: HashMap<String, String>,
    /// `--build-arg` values for the image build
    pub build_args: HashMap<String, String>,
    /// Path probed on the first mapped host port
    pub health_path: String,
    /// Grace period before the first crash/health inspection
    pub startup_wait: Duration,
    /// Total time the probe may take to pass
    pub health_timeout: Duration,
}

impl DeploymentSpec {
    /// Create a spec with defaults for the optional fields
    #[must_use]
    pub fn new(
        image_tag: impl Into<String>,
        container_name: impl Into<String>,
        workspace: impl Into<PathBuf>,
    ) -> Self {
        Self {
            image_tag: image_tag.into(),
            container_name: container_name.into(),
            dockerfile: "Dockerfile".to_string(),
            workspace: workspace.into(),
            ports: Vec::new(),
            env: HashMap::new(),
            build_args: HashMap::new(),
            health_path: "/".to_string(),
            startup_wait: Duration::from_secs(2),
            health_timeout: Duration::from_secs(30),
        }
    }

    /// Add a port mapping
    #[must_use]
    pub fn with_port(mut self, mapping: PortMapping) -> Self {
        self.ports.push(mapping);
        self
    }

    /// Add an environment variable
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add a build arg
    #[must_use]
    pub fn with_build_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.build_args.insert(key.into(), value.into());
        self
    }

    /// Override the startup/health timings
    #[must_use]
    pub fn with_timings(mut self, startup_wait: Duration, health_timeout: Duration) -> Self {
        self.startup_wait = startup_wait;
        self.health_timeout = health_timeout;
        self
    }
}

/// Reachability check against the deployed application
#[async_trait::async_trait]
pub trait HealthProbe: Send + Sync {
    /// One probe attempt; true means the application answered
    async fn check(&self, host_port: u16, path: &str) -> bool;
}

/// HTTP probe over the loopback interface.
///
/// Any HTTP response counts as reachable; a 500 from the application still
/// proves the process is up and listening.
pub struct HttpProbe {
    client: reqwest::Client,
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpProbe {
    /// Create a probe with a short per-attempt timeout
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(3))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait::async_trait]
impl HealthProbe for HttpProbe {
    async fn check(&self, host_port: u16, path: &str) -> bool {
        let url = format!("http://127.0.0.1:{host_port}{path}");
        self.client.get(&url).send().await.is_ok()
    }
}

/// The state machine for one deployment
pub struct DeploymentMachine {
    runtime: Arc<dyn ContainerRuntime>,
    probe: Arc<dyn HealthProbe>,
    progress: ProgressSender,
    status: DeploymentStatus,
}

impl DeploymentMachine {
    /// Create a machine over the given runtime and probe
    #[must_use]
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        probe: Arc<dyn HealthProbe>,
        progress: ProgressSender,
    ) -> Self {
        Self {
            runtime,
            probe,
            progress,
            status: DeploymentStatus::Pending,
        }
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> DeploymentStatus {
        self.status
    }

    fn set_status(&mut self, status: DeploymentStatus) {
        self.status = status;
        self.progress.emit(ProgressEvent::Status {
            message: status.as_str().to_string(),
        });
    }

    /// Run one full deployment attempt
    #[instrument(skip(self, spec), fields(container = %spec.container_name, image = %spec.image_tag))]
    pub async fn deploy(&mut self, spec: &DeploymentSpec) -> Result<(), DeploymentError> {
        self.run_pre_flight_stage(spec).await?;
        self.run_build_stage(spec).await?;
        self.run_deploy_stage(spec).await?;
        self.verify_running(spec).await?;

        self.set_status(DeploymentStatus::Running);
        info!(container = %spec.container_name, "deployment is running");
        Ok(())
    }

    /// Stop the deployed container
    pub async fn stop(&mut self, spec: &DeploymentSpec) -> Result<(), DeploymentError> {
        self.runtime
            .stop_container(&spec.container_name)
            .await
            .map_err(|e| DeploymentError::from_raw(DeploymentStage::Runtime, e.to_string()))?;
        self.set_status(DeploymentStatus::Stopped);
        Ok(())
    }

    /// Remove the deployed container
    pub async fn terminate(&mut self, spec: &DeploymentSpec) -> Result<(), DeploymentError> {
        self.runtime
            .remove_container(&spec.container_name)
            .await
            .map_err(|e| DeploymentError::from_raw(DeploymentStage::Runtime, e.to_string()))?;
        self.set_status(DeploymentStatus::Terminated);
        Ok(())
    }

    async fn run_pre_flight_stage(&mut self, spec: &DeploymentSpec) -> Result<(), DeploymentError> {
        self.set_status(DeploymentStatus::PreFlight);

        let ports: Vec<u16> = spec.ports.iter().map(|p| p.host).collect();
        let checks = run_pre_flight(self.runtime.as_ref(), &spec.workspace, &ports)
            .await
            .map_err(|e| {
                DeploymentError::explicit(
                    DeploymentErrorType::Unknown,
                    DeploymentStage::PreFlight,
                    e.to_string(),
                )
            })?;

        self.progress.emit(ProgressEvent::PreFlight {
            message: format!("{} checks completed", checks.len()),
            details: serde_json::to_value(&checks).ok(),
        });

        if all_checks_passed(&checks) {
            return Ok(());
        }

        let failed: Vec<&PreFlightCheck> = checks
            .iter()
            .filter(|c| c.status == drydock_tools::CheckStatus::Failed)
            .collect();
        let raw = failed
            .iter()
            .map(|c| format!("{}: {}", c.name, c.message))
            .collect::<Vec<_>>()
            .join("\n");
        let error_type = failed
            .first()
            .map(|c| Self::check_error_type(&c.name))
            .unwrap_or(DeploymentErrorType::Unknown);

        let mut error =
            DeploymentError::explicit(error_type, DeploymentStage::PreFlight, raw);
        for check in &failed {
            if let Some(fix) = &check.fix {
                error = error.with_context(format!("suggested fix: {fix}"));
            }
        }
        self.fail(error)
    }

    /// Map a failed pre-flight check to the taxonomy
    fn check_error_type(check_name: &str) -> DeploymentErrorType {
        if check_name == "docker_daemon" {
            DeploymentErrorType::DaemonUnavailable
        } else if check_name.starts_with("port_") {
            DeploymentErrorType::PortConflict
        } else if check_name == "disk_space" {
            DeploymentErrorType::DiskFull
        } else {
            DeploymentErrorType::Unknown
        }
    }

    async fn run_build_stage(&mut self, spec: &DeploymentSpec) -> Result<(), DeploymentError> {
        self.set_status(DeploymentStatus::Building);

        let dockerfile = spec.workspace.join(&spec.dockerfile);
        let mut request = BuildRequest::new(&spec.workspace, dockerfile, &spec.image_tag);
        request.build_args = spec.build_args.clone();
        match self.runtime.build_image(&request).await {
            Ok(output) => {
                for line in output.log.lines().filter(|l| !l.trim().is_empty()) {
                    self.progress.emit(ProgressEvent::Build {
                        message: line.to_string(),
                    });
                }
                info!(image_id = %output.image_id, "image built");
                Ok(())
            }
            Err(e) => {
                let raw = e.to_string();
                self.fail(DeploymentError::from_raw(DeploymentStage::Build, raw))
            }
        }
    }

    async fn run_deploy_stage(&mut self, spec: &DeploymentSpec) -> Result<(), DeploymentError> {
        self.set_status(DeploymentStatus::Deploying);

        // A stale container with the same name would make `docker run` fail
        if self
            .runtime
            .remove_container(&spec.container_name)
            .await
            .is_ok()
        {
            warn!(container = %spec.container_name, "removed stale container before deploy");
        }

        let mut request = RunRequest::new(&spec.image_tag, &spec.container_name);
        request.ports = spec.ports.clone();
        request.env = spec.env.clone();

        match self.runtime.run_container(&request).await {
            Ok(container_id) => {
                self.progress.emit(ProgressEvent::Deploy {
                    message: format!("container {container_id} started"),
                });
                Ok(())
            }
            Err(e) => self.fail(DeploymentError::from_raw(
                DeploymentStage::Deploy,
                e.to_string(),
            )),
        }
    }

    /// The running gate: crash inspection AND reachability probe
    async fn verify_running(&mut self, spec: &DeploymentSpec) -> Result<(), DeploymentError> {
        tokio::time::sleep(spec.startup_wait).await;

        let state = self
            .runtime
            .status(&spec.container_name)
            .await
            .map_err(|e| DeploymentError::from_raw(DeploymentStage::Runtime, e.to_string()))?;
        if state.is_crashed() {
            let logs = self
                .runtime
                .logs(&spec.container_name, 100)
                .await
                .unwrap_or_default();
            // Crash logs usually carry a more specific cause than "it died"
            let mut error = DeploymentError::from_raw(DeploymentStage::Runtime, logs.clone());
            if error.error_type == DeploymentErrorType::Unknown {
                error.error_type = DeploymentErrorType::StartupFailed;
                error.message = DeploymentErrorType::StartupFailed.summary().to_string();
            }
            for line in logs.lines().rev().take(20).collect::<Vec<_>>().into_iter().rev() {
                error = error.with_context(line.to_string());
            }
            return self.fail(error);
        }

        let Some(port) = spec.ports.first().map(|p| p.host) else {
            // Nothing mapped means nothing to probe
            return Ok(());
        };

        let deadline = tokio::time::Instant::now() + spec.health_timeout;
        loop {
            if self.probe.check(port, &spec.health_path).await {
                self.progress.emit(ProgressEvent::Deploy {
                    message: format!("application answered on port {port}"),
                });
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        let logs = self
            .runtime
            .logs(&spec.container_name, 100)
            .await
            .unwrap_or_default();
        let error = DeploymentError::explicit(
            DeploymentErrorType::HealthcheckFailed,
            DeploymentStage::Runtime,
            format!(
                "no HTTP response on port {port}{} within {}s",
                spec.health_path,
                spec.health_timeout.as_secs()
            ),
        )
        .with_context(logs);
        self.fail(error)
    }

    fn fail(&mut self, error: DeploymentError) -> Result<(), DeploymentError> {
        self.status = DeploymentStatus::Failed;
        self.progress.emit(ProgressEvent::Error {
            message: error.message.clone(),
            details: serde_json::to_value(&error).ok(),
        });
        self.progress.emit(ProgressEvent::Status {
            message: DeploymentStatus::Failed.as_str().to_string(),
        });
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drydock_tools::{BuildOutput, ContainerState};
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Scripted runtime covering the paths the machine exercises
    struct FakeRuntime {
        build_result: Option<String>, // None = ok, Some(raw) = failure text
        run_fails_with: Option<String>,
        state: ContainerState,
        logs: String,
        calls: Mutex<Vec<&'static str>>,
        last_build_args: Mutex<HashMap<String, String>>,
    }

    impl FakeRuntime {
        fn healthy() -> Self {
            Self {
                build_result: None,
                run_fails_with: None,
                state: ContainerState::Running,
                logs: String::new(),
                calls: Mutex::new(Vec::new()),
                last_build_args: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn ping(&self) -> drydock_tools::Result<()> {
            Ok(())
        }

        async fn build_image(
            &self,
            request: &BuildRequest,
        ) -> drydock_tools::Result<BuildOutput> {
            self.calls.lock().unwrap().push("build");
            *self.last_build_args.lock().unwrap() = request.build_args.clone();
            match &self.build_result {
                None => Ok(BuildOutput {
                    image_id: "sha256:ok".to_string(),
                    log: "Step 1/1 : FROM alpine\n".to_string(),
                }),
                Some(raw) => Err(drydock_tools::Error::Execution(raw.clone())),
            }
        }

        async fn run_container(&self, _request: &RunRequest) -> drydock_tools::Result<String> {
            self.calls.lock().unwrap().push("run");
            match &self.run_fails_with {
                None => Ok("cid".to_string()),
                Some(raw) => Err(drydock_tools::Error::Execution(raw.clone())),
            }
        }

        async fn stop_container(&self, _name: &str) -> drydock_tools::Result<()> {
            self.calls.lock().unwrap().push("stop");
            Ok(())
        }

        async fn start_container(&self, _name: &str) -> drydock_tools::Result<()> {
            Ok(())
        }

        async fn restart_container(&self, _name: &str) -> drydock_tools::Result<()> {
            Ok(())
        }

        async fn remove_container(&self, _name: &str) -> drydock_tools::Result<()> {
            self.calls.lock().unwrap().push("remove");
            Ok(())
        }

        async fn logs(&self, _name: &str, _tail: usize) -> drydock_tools::Result<String> {
            Ok(self.logs.clone())
        }

        async fn status(&self, _name: &str) -> drydock_tools::Result<ContainerState> {
            Ok(self.state.clone())
        }
    }

    struct FixedProbe(bool);

    #[async_trait::async_trait]
    impl HealthProbe for FixedProbe {
        async fn check(&self, _port: u16, _path: &str) -> bool {
            self.0
        }
    }

    /// An ephemeral port that is free right now, so the pre-flight port
    /// probe passes regardless of what else runs on the test host
    fn free_port() -> u16 {
        std::net::TcpListener::bind(("127.0.0.1", 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn fast_spec(workspace: &Path) -> DeploymentSpec {
        DeploymentSpec::new("app:latest", "app-1", workspace)
            .with_port(PortMapping::same(free_port()))
            .with_timings(Duration::from_millis(1), Duration::from_millis(10))
    }

    fn workspace_with_dockerfile() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM alpine\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_happy_path_reaches_running() {
        let dir = workspace_with_dockerfile();
        let runtime = Arc::new(FakeRuntime::healthy());
        let (progress, mut rx) = ProgressSender::channel();
        let mut machine =
            DeploymentMachine::new(runtime, Arc::new(FixedProbe(true)), progress);

        machine.deploy(&fast_spec(dir.path())).await.unwrap();
        assert_eq!(machine.status(), DeploymentStatus::Running);

        // Status events arrive in pipeline order
        let mut statuses = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ProgressEvent::Status { message } = event {
                statuses.push(message);
            }
        }
        assert_eq!(
            statuses,
            ["pre_flight", "building", "deploying", "running"]
        );
    }

    #[tokio::test]
    async fn test_crashed_container_never_reaches_running() {
        let dir = workspace_with_dockerfile();
        let runtime = Arc::new(FakeRuntime {
            state: ContainerState::Exited,
            logs: "ModuleNotFoundError: No module named 'flask'\n".to_string(),
            ..FakeRuntime::healthy()
        });
        let mut machine = DeploymentMachine::new(
            runtime,
            Arc::new(FixedProbe(true)),
            ProgressSender::disabled(),
        );

        let error = machine.deploy(&fast_spec(dir.path())).await.unwrap_err();
        assert_eq!(machine.status(), DeploymentStatus::Failed);
        // Crash logs classified to the specific cause
        assert_eq!(error.error_type, DeploymentErrorType::MissingModule);
        assert!(!error.context.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_app_is_healthcheck_failed() {
        let dir = workspace_with_dockerfile();
        let runtime = Arc::new(FakeRuntime::healthy());
        let mut machine = DeploymentMachine::new(
            runtime,
            Arc::new(FixedProbe(false)),
            ProgressSender::disabled(),
        );

        let error = machine.deploy(&fast_spec(dir.path())).await.unwrap_err();
        assert_eq!(error.error_type, DeploymentErrorType::HealthcheckFailed);
        assert_eq!(error.stage, DeploymentStage::Runtime);
        assert_eq!(machine.status(), DeploymentStatus::Failed);
    }

    #[tokio::test]
    async fn test_build_failure_is_classified_and_blocks_run() {
        let dir = workspace_with_dockerfile();
        let runtime = Arc::new(FakeRuntime {
            build_result: Some(
                "ERROR: No matching distribution found for flask==99".to_string(),
            ),
            ..FakeRuntime::healthy()
        });
        let runtime_ref = runtime.clone();
        let mut machine = DeploymentMachine::new(
            runtime,
            Arc::new(FixedProbe(true)),
            ProgressSender::disabled(),
        );

        let error = machine.deploy(&fast_spec(dir.path())).await.unwrap_err();
        assert_eq!(
            error.error_type,
            DeploymentErrorType::DependencyInstallFailed
        );
        assert_eq!(error.stage, DeploymentStage::Build);
        assert!(!runtime_ref.calls.lock().unwrap().contains(&"run"));
    }

    #[tokio::test]
    async fn test_build_args_reach_the_runtime() {
        let dir = workspace_with_dockerfile();
        let runtime = Arc::new(FakeRuntime::healthy());
        let runtime_ref = runtime.clone();
        let mut machine = DeploymentMachine::new(
            runtime,
            Arc::new(FixedProbe(true)),
            ProgressSender::disabled(),
        );

        let spec = fast_spec(dir.path()).with_build_arg("NODE_VERSION", "20");
        machine.deploy(&spec).await.unwrap();

        let args = runtime_ref.last_build_args.lock().unwrap();
        assert_eq!(args.get("NODE_VERSION").map(String::as_str), Some("20"));
    }

    #[tokio::test]
    async fn test_missing_build_file_fails_pre_flight() {
        let dir = TempDir::new().unwrap(); // no Dockerfile
        let runtime = Arc::new(FakeRuntime::healthy());
        let runtime_ref = runtime.clone();
        let mut machine = DeploymentMachine::new(
            runtime,
            Arc::new(FixedProbe(true)),
            ProgressSender::disabled(),
        );

        let spec = DeploymentSpec::new("app:latest", "app-1", dir.path())
            .with_timings(Duration::from_millis(1), Duration::from_millis(10));
        let error = machine.deploy(&spec).await.unwrap_err();
        assert_eq!(error.stage, DeploymentStage::PreFlight);
        assert!(!runtime_ref.calls.lock().unwrap().contains(&"build"));
    }

    #[tokio::test]
    async fn test_stop_and_terminate_transitions() {
        let dir = workspace_with_dockerfile();
        let runtime = Arc::new(FakeRuntime::healthy());
        let mut machine = DeploymentMachine::new(
            runtime,
            Arc::new(FixedProbe(true)),
            ProgressSender::disabled(),
        );

        let spec = fast_spec(dir.path());
        machine.deploy(&spec).await.unwrap();
        machine.stop(&spec).await.unwrap();
        assert_eq!(machine.status(), DeploymentStatus::Stopped);
        machine.terminate(&spec).await.unwrap();
        assert_eq!(machine.status(), DeploymentStatus::Terminated);
    }
}
