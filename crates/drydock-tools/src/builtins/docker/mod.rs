//! Container tools exposed to the model
//!
//! Thin wrappers over [`ContainerRuntime`] so the recovery agent can drive
//! builds, container lifecycle, logs, and pre-flight checks through the
//! same tool-calling path as file edits.

use crate::docker::{
    is_valid_env_name, run_pre_flight, BuildRequest, ContainerRuntime, ContainerState,
    PortMapping, PortProtocol, RunRequest,
};
use crate::error::{Error, Result};
use crate::registry::{RiskLevel, Tool, ToolCategory, ToolDefinition, ToolRegistry, ToolResult};
use crate::workspace::WorkspaceGuard;
use std::sync::Arc;
use std::time::Instant;

/// Register all container tools
pub fn register_docker_tools(
    registry: &mut ToolRegistry,
    runtime: Arc<dyn ContainerRuntime>,
    guard: WorkspaceGuard,
) {
    registry.register(Arc::new(PreFlightTool::new(runtime.clone(), guard.clone())));
    registry.register(Arc::new(BuildImageTool::new(runtime.clone(), guard.clone())));
    registry.register(Arc::new(RunContainerTool::new(runtime.clone())));
    registry.register(Arc::new(LifecycleTool::stop(runtime.clone())));
    registry.register(Arc::new(LifecycleTool::start(runtime.clone())));
    registry.register(Arc::new(LifecycleTool::restart(runtime.clone())));
    registry.register(Arc::new(LifecycleTool::remove(runtime.clone())));
    registry.register(Arc::new(ContainerLogsTool::new(runtime.clone())));
    registry.register(Arc::new(ContainerStatusTool::new(runtime)));
    registry.register(Arc::new(WriteEnvFileTool::new(guard)));
}

fn require_str<'a>(input: &'a serde_json::Value, field: &str) -> Result<&'a str> {
    input
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::InvalidInput(format!("missing required field: {field}")))
}

fn state_label(state: &ContainerState) -> String {
    match state {
        ContainerState::Running => "running".to_string(),
        ContainerState::Exited => "exited".to_string(),
        ContainerState::Dead => "dead".to_string(),
        ContainerState::Created => "created".to_string(),
        ContainerState::Restarting => "restarting".to_string(),
        ContainerState::Paused => "paused".to_string(),
        ContainerState::NotFound => "not_found".to_string(),
        ContainerState::Unknown(s) => s.clone(),
    }
}

/// Run pre-flight checks for the workspace
pub struct PreFlightTool {
    definition: ToolDefinition,
    runtime: Arc<dyn ContainerRuntime>,
    guard: WorkspaceGuard,
}

impl PreFlightTool {
    /// Create the tool
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>, guard: WorkspaceGuard) -> Self {
        let definition = ToolDefinition::new(
            "run_pre_flight_checks",
            "Check daemon availability, build files, ports, and disk space before deploying",
        )
        .with_category(ToolCategory::Deploy)
        .with_risk_level(RiskLevel::Low)
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "ports": {
                    "type": "array",
                    "items": {"type": "integer"},
                    "description": "Host ports the deployment will bind"
                }
            },
            "required": []
        }));
        Self {
            definition,
            runtime,
            guard,
        }
    }
}

#[async_trait::async_trait]
impl Tool for PreFlightTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult> {
        let start = Instant::now();
        let ports: Vec<u16> = input
            .get("ports")
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|p| p.as_u64())
                    .filter_map(|p| u16::try_from(p).ok())
                    .collect()
            })
            .unwrap_or_default();

        let checks = run_pre_flight(self.runtime.as_ref(), self.guard.root(), &ports).await?;
        let all_passed = crate::docker::all_checks_passed(&checks);

        Ok(ToolResult::success(
            serde_json::json!({
                "checks": checks,
                "all_passed": all_passed,
            }),
            start.elapsed().as_millis() as u64,
        ))
    }
}

/// Build an image from the workspace
pub struct BuildImageTool {
    definition: ToolDefinition,
    runtime: Arc<dyn ContainerRuntime>,
    guard: WorkspaceGuard,
}

impl BuildImageTool {
    /// Create the tool
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>, guard: WorkspaceGuard) -> Self {
        let definition = ToolDefinition::new(
            "build_docker_image",
            "Build a container image from the project's Dockerfile",
        )
        .with_category(ToolCategory::Docker)
        .with_risk_level(RiskLevel::High)
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "image_tag": {
                    "type": "string",
                    "description": "Image tag, e.g. 'myapp:latest'"
                },
                "dockerfile_path": {
                    "type": "string",
                    "description": "Dockerfile path relative to the project root",
                    "default": "Dockerfile"
                },
                "build_args": {
                    "type": "object",
                    "description": "Values passed as --build-arg KEY=VALUE",
                    "additionalProperties": {"type": "string"}
                }
            },
            "required": ["image_tag"]
        }));
        Self {
            definition,
            runtime,
            guard,
        }
    }
}

#[async_trait::async_trait]
impl Tool for BuildImageTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult> {
        let start = Instant::now();
        let tag = require_str(&input, "image_tag")?;
        let dockerfile = input
            .get("dockerfile_path")
            .and_then(|v| v.as_str())
            .unwrap_or("Dockerfile");
        let dockerfile_path = self.guard.resolve_existing(dockerfile)?;

        let mut request = BuildRequest::new(self.guard.root(), dockerfile_path, tag);
        if let Some(build_args) = input.get("build_args").and_then(|v| v.as_object()) {
            for (key, value) in build_args {
                if !is_valid_env_name(key) {
                    return Err(Error::InvalidInput(format!(
                        "invalid build arg name: '{key}'"
                    )));
                }
                let value = value.as_str().ok_or_else(|| {
                    Error::InvalidInput(format!("build arg '{key}' must be a string"))
                })?;
                request = request.with_build_arg(key, value);
            }
        }

        let output = self.runtime.build_image(&request).await?;

        // The full build log can be huge; keep the tail for diagnosis
        let log_tail: String = output
            .log
            .lines()
            .rev()
            .take(50)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join("\n");

        Ok(ToolResult::success(
            serde_json::json!({
                "image_id": output.image_id,
                "image_tag": tag,
                "log_tail": log_tail,
            }),
            start.elapsed().as_millis() as u64,
        ))
    }
}

/// Start a new container from an image
pub struct RunContainerTool {
    definition: ToolDefinition,
    runtime: Arc<dyn ContainerRuntime>,
}

impl RunContainerTool {
    /// Create the tool
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        let definition = ToolDefinition::new(
            "run_docker_container",
            "Run a detached container from an image with port and environment configuration",
        )
        .with_category(ToolCategory::Docker)
        .with_risk_level(RiskLevel::High)
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "image_tag": {"type": "string", "description": "Image tag to run"},
                "container_name": {"type": "string", "description": "Container name"},
                "ports": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "host": {"type": "integer"},
                            "container": {"type": "integer"},
                            "protocol": {
                                "type": "string",
                                "enum": ["tcp", "udp"],
                                "default": "tcp"
                            }
                        },
                        "required": ["host", "container"]
                    },
                    "description": "Port mappings"
                },
                "environment_variables": {
                    "type": "object",
                    "description": "Environment variables",
                    "additionalProperties": {"type": "string"}
                }
            },
            "required": ["image_tag", "container_name"]
        }));
        Self {
            definition,
            runtime,
        }
    }
}

#[async_trait::async_trait]
impl Tool for RunContainerTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult> {
        let start = Instant::now();
        let image = require_str(&input, "image_tag")?;
        let name = require_str(&input, "container_name")?;

        let mut request = RunRequest::new(image, name);
        if let Some(ports) = input.get("ports").and_then(|v| v.as_array()) {
            for port in ports {
                let host = port.get("host").and_then(|v| v.as_u64());
                let container = port.get("container").and_then(|v| v.as_u64());
                match (host, container) {
                    (Some(h), Some(c)) => {
                        let host = u16::try_from(h).map_err(|_| {
                            Error::InvalidInput(format!("invalid host port: {h}"))
                        })?;
                        let container = u16::try_from(c).map_err(|_| {
                            Error::InvalidInput(format!("invalid container port: {c}"))
                        })?;
                        let protocol = match port.get("protocol").and_then(|v| v.as_str()) {
                            None | Some("tcp") => PortProtocol::Tcp,
                            Some("udp") => PortProtocol::Udp,
                            Some(other) => {
                                return Err(Error::InvalidInput(format!(
                                    "protocol must be tcp or udp, got '{other}'"
                                )))
                            }
                        };
                        request = request.with_port(PortMapping {
                            host,
                            container,
                            protocol,
                        });
                    }
                    _ => {
                        return Err(Error::InvalidInput(
                            "each port mapping needs 'host' and 'container'".to_string(),
                        ))
                    }
                }
            }
        }
        if let Some(env) = input.get("environment_variables").and_then(|v| v.as_object()) {
            for (key, value) in env {
                let value = value
                    .as_str()
                    .ok_or_else(|| {
                        Error::InvalidInput(format!("env value for '{key}' must be a string"))
                    })?;
                request = request.with_env(key, value);
            }
        }

        let container_id = self.runtime.run_container(&request).await?;
        Ok(ToolResult::success(
            serde_json::json!({
                "container_id": container_id,
                "container_name": name,
            }),
            start.elapsed().as_millis() as u64,
        ))
    }
}

enum LifecycleAction {
    Stop,
    Start,
    Restart,
    Remove,
}

/// Stop, start, restart, or remove a container by name
pub struct LifecycleTool {
    definition: ToolDefinition,
    runtime: Arc<dyn ContainerRuntime>,
    action: LifecycleAction,
}

impl LifecycleTool {
    fn new(
        runtime: Arc<dyn ContainerRuntime>,
        action: LifecycleAction,
        name: &str,
        description: &str,
    ) -> Self {
        let definition = ToolDefinition::new(name, description)
            .with_category(ToolCategory::Docker)
            .with_risk_level(RiskLevel::High)
            .with_parameters(serde_json::json!({
                "type": "object",
                "properties": {
                    "container_id": {"type": "string", "description": "Container name or id"}
                },
                "required": ["container_id"]
            }));
        Self {
            definition,
            runtime,
            action,
        }
    }

    /// `stop_docker_container`
    #[must_use]
    pub fn stop(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self::new(
            runtime,
            LifecycleAction::Stop,
            "stop_docker_container",
            "Stop a running container",
        )
    }

    /// `start_docker_container`
    #[must_use]
    pub fn start(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self::new(
            runtime,
            LifecycleAction::Start,
            "start_docker_container",
            "Start a previously stopped container",
        )
    }

    /// `restart_docker_container`
    #[must_use]
    pub fn restart(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self::new(
            runtime,
            LifecycleAction::Restart,
            "restart_docker_container",
            "Restart a container",
        )
    }

    /// `remove_docker_container`
    #[must_use]
    pub fn remove(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self::new(
            runtime,
            LifecycleAction::Remove,
            "remove_docker_container",
            "Force-remove a container",
        )
    }
}

#[async_trait::async_trait]
impl Tool for LifecycleTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult> {
        let start = Instant::now();
        let name = require_str(&input, "container_id")?;

        match self.action {
            LifecycleAction::Stop => self.runtime.stop_container(name).await?,
            LifecycleAction::Start => self.runtime.start_container(name).await?,
            LifecycleAction::Restart => self.runtime.restart_container(name).await?,
            LifecycleAction::Remove => self.runtime.remove_container(name).await?,
        }

        Ok(ToolResult::success(
            serde_json::json!({"container_id": name}),
            start.elapsed().as_millis() as u64,
        ))
    }
}

/// Fetch container logs
pub struct ContainerLogsTool {
    definition: ToolDefinition,
    runtime: Arc<dyn ContainerRuntime>,
}

impl ContainerLogsTool {
    /// Create the tool
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        let definition = ToolDefinition::new(
            "get_container_logs",
            "Fetch the most recent log lines from a container",
        )
        .with_category(ToolCategory::Docker)
        .with_risk_level(RiskLevel::Low)
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "container_id": {"type": "string", "description": "Container name or id"},
                "tail": {
                    "type": "integer",
                    "description": "Number of trailing lines (default: 100)",
                    "default": 100
                }
            },
            "required": ["container_id"]
        }));
        Self {
            definition,
            runtime,
        }
    }
}

#[async_trait::async_trait]
impl Tool for ContainerLogsTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult> {
        let start = Instant::now();
        let name = require_str(&input, "container_id")?;
        let tail = input
            .get("tail")
            .and_then(|v| v.as_u64())
            .unwrap_or(100) as usize;

        let logs = self.runtime.logs(name, tail).await?;
        Ok(ToolResult::success(
            serde_json::json!({
                "container_id": name,
                "logs": logs,
            }),
            start.elapsed().as_millis() as u64,
        ))
    }
}

/// Inspect a container's state
pub struct ContainerStatusTool {
    definition: ToolDefinition,
    runtime: Arc<dyn ContainerRuntime>,
}

impl ContainerStatusTool {
    /// Create the tool
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        let definition = ToolDefinition::new(
            "get_container_status",
            "Get the current state of a container (running, exited, not found, ...)",
        )
        .with_category(ToolCategory::Docker)
        .with_risk_level(RiskLevel::Low)
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "container_id": {"type": "string", "description": "Container name or id"}
            },
            "required": ["container_id"]
        }));
        Self {
            definition,
            runtime,
        }
    }
}

#[async_trait::async_trait]
impl Tool for ContainerStatusTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult> {
        let start = Instant::now();
        let name = require_str(&input, "container_id")?;

        let state = self.runtime.status(name).await?;
        Ok(ToolResult::success(
            serde_json::json!({
                "container_id": name,
                "status": state_label(&state),
                "crashed": state.is_crashed(),
            }),
            start.elapsed().as_millis() as u64,
        ))
    }
}

/// Write a `.env` file into the workspace
pub struct WriteEnvFileTool {
    definition: ToolDefinition,
    guard: WorkspaceGuard,
}

impl WriteEnvFileTool {
    /// Create the tool
    #[must_use]
    pub fn new(guard: WorkspaceGuard) -> Self {
        let definition = ToolDefinition::new(
            "write_env_file",
            "Write environment variables to a .env file in the project",
        )
        .with_category(ToolCategory::File)
        .with_risk_level(RiskLevel::Medium)
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "env_vars": {
                    "type": "object",
                    "description": "Variable names and values",
                    "additionalProperties": {"type": "string"}
                },
                "file_name": {
                    "type": "string",
                    "description": "Target path relative to the project root",
                    "default": ".env"
                }
            },
            "required": ["env_vars"]
        }));
        Self { definition, guard }
    }
}

#[async_trait::async_trait]
impl Tool for WriteEnvFileTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult> {
        let start = Instant::now();
        let variables = input
            .get("env_vars")
            .and_then(|v| v.as_object())
            .ok_or_else(|| Error::InvalidInput("missing required field: env_vars".to_string()))?;
        let path = input
            .get("file_name")
            .and_then(|v| v.as_str())
            .unwrap_or(".env");

        let mut names: Vec<&String> = variables.keys().collect();
        names.sort();

        let mut content = String::new();
        for name in names {
            if !is_valid_env_name(name) {
                return Err(Error::InvalidInput(format!(
                    "invalid environment variable name: '{name}'"
                )));
            }
            let value = variables[name].as_str().ok_or_else(|| {
                Error::InvalidInput(format!("value for '{name}' must be a string"))
            })?;
            content.push_str(name);
            content.push('=');
            content.push_str(value);
            content.push('\n');
        }

        let resolved = self.guard.resolve(path)?;
        tokio::fs::write(&resolved, &content).await?;

        Ok(ToolResult::success(
            serde_json::json!({
                "file_name": path,
                "variables_written": variables.len(),
            }),
            start.elapsed().as_millis() as u64,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::BuildOutput;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records lifecycle calls and serves scripted state
    struct RecordingRuntime {
        calls: Mutex<Vec<String>>,
        state: ContainerState,
    }

    impl RecordingRuntime {
        fn new(state: ContainerState) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                state,
            }
        }
    }

    #[async_trait::async_trait]
    impl ContainerRuntime for RecordingRuntime {
        async fn ping(&self) -> Result<()> {
            Ok(())
        }

        async fn build_image(&self, request: &BuildRequest) -> Result<BuildOutput> {
            let mut args: Vec<String> = request
                .build_args
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            args.sort();
            self.calls
                .lock()
                .unwrap()
                .push(format!("build {} [{}]", request.tag, args.join(",")));
            Ok(BuildOutput {
                image_id: "sha256:abc".to_string(),
                log: "Step 1/2\nStep 2/2\n".to_string(),
            })
        }

        async fn run_container(&self, request: &RunRequest) -> Result<String> {
            let ports: Vec<String> = request.ports.iter().map(PortMapping::publish_arg).collect();
            self.calls.lock().unwrap().push(format!(
                "run {} as {} [{}]",
                request.image,
                request.name,
                ports.join(",")
            ));
            Ok("cid-1".to_string())
        }

        async fn stop_container(&self, name: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("stop {name}"));
            Ok(())
        }

        async fn start_container(&self, name: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("start {name}"));
            Ok(())
        }

        async fn restart_container(&self, name: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("restart {name}"));
            Ok(())
        }

        async fn remove_container(&self, name: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("remove {name}"));
            Ok(())
        }

        async fn logs(&self, _name: &str, _tail: usize) -> Result<String> {
            Ok("error: cannot import module 'requests'\n".to_string())
        }

        async fn status(&self, _name: &str) -> Result<ContainerState> {
            Ok(self.state.clone())
        }
    }

    #[tokio::test]
    async fn test_build_tool_reports_image_id() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM alpine").unwrap();
        let runtime = Arc::new(RecordingRuntime::new(ContainerState::Running));
        let tool = BuildImageTool::new(runtime, WorkspaceGuard::new(dir.path()).unwrap());

        let result = tool
            .execute(serde_json::json!({"image_tag": "app:latest"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output["image_id"], "sha256:abc");
    }

    #[tokio::test]
    async fn test_build_tool_requires_existing_dockerfile() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(RecordingRuntime::new(ContainerState::Running));
        let tool = BuildImageTool::new(runtime, WorkspaceGuard::new(dir.path()).unwrap());

        let err = tool
            .execute(serde_json::json!({"image_tag": "app:latest"}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_build_tool_passes_build_args_through() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "ARG NODE_VERSION\nFROM alpine").unwrap();
        let runtime = Arc::new(RecordingRuntime::new(ContainerState::Running));
        let tool = BuildImageTool::new(runtime.clone(), WorkspaceGuard::new(dir.path()).unwrap());

        tool.execute(serde_json::json!({
            "image_tag": "app:latest",
            "build_args": {"NODE_VERSION": "20", "APP_ENV": "production"}
        }))
        .await
        .unwrap();

        assert_eq!(
            runtime.calls.lock().unwrap().as_slice(),
            ["build app:latest [APP_ENV=production,NODE_VERSION=20]"]
        );
    }

    #[tokio::test]
    async fn test_build_tool_rejects_bad_build_arg_name() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM alpine").unwrap();
        let runtime = Arc::new(RecordingRuntime::new(ContainerState::Running));
        let tool = BuildImageTool::new(runtime, WorkspaceGuard::new(dir.path()).unwrap());

        let err = tool
            .execute(serde_json::json!({
                "image_tag": "app:latest",
                "build_args": {"BAD NAME": "x"}
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_run_container_tool_maps_ports_and_env() {
        let runtime = Arc::new(RecordingRuntime::new(ContainerState::Running));
        let tool = RunContainerTool::new(runtime.clone());

        let result = tool
            .execute(serde_json::json!({
                "image_tag": "app:latest",
                "container_name": "app-1",
                "ports": [
                    {"host": 8080, "container": 80},
                    {"host": 514, "container": 514, "protocol": "udp"}
                ],
                "environment_variables": {"PORT": "80"}
            }))
            .await
            .unwrap();
        assert_eq!(result.output["container_id"], "cid-1");
        assert_eq!(
            runtime.calls.lock().unwrap().as_slice(),
            ["run app:latest as app-1 [8080:80,514:514/udp]"]
        );
    }

    #[tokio::test]
    async fn test_run_container_tool_rejects_unknown_protocol() {
        let runtime = Arc::new(RecordingRuntime::new(ContainerState::Running));
        let tool = RunContainerTool::new(runtime);

        let err = tool
            .execute(serde_json::json!({
                "image_tag": "app:latest",
                "container_name": "app-1",
                "ports": [{"host": 80, "container": 80, "protocol": "sctp"}]
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_lifecycle_tools_dispatch() {
        let runtime = Arc::new(RecordingRuntime::new(ContainerState::Running));
        for (tool, expected) in [
            (LifecycleTool::stop(runtime.clone()), "stop app-1"),
            (LifecycleTool::restart(runtime.clone()), "restart app-1"),
            (LifecycleTool::remove(runtime.clone()), "remove app-1"),
        ] {
            tool.execute(serde_json::json!({"container_id": "app-1"}))
                .await
                .unwrap();
            assert!(runtime
                .calls
                .lock()
                .unwrap()
                .iter()
                .any(|c| c == expected));
        }
    }

    #[tokio::test]
    async fn test_status_tool_reports_crash() {
        let runtime = Arc::new(RecordingRuntime::new(ContainerState::Exited));
        let tool = ContainerStatusTool::new(runtime);

        let result = tool
            .execute(serde_json::json!({"container_id": "app-1"}))
            .await
            .unwrap();
        assert_eq!(result.output["status"], "exited");
        assert_eq!(result.output["crashed"], true);
    }

    #[tokio::test]
    async fn test_write_env_file_sorted_and_validated() {
        let dir = TempDir::new().unwrap();
        let tool = WriteEnvFileTool::new(WorkspaceGuard::new(dir.path()).unwrap());

        let mut vars = HashMap::new();
        vars.insert("PORT", "8080");
        vars.insert("DATABASE_URL", "postgres://localhost/app");
        tool.execute(serde_json::json!({"env_vars": vars}))
            .await
            .unwrap();

        let content = std::fs::read_to_string(dir.path().join(".env")).unwrap();
        assert_eq!(content, "DATABASE_URL=postgres://localhost/app\nPORT=8080\n");
    }

    #[tokio::test]
    async fn test_write_env_file_rejects_bad_name() {
        let dir = TempDir::new().unwrap();
        let tool = WriteEnvFileTool::new(WorkspaceGuard::new(dir.path()).unwrap());

        let err = tool
            .execute(serde_json::json!({"env_vars": {"BAD NAME": "x"}}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
