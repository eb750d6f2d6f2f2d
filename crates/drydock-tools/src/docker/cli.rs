use super::runtime::{
    is_valid_env_name, BuildOutput, BuildRequest, ContainerRuntime, ContainerState, RunRequest,
};
use crate::error::{Error, Result};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Container runtime backed by the `docker` CLI
pub struct DockerCli {
    binary: String,
    command_timeout: Duration,
    build_timeout: Duration,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCli {
    /// Create a runtime using `docker` from PATH
    #[must_use]
    pub fn new() -> Self {
        Self {
            binary: "docker".to_string(),
            command_timeout: Duration::from_secs(60),
            build_timeout: Duration::from_secs(600),
        }
    }

    /// Override the binary name (e.g. `podman`)
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Set the timeout for image builds
    #[must_use]
    pub fn with_build_timeout(mut self, timeout: Duration) -> Self {
        self.build_timeout = timeout;
        self
    }

    /// Run the CLI with the given args, returning (stdout, stderr)
    async fn run(&self, args: &[String], timeout: Duration) -> Result<(String, String)> {
        debug!(binary = %self.binary, args = ?args, "running container CLI");

        let output = tokio::time::timeout(
            timeout,
            tokio::process::Command::new(&self.binary)
                .args(args)
                .output(),
        )
        .await
        .map_err(|_| Error::Timeout(timeout.as_millis() as u64))?
        .map_err(|e| Error::Execution(format!("failed to run {}: {e}", self.binary)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            Ok((stdout, stderr))
        } else {
            Err(Error::Execution(format!(
                "{} {} failed: {}",
                self.binary,
                args.first().map(String::as_str).unwrap_or(""),
                if stderr.trim().is_empty() { &stdout } else { &stderr }
            )))
        }
    }

}

#[async_trait::async_trait]
impl ContainerRuntime for DockerCli {
    async fn ping(&self) -> Result<()> {
        self.run(&["info".to_string()], self.command_timeout)
            .await
            .map(|_| ())
            .map_err(|e| Error::Execution(format!("container daemon unavailable: {e}")))
    }

    #[instrument(skip(self, request), fields(tag = %request.tag))]
    async fn build_image(&self, request: &BuildRequest) -> Result<BuildOutput> {
        let mut args = vec![
            "build".to_string(),
            "-f".to_string(),
            request.dockerfile.to_string_lossy().to_string(),
            "-t".to_string(),
            request.tag.clone(),
        ];
        for (key, value) in &request.build_args {
            if is_valid_env_name(key) {
                args.push("--build-arg".to_string());
                args.push(format!("{key}={value}"));
            } else {
                warn!(key = %key, "skipping invalid build arg name");
            }
        }
        args.push(request.context_dir.to_string_lossy().to_string());
        let (stdout, stderr) = self.run(&args, self.build_timeout).await?;

        // A clean exit is not enough; the image must actually exist
        let (image_id, _) = self
            .run(
                &["images".to_string(), "-q".to_string(), request.tag.clone()],
                self.command_timeout,
            )
            .await?;
        let image_id = image_id.trim().to_string();
        if image_id.is_empty() {
            warn!(tag = %request.tag, "build exited cleanly but produced no image");
            return Err(Error::Execution(format!(
                "build of '{}' reported success but no image exists",
                request.tag
            )));
        }

        Ok(BuildOutput {
            image_id,
            log: format!("{stdout}{stderr}"),
        })
    }

    async fn run_container(&self, request: &RunRequest) -> Result<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            request.name.clone(),
        ];
        for port in &request.ports {
            args.push("-p".to_string());
            args.push(port.publish_arg());
        }
        for (key, value) in &request.env {
            if is_valid_env_name(key) {
                args.push("-e".to_string());
                args.push(format!("{key}={value}"));
            } else {
                warn!(key = %key, "skipping invalid environment variable name");
            }
        }
        if let Some(env_file) = &request.env_file {
            args.push("--env-file".to_string());
            args.push(env_file.to_string_lossy().to_string());
        }
        args.push(request.image.clone());

        let (stdout, _) = self.run(&args, self.command_timeout).await?;
        let container_id = stdout.trim().to_string();
        if container_id.is_empty() {
            return Err(Error::Execution(
                "runtime did not return a container id".to_string(),
            ));
        }
        Ok(container_id)
    }

    async fn stop_container(&self, name: &str) -> Result<()> {
        self.run(
            &["stop".to_string(), name.to_string()],
            self.command_timeout,
        )
        .await
        .map(|_| ())
    }

    async fn start_container(&self, name: &str) -> Result<()> {
        self.run(
            &["start".to_string(), name.to_string()],
            self.command_timeout,
        )
        .await
        .map(|_| ())
    }

    async fn restart_container(&self, name: &str) -> Result<()> {
        self.run(
            &["restart".to_string(), name.to_string()],
            self.command_timeout,
        )
        .await
        .map(|_| ())
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        self.run(
            &["rm".to_string(), "-f".to_string(), name.to_string()],
            self.command_timeout,
        )
        .await
        .map(|_| ())
    }

    async fn logs(&self, name: &str, tail: usize) -> Result<String> {
        let (stdout, stderr) = self
            .run(
                &[
                    "logs".to_string(),
                    "--tail".to_string(),
                    tail.to_string(),
                    name.to_string(),
                ],
                self.command_timeout,
            )
            .await?;
        // Container stdout and stderr both matter for diagnosis
        Ok(format!("{stdout}{stderr}"))
    }

    async fn status(&self, name: &str) -> Result<ContainerState> {
        let result = self
            .run(
                &[
                    "inspect".to_string(),
                    "--format".to_string(),
                    "{{.State.Status}}".to_string(),
                    name.to_string(),
                ],
                self.command_timeout,
            )
            .await;

        match result {
            Ok((stdout, _)) => Ok(ContainerState::parse(&stdout)),
            Err(Error::Execution(msg)) if msg.contains("No such") => {
                Ok(ContainerState::NotFound)
            }
            Err(e) => Err(e),
        }
    }
}
