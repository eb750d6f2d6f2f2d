use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Transport protocol of a published port
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortProtocol {
    /// TCP (the runtime default)
    #[default]
    Tcp,
    /// UDP
    Udp,
}

/// A host-to-container port mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    /// Port on the host
    pub host: u16,
    /// Port inside the container
    pub container: u16,
    /// Transport protocol (TCP unless stated)
    #[serde(default)]
    pub protocol: PortProtocol,
}

impl PortMapping {
    /// Map the same port on both sides over TCP
    #[must_use]
    pub fn same(port: u16) -> Self {
        Self {
            host: port,
            container: port,
            protocol: PortProtocol::Tcp,
        }
    }

    /// Switch the mapping to UDP
    #[must_use]
    pub fn udp(mut self) -> Self {
        self.protocol = PortProtocol::Udp;
        self
    }

    /// The `-p` argument form the runtime expects
    #[must_use]
    pub fn publish_arg(&self) -> String {
        match self.protocol {
            PortProtocol::Tcp => format!("{}:{}", self.host, self.container),
            PortProtocol::Udp => format!("{}:{}/udp", self.host, self.container),
        }
    }
}

/// Parameters for starting a container
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Image tag to run
    pub image: String,
    /// Container name
    pub name: String,
    /// Port mappings
    pub ports: Vec<PortMapping>,
    /// Environment variables
    pub env: HashMap<String, String>,
    /// Env file passed through to the runtime, if any
    pub env_file: Option<PathBuf>,
}

impl RunRequest {
    /// Create a request for the given image and container name
    #[must_use]
    pub fn new(image: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            name: name.into(),
            ..Default::default()
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
}

/// Parameters for building an image
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Build context directory
    pub context_dir: PathBuf,
    /// Dockerfile path
    pub dockerfile: PathBuf,
    /// Tag for the built image
    pub tag: String,
    /// `--build-arg` values
    pub build_args: HashMap<String, String>,
}

impl BuildRequest {
    /// Create a request with no build args
    #[must_use]
    pub fn new(
        context_dir: impl Into<PathBuf>,
        dockerfile: impl Into<PathBuf>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            context_dir: context_dir.into(),
            dockerfile: dockerfile.into(),
            tag: tag.into(),
            build_args: HashMap::new(),
        }
    }

    /// Add a build arg
    #[must_use]
    pub fn with_build_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.build_args.insert(key.into(), value.into());
        self
    }
}

/// Variable names must be sane before they hit the CLI as `-e` or
/// `--build-arg` values
pub(crate) fn is_valid_env_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.chars().next().unwrap_or('0').is_ascii_digit()
}

/// Result of a successful image build
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// Image ID confirmed to exist after the build
    pub image_id: String,
    /// Combined build log
    pub log: String,
}

/// Observed container state, as reported by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    /// Container is running
    Running,
    /// Container exited
    Exited,
    /// Container is dead
    Dead,
    /// Container was created but not started
    Created,
    /// Container is restarting
    Restarting,
    /// Container is paused
    Paused,
    /// No container with that name exists
    NotFound,
    /// A state string this code does not recognize
    Unknown(String),
}

impl ContainerState {
    /// Parse a runtime status string
    #[must_use]
    pub fn parse(status: &str) -> Self {
        match status.trim() {
            "running" => Self::Running,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            "created" => Self::Created,
            "restarting" => Self::Restarting,
            "paused" => Self::Paused,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Whether the container has stopped in a way that counts as a crash
    #[must_use]
    pub fn is_crashed(&self) -> bool {
        matches!(self, Self::Exited | Self::Dead)
    }
}

/// Interface to a container runtime
#[async_trait::async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Check that the daemon is reachable
    async fn ping(&self) -> Result<()>;

    /// Build an image from a build context.
    ///
    /// A successful return means the build exited cleanly AND the image
    /// is visible to the runtime afterwards; a clean exit alone is not
    /// treated as success.
    async fn build_image(&self, request: &BuildRequest) -> Result<BuildOutput>;

    /// Start a container, returning its ID
    async fn run_container(&self, request: &RunRequest) -> Result<String>;

    /// Stop a container by name
    async fn stop_container(&self, name: &str) -> Result<()>;

    /// Start a previously stopped container by name
    async fn start_container(&self, name: &str) -> Result<()>;

    /// Restart a container by name
    async fn restart_container(&self, name: &str) -> Result<()>;

    /// Remove a container by name
    async fn remove_container(&self, name: &str) -> Result<()>;

    /// Fetch the last `tail` lines of a container's logs
    async fn logs(&self, name: &str, tail: usize) -> Result<String>;

    /// Inspect a container's state
    async fn status(&self, name: &str) -> Result<ContainerState>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_state_parsing() {
        assert_eq!(ContainerState::parse("running"), ContainerState::Running);
        assert_eq!(ContainerState::parse(" exited\n"), ContainerState::Exited);
        assert_eq!(
            ContainerState::parse("zombie"),
            ContainerState::Unknown("zombie".to_string())
        );
    }

    #[test]
    fn test_crashed_states() {
        assert!(ContainerState::Exited.is_crashed());
        assert!(ContainerState::Dead.is_crashed());
        assert!(!ContainerState::Running.is_crashed());
        assert!(!ContainerState::Restarting.is_crashed());
    }

    #[test]
    fn test_run_request_builder() {
        let request = RunRequest::new("app:latest", "app-1")
            .with_port(PortMapping::same(8080))
            .with_env("PORT", "8080");

        assert_eq!(request.ports, vec![PortMapping::same(8080)]);
        assert_eq!(request.ports[0].protocol, PortProtocol::Tcp);
        assert_eq!(request.env.get("PORT").map(String::as_str), Some("8080"));
    }

    #[test]
    fn test_publish_arg_carries_protocol() {
        assert_eq!(PortMapping::same(8080).publish_arg(), "8080:8080");
        let syslog = PortMapping {
            host: 514,
            container: 5514,
            protocol: PortProtocol::Udp,
        };
        assert_eq!(syslog.publish_arg(), "514:5514/udp");
        assert_eq!(PortMapping::same(53).udp().publish_arg(), "53:53/udp");
    }

    #[test]
    fn test_port_mapping_protocol_defaults_to_tcp_when_absent() {
        let mapping: PortMapping = serde_json::from_str(r#"{"host": 80, "container": 8080}"#).unwrap();
        assert_eq!(mapping.protocol, PortProtocol::Tcp);
        let udp: PortMapping =
            serde_json::from_str(r#"{"host": 53, "container": 53, "protocol": "udp"}"#).unwrap();
        assert_eq!(udp.protocol, PortProtocol::Udp);
    }

    #[test]
    fn test_build_request_builder() {
        let request = BuildRequest::new("/srv/app", "/srv/app/Dockerfile", "app:latest")
            .with_build_arg("NODE_VERSION", "20");

        assert_eq!(request.tag, "app:latest");
        assert_eq!(
            request.build_args.get("NODE_VERSION").map(String::as_str),
            Some("20")
        );
    }
}
