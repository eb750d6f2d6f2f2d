//! Pre-flight checks run before any build is attempted
//!
//! Each check reports pass/fail/warning independently; the caller decides
//! the gate. A failing check that has a known remedy carries a `fix`
//! suggestion the recovery agent can act on.

use super::runtime::ContainerRuntime;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Outcome of one pre-flight check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// Check has not run yet
    Pending,
    /// Check passed
    Passed,
    /// Check failed; deployment should not proceed
    Failed,
    /// Check could not give a definite answer; deployment may proceed
    Warning,
}

/// One named pre-flight check with its outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreFlightCheck {
    /// Check name
    pub name: String,
    /// Outcome
    pub status: CheckStatus,
    /// Human-readable detail
    pub message: String,
    /// Suggested remedy, if the check failed and one is known
    pub fix: Option<String>,
}

impl PreFlightCheck {
    fn passed(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Passed,
            message: message.into(),
            fix: None,
        }
    }

    fn failed(name: &str, message: impl Into<String>, fix: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Failed,
            message: message.into(),
            fix,
        }
    }

    fn warning(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.into(),
            fix: None,
        }
    }
}

/// Minimum free disk space before builds are considered unsafe
const MIN_FREE_DISK_KB: u64 = 1_048_576; // 1 GiB

/// Run all pre-flight checks for a deployment.
///
/// `ports` are the host ports the deployment wants to bind.
pub async fn run_pre_flight(
    runtime: &dyn ContainerRuntime,
    workspace: &Path,
    ports: &[u16],
) -> Result<Vec<PreFlightCheck>> {
    let mut checks = Vec::new();

    checks.push(check_daemon(runtime).await);
    checks.push(check_build_file(workspace));
    for port in ports {
        checks.push(check_port(*port));
    }
    checks.push(check_disk_space().await);

    debug!(
        total = checks.len(),
        failed = checks.iter().filter(|c| c.status == CheckStatus::Failed).count(),
        "pre-flight finished"
    );
    Ok(checks)
}

/// True when no check failed (warnings do not block)
#[must_use]
pub fn all_checks_passed(checks: &[PreFlightCheck]) -> bool {
    checks.iter().all(|c| c.status != CheckStatus::Failed)
}

async fn check_daemon(runtime: &dyn ContainerRuntime) -> PreFlightCheck {
    match runtime.ping().await {
        Ok(()) => PreFlightCheck::passed("docker_daemon", "container daemon is reachable"),
        Err(e) => PreFlightCheck::failed(
            "docker_daemon",
            format!("container daemon is not reachable: {e}"),
            Some("start the Docker daemon (e.g. `systemctl start docker` or open Docker Desktop)".to_string()),
        ),
    }
}

fn check_build_file(workspace: &Path) -> PreFlightCheck {
    const CANDIDATES: &[&str] = &[
        "Dockerfile",
        "dockerfile",
        "docker-compose.yml",
        "docker-compose.yaml",
        "compose.yml",
        "compose.yaml",
    ];

    for candidate in CANDIDATES {
        if workspace.join(candidate).is_file() {
            return PreFlightCheck::passed("build_file", format!("found {candidate}"));
        }
    }
    PreFlightCheck::failed(
        "build_file",
        "no Dockerfile or compose file in the project root",
        Some("generate a Dockerfile before deploying".to_string()),
    )
}

fn check_port(port: u16) -> PreFlightCheck {
    let name = format!("port_{port}");
    match std::net::TcpListener::bind(("0.0.0.0", port)) {
        Ok(listener) => {
            drop(listener);
            PreFlightCheck::passed(&name, format!("host port {port} is free"))
        }
        Err(e) => PreFlightCheck::failed(
            &name,
            format!("host port {port} is unavailable: {e}"),
            Some(format!("stop the process using port {port} or deploy on a different port")),
        ),
    }
}

async fn check_disk_space() -> PreFlightCheck {
    let output = tokio::process::Command::new("df")
        .args(["-Pk", "/"])
        .output()
        .await;

    let Ok(output) = output else {
        return PreFlightCheck::warning("disk_space", "could not run df to check free space");
    };
    let stdout = String::from_utf8_lossy(&output.stdout);

    // POSIX df: second line, fourth column is available KB
    let available_kb = stdout
        .lines()
        .nth(1)
        .and_then(|line| line.split_whitespace().nth(3))
        .and_then(|field| field.parse::<u64>().ok());

    match available_kb {
        Some(kb) if kb >= MIN_FREE_DISK_KB => {
            PreFlightCheck::passed("disk_space", format!("{} MiB free", kb / 1024))
        }
        Some(kb) => PreFlightCheck::failed(
            "disk_space",
            format!("only {} MiB free, below the safe build threshold", kb / 1024),
            Some("free disk space (e.g. `docker system prune`)".to_string()),
        ),
        None => PreFlightCheck::warning("disk_space", "could not parse df output"),
    }
}
