//! Deployment error taxonomy and log classifier
//!
//! Raw build/runtime output is matched against keyword signatures to get a
//! stable error type the recovery agent can reason about. Signatures are
//! ordered specific-first; anything unmatched falls back to a stage default
//! or `Unknown`, which routes to free-form agent reasoning instead of a
//! canned fix.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stage of the deployment pipeline in which a failure occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStage {
    /// Pre-flight checks
    PreFlight,
    /// Image build
    Build,
    /// Container start
    Deploy,
    /// After the container started
    Runtime,
}

/// Classified deployment failure type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentErrorType {
    /// Build failed for a reason with no more specific classification
    BuildFailed,
    /// Dockerfile could not be parsed
    DockerfileSyntax,
    /// Base image could not be pulled
    BaseImagePullFailed,
    /// Package installation inside the build failed
    DependencyInstallFailed,
    /// Source failed to compile during the build
    CompileError,
    /// Requested host port is taken
    PortConflict,
    /// `docker run` itself failed
    ContainerStartFailed,
    /// Container started and then crashed during startup
    StartupFailed,
    /// Process was killed for exceeding memory limits
    OomKilled,
    /// Application aborted over a missing environment variable
    MissingEnvVar,
    /// Application could not import a module or package
    MissingModule,
    /// Filesystem or daemon permission failure
    PermissionDenied,
    /// No space left on device
    DiskFull,
    /// Network failure while building or starting
    NetworkError,
    /// Container runs but the health probe never passed
    HealthcheckFailed,
    /// The container daemon is not reachable
    DaemonUnavailable,
    /// Nothing matched
    Unknown,
}

impl DeploymentErrorType {
    /// Short human-readable summary
    #[must_use]
    pub fn summary(&self) -> &'static str {
        match self {
            Self::BuildFailed => "image build failed",
            Self::DockerfileSyntax => "Dockerfile has a syntax error",
            Self::BaseImagePullFailed => "base image could not be pulled",
            Self::DependencyInstallFailed => "dependency installation failed",
            Self::CompileError => "source failed to compile",
            Self::PortConflict => "host port is already in use",
            Self::ContainerStartFailed => "container failed to start",
            Self::StartupFailed => "container crashed during startup",
            Self::OomKilled => "process was killed for exceeding memory",
            Self::MissingEnvVar => "a required environment variable is missing",
            Self::MissingModule => "a module or package could not be imported",
            Self::PermissionDenied => "permission denied",
            Self::DiskFull => "no space left on device",
            Self::NetworkError => "network failure",
            Self::HealthcheckFailed => "application never became reachable",
            Self::DaemonUnavailable => "container daemon is not reachable",
            Self::Unknown => "unclassified failure",
        }
    }
}

struct Signature {
    error_type: DeploymentErrorType,
    keywords: &'static [&'static str],
    min_matches: usize,
}

/// Ordered specific-first; the first signature reaching its minimum wins
const SIGNATURES: &[Signature] = &[
    Signature {
        error_type: DeploymentErrorType::DaemonUnavailable,
        keywords: &[
            "cannot connect to the docker daemon",
            "is the docker daemon running",
            "daemon unavailable",
            "docker.sock",
        ],
        min_matches: 1,
    },
    Signature {
        error_type: DeploymentErrorType::DiskFull,
        keywords: &["no space left on device", "disk quota exceeded", "enospc"],
        min_matches: 1,
    },
    Signature {
        error_type: DeploymentErrorType::OomKilled,
        keywords: &["oom-kill", "oomkilled", "out of memory", "exit code 137"],
        min_matches: 1,
    },
    Signature {
        error_type: DeploymentErrorType::PortConflict,
        keywords: &[
            "port is already allocated",
            "address already in use",
            "bind: address",
        ],
        min_matches: 1,
    },
    Signature {
        error_type: DeploymentErrorType::DockerfileSyntax,
        keywords: &[
            "dockerfile parse error",
            "unknown instruction",
            "no build stage in current context",
        ],
        min_matches: 1,
    },
    Signature {
        error_type: DeploymentErrorType::BaseImagePullFailed,
        keywords: &[
            "pull access denied",
            "manifest unknown",
            "manifest for",
            "repository does not exist",
            "failed to resolve source metadata",
        ],
        min_matches: 1,
    },
    Signature {
        error_type: DeploymentErrorType::MissingModule,
        keywords: &[
            "modulenotfounderror",
            "no module named",
            "cannot find module",
            "importerror",
            "package not found",
        ],
        min_matches: 1,
    },
    Signature {
        error_type: DeploymentErrorType::DependencyInstallFailed,
        keywords: &[
            "npm err",
            "could not find a version that satisfies",
            "no matching distribution found",
            "unable to locate package",
            "failed building wheel",
            "yarn install failed",
        ],
        min_matches: 1,
    },
    Signature {
        error_type: DeploymentErrorType::CompileError,
        keywords: &[
            "syntaxerror",
            "compilation failed",
            "compile error",
            "error ts",
            "cannot find symbol",
        ],
        min_matches: 1,
    },
    Signature {
        error_type: DeploymentErrorType::MissingEnvVar,
        keywords: &[
            "environment variable",
            "env var",
            "is not set",
            "missing required",
        ],
        min_matches: 2,
    },
    Signature {
        error_type: DeploymentErrorType::PermissionDenied,
        keywords: &["permission denied", "eacces", "operation not permitted"],
        min_matches: 1,
    },
    Signature {
        error_type: DeploymentErrorType::NetworkError,
        keywords: &[
            "connection refused",
            "network unreachable",
            "econnrefused",
            "etimedout",
            "temporary failure in name resolution",
            "tls handshake timeout",
        ],
        min_matches: 1,
    },
    // Generic build failure markers, after everything more specific
    Signature {
        error_type: DeploymentErrorType::BuildFailed,
        keywords: &[
            "executor failed running",
            "returned a non-zero code",
            "build failed",
            "process did not complete successfully",
        ],
        min_matches: 1,
    },
];

/// Classify raw process or log output.
///
/// Unmatched output falls back by stage: a build-stage failure is at least
/// a `BuildFailed`, a deploy-stage failure at least `ContainerStartFailed`,
/// a runtime failure at least `StartupFailed`. Pre-flight output with no
/// signature match stays `Unknown`.
#[must_use]
pub fn classify(raw: &str, stage: DeploymentStage) -> DeploymentErrorType {
    let lowered = raw.to_lowercase();
    for signature in SIGNATURES {
        let matched = signature
            .keywords
            .iter()
            .filter(|k| lowered.contains(**k))
            .count();
        if matched >= signature.min_matches {
            return signature.error_type;
        }
    }

    if lowered.trim().is_empty() {
        return DeploymentErrorType::Unknown;
    }
    match stage {
        DeploymentStage::Build => DeploymentErrorType::BuildFailed,
        DeploymentStage::Deploy => DeploymentErrorType::ContainerStartFailed,
        DeploymentStage::Runtime => DeploymentErrorType::StartupFailed,
        DeploymentStage::PreFlight => DeploymentErrorType::Unknown,
    }
}

/// A classified deployment failure
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{} ({stage:?}): {message}", .error_type.summary())]
pub struct DeploymentError {
    /// Classified type
    pub error_type: DeploymentErrorType,
    /// Stage in which the failure occurred
    pub stage: DeploymentStage,
    /// Human-readable message
    pub message: String,
    /// Raw output the classification was derived from
    pub raw_error: String,
    /// Extra context lines (crash logs, check results)
    pub context: Vec<String>,
}

impl DeploymentError {
    /// Classify raw output into a deployment error
    #[must_use]
    pub fn from_raw(stage: DeploymentStage, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let error_type = classify(&raw, stage);
        Self {
            error_type,
            stage,
            message: error_type.summary().to_string(),
            raw_error: raw,
            context: Vec::new(),
        }
    }

    /// Build an error with an explicit type (used for gate failures the
    /// machine detects directly rather than classifies from output)
    #[must_use]
    pub fn explicit(
        error_type: DeploymentErrorType,
        stage: DeploymentStage,
        raw: impl Into<String>,
    ) -> Self {
        Self {
            error_type,
            stage,
            message: error_type.summary().to_string(),
            raw_error: raw.into(),
            context: Vec::new(),
        }
    }

    /// Attach a context line
    #[must_use]
    pub fn with_context(mut self, line: impl Into<String>) -> Self {
        self.context.push(line.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specific_signatures_win_over_generic() {
        // "returned a non-zero code" alone is BuildFailed, but a pip
        // resolution failure in the same log is more specific
        let raw = "ERROR: No matching distribution found for flask==99\n\
                   The command '/bin/sh -c pip install' returned a non-zero code: 1";
        assert_eq!(
            classify(raw, DeploymentStage::Build),
            DeploymentErrorType::DependencyInstallFailed
        );
    }

    #[test]
    fn test_daemon_unavailable() {
        assert_eq!(
            classify(
                "Cannot connect to the Docker daemon at unix:///var/run/docker.sock",
                DeploymentStage::PreFlight
            ),
            DeploymentErrorType::DaemonUnavailable
        );
    }

    #[test]
    fn test_port_conflict() {
        assert_eq!(
            classify(
                "Error: driver failed programming external connectivity: Bind for 0.0.0.0:8080 failed: port is already allocated",
                DeploymentStage::Deploy
            ),
            DeploymentErrorType::PortConflict
        );
    }

    #[test]
    fn test_missing_module_at_runtime() {
        assert_eq!(
            classify(
                "Traceback (most recent call last):\nModuleNotFoundError: No module named 'requests'",
                DeploymentStage::Runtime
            ),
            DeploymentErrorType::MissingModule
        );
    }

    #[test]
    fn test_missing_env_var_needs_two_keywords() {
        // One keyword alone is too weak a signal
        assert_ne!(
            classify("value is not set", DeploymentStage::Runtime),
            DeploymentErrorType::MissingEnvVar
        );
        assert_eq!(
            classify(
                "Fatal: environment variable DATABASE_URL is not set",
                DeploymentStage::Runtime
            ),
            DeploymentErrorType::MissingEnvVar
        );
    }

    #[test]
    fn test_stage_fallbacks() {
        assert_eq!(
            classify("something odd happened", DeploymentStage::Build),
            DeploymentErrorType::BuildFailed
        );
        assert_eq!(
            classify("something odd happened", DeploymentStage::Deploy),
            DeploymentErrorType::ContainerStartFailed
        );
        assert_eq!(
            classify("something odd happened", DeploymentStage::Runtime),
            DeploymentErrorType::StartupFailed
        );
        assert_eq!(
            classify("something odd happened", DeploymentStage::PreFlight),
            DeploymentErrorType::Unknown
        );
    }

    #[test]
    fn test_empty_output_is_unknown() {
        assert_eq!(
            classify("  \n", DeploymentStage::Build),
            DeploymentErrorType::Unknown
        );
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_value(DeploymentErrorType::BaseImagePullFailed).unwrap();
        assert_eq!(json, "base_image_pull_failed");
        let json = serde_json::to_value(DeploymentStage::PreFlight).unwrap();
        assert_eq!(json, "pre_flight");
    }

    #[test]
    fn test_oom_from_exit_code() {
        assert_eq!(
            classify("container exited with exit code 137", DeploymentStage::Runtime),
            DeploymentErrorType::OomKilled
        );
    }
}
