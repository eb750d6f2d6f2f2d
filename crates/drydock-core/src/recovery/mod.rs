//! Recovery agent
//!
//! When a deployment fails, the failure is classified, packaged into agent
//! context, and handed to the tool-calling loop with a tool set that can
//! inspect the project, edit files, re-run pre-flight, and re-attempt the
//! deployment. Attempts are bounded; the session always ends in a terminal
//! status.

mod agent;
mod tools;

pub use agent::{RecoveryAgent, RecoveryConfig};
pub use tools::RecoveryShared;

use crate::deploy::DeploymentError;
use crate::transcript::Transcript;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a recovery session stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStatus {
    /// Session created, nothing run yet
    Pending,
    /// Failure context being assembled
    Analyzing,
    /// Agent is applying fixes
    Fixing,
    /// Deployment being re-attempted
    Retrying,
    /// Deployment is running
    Completed,
    /// Attempts exhausted or unfixable
    Failed,
    /// Cancelled by request
    Cancelled,
}

impl RecoveryStatus {
    /// Whether this status is final
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// How confident the agent is in a suggested fix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixConfidence {
    /// Near-certain
    High,
    /// Plausible
    Medium,
    /// Speculative
    Low,
}

/// What kind of action a fix is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixType {
    /// Edit a project file
    FileEdit,
    /// Set an environment variable
    EnvVar,
    /// Run a command
    Command,
    /// Change deployment configuration
    ConfigChange,
    /// Requires a human
    Manual,
}

/// A fix the agent proposes (applied or left for a human)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixSuggestion {
    /// What to do
    pub description: String,
    /// Confidence level
    pub confidence: FixConfidence,
    /// Kind of action
    pub fix_type: FixType,
    /// Structured details (file paths, variable names, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// A fix the agent actually applied during a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixResult {
    /// What was done
    pub description: String,
    /// Whether applying it succeeded
    pub success: bool,
}

/// One recovery session, from first failure to terminal status
#[derive(Debug)]
pub struct RecoverySession {
    /// Session identifier
    pub id: Uuid,
    /// Current status
    pub status: RecoveryStatus,
    /// Agent invocations so far; never exceeds `max_attempts`
    pub attempt_number: u32,
    /// Attempt bound
    pub max_attempts: u32,
    /// Fixes applied across all attempts
    pub fixes_applied: Vec<FixResult>,
    /// Suggestions left when the agent could not fix the failure itself
    pub suggestions: Vec<FixSuggestion>,
    /// Combined transcript of all agent invocations
    pub transcript: Transcript,
    /// The most recent classified failure
    pub last_error: Option<DeploymentError>,
}

impl RecoverySession {
    /// Create a fresh session
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: RecoveryStatus::Pending,
            attempt_number: 0,
            max_attempts,
            fixes_applied: Vec::new(),
            suggestions: Vec::new(),
            transcript: Transcript::new(),
            last_error: None,
        }
    }
}
