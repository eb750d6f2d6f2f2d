//! Agent orchestration for drydock
//!
//! The pieces that turn a model provider and a tool set into a working
//! deployment agent: the tool-calling loop, the deployment state machine
//! with its error taxonomy, the recovery agent that drives bounded fix
//! attempts, and the progress event stream that surfaces all of it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod agent;
pub mod deploy;
pub mod error;
pub mod events;
pub mod recovery;
pub mod transcript;

pub use agent::{LoopOutcome, ToolLoop, ToolLoopConfig};
pub use deploy::{
    DeploymentError, DeploymentErrorType, DeploymentMachine, DeploymentSpec, DeploymentStage,
    DeploymentStatus, HealthProbe, HttpProbe,
};
pub use error::{Error, Result};
pub use events::{ProgressEvent, ProgressSender};
pub use recovery::{
    FixConfidence, FixResult, FixSuggestion, FixType, RecoveryAgent, RecoveryConfig,
    RecoverySession, RecoveryStatus,
};
pub use transcript::{AgentTurn, ToolCallRecord, ToolResultRecord, Transcript};
