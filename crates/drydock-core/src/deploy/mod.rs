//! Deployment
//!
//! The state machine that drives one deployment attempt from pre-flight
//! through build, container start, and the running gate, plus the error
//! taxonomy everything downstream (recovery, progress events) consumes.

mod error;
mod machine;

pub use error::{DeploymentError, DeploymentErrorType, DeploymentStage};
pub use machine::{DeploymentMachine, DeploymentSpec, DeploymentStatus, HealthProbe, HttpProbe};
