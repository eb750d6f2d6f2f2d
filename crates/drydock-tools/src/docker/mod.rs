//! Container runtime
//!
//! The deployment engine talks to containers through the
//! [`ContainerRuntime`] trait; [`DockerCli`] is the production
//! implementation, shelling out to the `docker` binary. Keeping the trait
//! at this seam lets the deployment and recovery logic run against a fake
//! runtime in tests.

mod cli;
mod preflight;
mod runtime;

pub use cli::DockerCli;
pub(crate) use runtime::is_valid_env_name;
pub use preflight::{all_checks_passed, run_pre_flight, CheckStatus, PreFlightCheck};
pub use runtime::{
    BuildOutput, BuildRequest, ContainerRuntime, ContainerState, PortMapping, PortProtocol,
    RunRequest,
};
