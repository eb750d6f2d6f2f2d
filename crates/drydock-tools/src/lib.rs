//! # drydock-tools
//!
//! Tool registry and execution engine for the drydock deployment engine:
//! - Registry: tool registration, discovery, and LLM-facing definitions
//! - Runner: tool execution with per-call timeouts
//! - Workspace: path guard confining file tools to the project directory
//! - Docker: the [`ContainerRuntime`] seam, the `docker` CLI
//!   implementation, and pre-flight checks
//! - Builtins: file, container, and validation tools

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod builtins;
pub mod docker;
pub mod error;
pub mod registry;
pub mod runner;
pub mod workspace;

pub use builtins::register_builtins;
pub use docker::{
    all_checks_passed, run_pre_flight, BuildOutput, BuildRequest, CheckStatus, ContainerRuntime,
    ContainerState, DockerCli, PortMapping, PortProtocol, PreFlightCheck, RunRequest,
};
pub use error::{Error, Result};
pub use registry::{RiskLevel, Tool, ToolCategory, ToolDefinition, ToolRegistry, ToolResult};
pub use runner::{RunnerConfig, ToolRunner};
pub use workspace::WorkspaceGuard;
