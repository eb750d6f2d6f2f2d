//! Built-in tools

pub mod docker;
pub mod file;
pub mod validate;

pub use docker::register_docker_tools;
pub use file::register_file_tools;
pub use validate::ValidateConfigTool;

use crate::docker::ContainerRuntime;
use crate::registry::ToolRegistry;
use crate::workspace::WorkspaceGuard;
use std::sync::Arc;

/// Register the full built-in tool set for a workspace
pub fn register_builtins(
    registry: &mut ToolRegistry,
    runtime: Arc<dyn ContainerRuntime>,
    guard: WorkspaceGuard,
) {
    file::register_file_tools(registry, guard.clone());
    docker::register_docker_tools(registry, runtime, guard.clone());
    registry.register(Arc::new(ValidateConfigTool::new(guard)));
}
