//! Workspace file tools
//!
//! Read, write, list, and search tools scoped to the project workspace
//! through a shared [`WorkspaceGuard`](crate::workspace::WorkspaceGuard).

mod list;
mod read;
mod search;
mod write;

pub use list::ListDirectoryTool;
pub use read::ReadFileTool;
pub use search::{GlobFindTool, GrepSearchTool};
pub use write::WriteFileTool;

use crate::registry::ToolRegistry;
use crate::workspace::WorkspaceGuard;
use std::sync::Arc;

/// Register all file tools scoped to the given workspace
pub fn register_file_tools(registry: &mut ToolRegistry, guard: WorkspaceGuard) {
    registry.register(Arc::new(ReadFileTool::new(guard.clone())));
    registry.register(Arc::new(WriteFileTool::new(guard.clone())));
    registry.register(Arc::new(ListDirectoryTool::new(guard.clone())));
    registry.register(Arc::new(GrepSearchTool::new(guard.clone())));
    registry.register(Arc::new(GlobFindTool::new(guard)));
}
