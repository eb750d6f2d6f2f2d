use crate::error::{Error, Result};
use crate::registry::{RiskLevel, Tool, ToolCategory, ToolDefinition, ToolResult};
use crate::workspace::WorkspaceGuard;
use std::time::Instant;

/// Tool for listing a directory inside the workspace
pub struct ListDirectoryTool {
    definition: ToolDefinition,
    guard: WorkspaceGuard,
}

impl ListDirectoryTool {
    /// Create a new list tool
    #[must_use]
    pub fn new(guard: WorkspaceGuard) -> Self {
        let definition = ToolDefinition::new("list_directory", "List files and directories in the project")
            .with_category(ToolCategory::File)
            .with_risk_level(RiskLevel::Low)
            .with_parameters(serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Directory path relative to the project root (default: the root)",
                        "default": "."
                    }
                },
                "required": []
            }));

        Self { definition, guard }
    }
}

#[async_trait::async_trait]
impl Tool for ListDirectoryTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult> {
        let start = Instant::now();

        let path = input.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let resolved = self.guard.resolve_existing(path)?;
        if !resolved.is_dir() {
            return Err(Error::InvalidInput(format!("'{path}' is not a directory")));
        }

        let mut files = Vec::new();
        let mut directories = Vec::new();
        let mut entries = tokio::fs::read_dir(&resolved).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type().await?.is_dir() {
                directories.push(name);
            } else {
                files.push(name);
            }
        }
        files.sort();
        directories.sort();

        let total = files.len() + directories.len();
        Ok(ToolResult::success(
            serde_json::json!({
                "path": path,
                "files": files,
                "directories": directories,
                "total_items": total,
            }),
            start.elapsed().as_millis() as u64,
        ))
    }
}
