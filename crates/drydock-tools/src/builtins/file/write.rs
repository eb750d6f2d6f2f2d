use crate::error::{Error, Result};
use crate::registry::{RiskLevel, Tool, ToolCategory, ToolDefinition, ToolResult};
use crate::workspace::WorkspaceGuard;
use std::time::Instant;
use tracing::debug;

/// Tool for writing a file inside the workspace
pub struct WriteFileTool {
    definition: ToolDefinition,
    guard: WorkspaceGuard,
}

impl WriteFileTool {
    /// Create a new write tool
    #[must_use]
    pub fn new(guard: WorkspaceGuard) -> Self {
        let definition = ToolDefinition::new(
            "write_file",
            "Create or overwrite a file in the project, creating parent directories as needed",
        )
        .with_category(ToolCategory::File)
        .with_risk_level(RiskLevel::Medium)
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path relative to the project root"
                },
                "content": {
                    "type": "string",
                    "description": "Full file content"
                }
            },
            "required": ["path", "content"]
        }));

        Self { definition, guard }
    }
}

#[async_trait::async_trait]
impl Tool for WriteFileTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult> {
        let start = Instant::now();

        let path = input
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::InvalidInput("missing required field: path".to_string()))?;
        let content = input
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::InvalidInput("missing required field: content".to_string()))?;

        let resolved = self.guard.resolve(path)?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&resolved, content)
            .await
            .map_err(|e| Error::Execution(format!("cannot write '{path}': {e}")))?;

        debug!(path = %path, size = content.len(), "wrote file");

        Ok(ToolResult::success(
            serde_json::json!({
                "path": path,
                "size": content.len(),
            }),
            start.elapsed().as_millis() as u64,
        ))
    }
}
