use crate::error::{Error, Result};
use crate::registry::{RiskLevel, Tool, ToolCategory, ToolDefinition, ToolResult};
use crate::workspace::WorkspaceGuard;
use std::time::Instant;
use tracing::debug;

const MAX_READ_BYTES: u64 = 1_048_576;

/// Tool for reading a file inside the workspace
pub struct ReadFileTool {
    definition: ToolDefinition,
    guard: WorkspaceGuard,
}

impl ReadFileTool {
    /// Create a new read tool
    #[must_use]
    pub fn new(guard: WorkspaceGuard) -> Self {
        let definition = ToolDefinition::new("read_file", "Read the contents of a file in the project")
            .with_category(ToolCategory::File)
            .with_risk_level(RiskLevel::Low)
            .with_parameters(serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path relative to the project root"
                    }
                },
                "required": ["path"]
            }));

        Self { definition, guard }
    }
}

#[async_trait::async_trait]
impl Tool for ReadFileTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult> {
        let start = Instant::now();

        let path = input
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::InvalidInput("missing required field: path".to_string()))?;

        let resolved = self.guard.resolve_existing(path)?;
        if resolved.is_dir() {
            return Err(Error::InvalidInput(format!("'{path}' is a directory")));
        }

        let metadata = tokio::fs::metadata(&resolved).await?;
        if metadata.len() > MAX_READ_BYTES {
            return Err(Error::InvalidInput(format!(
                "'{path}' is {} bytes, larger than the {MAX_READ_BYTES} byte limit",
                metadata.len()
            )));
        }

        let content = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| Error::Execution(format!("cannot read '{path}': {e}")))?;

        debug!(path = %path, size = metadata.len(), "read file");

        Ok(ToolResult::success(
            serde_json::json!({
                "path": path,
                "content": content,
                "size": metadata.len(),
                "lines": content.lines().count(),
            }),
            start.elapsed().as_millis() as u64,
        ))
    }
}
