//! Generated-config validation
//!
//! Model-generated Dockerfiles and compose files are checked before any
//! build is attempted, so obvious syntax mistakes surface as cheap
//! validation failures instead of slow build failures.

use crate::error::{Error, Result};
use crate::registry::{RiskLevel, Tool, ToolCategory, ToolDefinition, ToolResult};
use crate::workspace::WorkspaceGuard;
use std::time::Instant;

const DOCKERFILE_INSTRUCTIONS: &[&str] = &[
    "FROM",
    "RUN",
    "CMD",
    "LABEL",
    "MAINTAINER",
    "EXPOSE",
    "ENV",
    "ADD",
    "COPY",
    "ENTRYPOINT",
    "VOLUME",
    "USER",
    "WORKDIR",
    "ARG",
    "ONBUILD",
    "STOPSIGNAL",
    "HEALTHCHECK",
    "SHELL",
];

/// Check Dockerfile syntax, returning a list of problems (empty = valid)
#[must_use]
pub fn check_dockerfile(content: &str) -> Vec<String> {
    let mut problems = Vec::new();
    let mut saw_from = false;
    let mut continuation = false;

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        let line_number = index + 1;

        if continuation {
            continuation = line.ends_with('\\');
            continue;
        }
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let instruction = line
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_ascii_uppercase();

        if !DOCKERFILE_INSTRUCTIONS.contains(&instruction.as_str()) {
            problems.push(format!(
                "line {line_number}: unknown instruction '{instruction}'"
            ));
        } else if !saw_from && instruction != "FROM" && instruction != "ARG" {
            // Only ARG may precede the first FROM
            problems.push(format!(
                "line {line_number}: '{instruction}' before the first FROM"
            ));
        }

        if instruction == "FROM" {
            saw_from = true;
            if line.split_whitespace().count() < 2 {
                problems.push(format!("line {line_number}: FROM is missing an image"));
            }
        }

        continuation = line.ends_with('\\');
    }

    if !saw_from {
        problems.push("no FROM instruction".to_string());
    }
    problems
}

/// Check a compose file, returning a list of problems (empty = valid)
#[must_use]
pub fn check_compose(content: &str) -> Vec<String> {
    let parsed: serde_yaml::Value = match serde_yaml::from_str(content) {
        Ok(value) => value,
        Err(e) => return vec![format!("invalid YAML: {e}")],
    };

    let Some(mapping) = parsed.as_mapping() else {
        return vec!["top level must be a mapping".to_string()];
    };

    let services = mapping.get(serde_yaml::Value::String("services".to_string()));
    match services.and_then(|s| s.as_mapping()) {
        Some(services) if !services.is_empty() => {
            let mut problems = Vec::new();
            for (name, service) in services {
                let name = name.as_str().unwrap_or("<non-string>");
                let Some(service) = service.as_mapping() else {
                    problems.push(format!("service '{name}' must be a mapping"));
                    continue;
                };
                let has_image = service.contains_key(serde_yaml::Value::String("image".to_string()));
                let has_build = service.contains_key(serde_yaml::Value::String("build".to_string()));
                if !has_image && !has_build {
                    problems.push(format!("service '{name}' has neither 'image' nor 'build'"));
                }
            }
            problems
        }
        Some(_) => vec!["'services' is empty".to_string()],
        None => vec!["missing 'services' mapping".to_string()],
    }
}

/// Tool that validates a Dockerfile or compose file in the workspace
pub struct ValidateConfigTool {
    definition: ToolDefinition,
    guard: WorkspaceGuard,
}

impl ValidateConfigTool {
    /// Create the tool
    #[must_use]
    pub fn new(guard: WorkspaceGuard) -> Self {
        let definition = ToolDefinition::new(
            "validate_deployment_config",
            "Validate a Dockerfile or docker-compose file without building it",
        )
        .with_category(ToolCategory::Deploy)
        .with_risk_level(RiskLevel::Low)
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path of the config file relative to the project root"
                }
            },
            "required": ["path"]
        }));
        Self { definition, guard }
    }
}

#[async_trait::async_trait]
impl Tool for ValidateConfigTool {
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
        let content = tokio::fs::read_to_string(&resolved).await?;

        let basename = resolved
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let problems = if basename.contains("compose") || basename.ends_with(".yml") || basename.ends_with(".yaml") {
            check_compose(&content)
        } else {
            check_dockerfile(&content)
        };

        Ok(ToolResult::success(
            serde_json::json!({
                "path": path,
                "valid": problems.is_empty(),
                "problems": problems,
            }),
            start.elapsed().as_millis() as u64,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_valid_dockerfile() {
        let content = "# build\nARG VERSION=3.12\nFROM python:${VERSION}\nWORKDIR /app\nCOPY . .\nRUN pip install -r requirements.txt \\\n    && pip cache purge\nEXPOSE 8000\nCMD [\"python\", \"app.py\"]\n";
        assert!(check_dockerfile(content).is_empty());
    }

    #[test]
    fn test_dockerfile_missing_from() {
        let problems = check_dockerfile("RUN echo hi\n");
        assert!(problems.iter().any(|p| p.contains("before the first FROM")));
        assert!(problems.iter().any(|p| p.contains("no FROM")));
    }

    #[test]
    fn test_dockerfile_unknown_instruction() {
        let problems = check_dockerfile("FROM alpine\nFORM busybox\n");
        assert_eq!(problems, vec!["line 2: unknown instruction 'FORM'"]);
    }

    #[test]
    fn test_dockerfile_continuation_lines_not_flagged() {
        let content = "FROM alpine\nRUN apk add --no-cache \\\n    curl \\\n    git\n";
        assert!(check_dockerfile(content).is_empty());
    }

    #[test]
    fn test_valid_compose() {
        let content = "services:\n  web:\n    build: .\n    ports:\n      - \"8080:80\"\n  db:\n    image: postgres:16\n";
        assert!(check_compose(content).is_empty());
    }

    #[test]
    fn test_compose_missing_services() {
        assert_eq!(check_compose("version: '3'\n"), vec!["missing 'services' mapping"]);
    }

    #[test]
    fn test_compose_service_without_image_or_build() {
        let problems = check_compose("services:\n  web:\n    ports:\n      - \"80:80\"\n");
        assert_eq!(problems, vec!["service 'web' has neither 'image' nor 'build'"]);
    }

    #[test]
    fn test_compose_invalid_yaml() {
        let problems = check_compose("services:\n  web: [unclosed\n");
        assert!(problems[0].starts_with("invalid YAML"));
    }

    #[tokio::test]
    async fn test_tool_routes_by_filename() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM alpine\n").unwrap();
        std::fs::write(dir.path().join("docker-compose.yml"), "services: {}\n").unwrap();
        let tool = ValidateConfigTool::new(WorkspaceGuard::new(dir.path()).unwrap());

        let result = tool
            .execute(serde_json::json!({"path": "Dockerfile"}))
            .await
            .unwrap();
        assert_eq!(result.output["valid"], true);

        let result = tool
            .execute(serde_json::json!({"path": "docker-compose.yml"}))
            .await
            .unwrap();
        assert_eq!(result.output["valid"], false);
    }
}
