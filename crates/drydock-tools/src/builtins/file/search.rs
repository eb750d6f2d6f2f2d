use crate::error::{Error, Result};
use crate::registry::{RiskLevel, Tool, ToolCategory, ToolDefinition, ToolResult};
use crate::workspace::WorkspaceGuard;
use regex::RegexBuilder;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Directories never descended into during a search
const SKIPPED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "dist",
    "build",
    "__pycache__",
    ".venv",
    "venv",
    ".next",
];

const MAX_MATCHES: usize = 200;

/// Recursively collect files under `root`, skipping vendored trees
fn walk_files(root: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if path.is_dir() {
            if !SKIPPED_DIRS.contains(&name.as_str()) {
                walk_files(&path, out)?;
            }
        } else {
            out.push(path);
        }
    }
    Ok(())
}

/// Translate a shell glob (`*`, `?`, `**`) into an anchored regex
fn glob_to_regex(glob: &str) -> Result<regex::Regex> {
    let mut pattern = String::from("^");
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    // "**/" also matches zero directories
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        pattern.push_str("(?:.*/)?");
                    } else {
                        pattern.push_str(".*");
                    }
                } else {
                    pattern.push_str("[^/]*");
                }
            }
            '?' => pattern.push_str("[^/]"),
            c => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern.push('$');
    regex::Regex::new(&pattern)
        .map_err(|e| Error::InvalidInput(format!("invalid glob '{glob}': {e}")))
}

/// Tool for regex search across workspace files
pub struct GrepSearchTool {
    definition: ToolDefinition,
    guard: WorkspaceGuard,
}

impl GrepSearchTool {
    /// Create a new grep tool
    #[must_use]
    pub fn new(guard: WorkspaceGuard) -> Self {
        let definition = ToolDefinition::new(
            "grep_search",
            "Search project files for a regex pattern and return matching lines",
        )
        .with_category(ToolCategory::File)
        .with_risk_level(RiskLevel::Low)
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regular expression to search for"
                },
                "glob": {
                    "type": "string",
                    "description": "Optional glob restricting which files are searched (e.g. '*.py')"
                },
                "case_sensitive": {
                    "type": "boolean",
                    "description": "Match case sensitively (default: true)",
                    "default": true
                }
            },
            "required": ["pattern"]
        }));

        Self { definition, guard }
    }
}

#[async_trait::async_trait]
impl Tool for GrepSearchTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult> {
        let start = Instant::now();

        let pattern = input
            .get("pattern")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::InvalidInput("missing required field: pattern".to_string()))?;
        let case_sensitive = input
            .get("case_sensitive")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        let file_filter = input
            .get("glob")
            .and_then(|v| v.as_str())
            .map(glob_to_regex)
            .transpose()?;

        let regex = RegexBuilder::new(pattern)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| Error::InvalidInput(format!("invalid pattern '{pattern}': {e}")))?;

        let mut files = Vec::new();
        walk_files(self.guard.root(), &mut files)?;

        let mut matches = Vec::new();
        'files: for file in files {
            let relative = file
                .strip_prefix(self.guard.root())
                .unwrap_or(&file)
                .to_string_lossy()
                .to_string();
            if let Some(filter) = &file_filter {
                let basename = file.file_name().map(|n| n.to_string_lossy().to_string());
                let matches_filter = filter.is_match(&relative)
                    || basename.map(|b| filter.is_match(&b)).unwrap_or(false);
                if !matches_filter {
                    continue;
                }
            }
            // Binary and unreadable files are skipped, not errors
            let Ok(content) = std::fs::read_to_string(&file) else {
                continue;
            };
            for (index, line) in content.lines().enumerate() {
                if regex.is_match(line) {
                    matches.push(serde_json::json!({
                        "file": relative,
                        "line_number": index + 1,
                        "line": line,
                    }));
                    if matches.len() >= MAX_MATCHES {
                        break 'files;
                    }
                }
            }
        }

        let count = matches.len();
        Ok(ToolResult::success(
            serde_json::json!({
                "matches": matches,
                "count": count,
            }),
            start.elapsed().as_millis() as u64,
        ))
    }
}

/// Tool for finding files by glob pattern
pub struct GlobFindTool {
    definition: ToolDefinition,
    guard: WorkspaceGuard,
}

impl GlobFindTool {
    /// Create a new glob tool
    #[must_use]
    pub fn new(guard: WorkspaceGuard) -> Self {
        let definition = ToolDefinition::new(
            "glob_find",
            "Find project files matching a glob pattern (e.g. '**/*.ts', 'Dockerfile*')",
        )
        .with_category(ToolCategory::File)
        .with_risk_level(RiskLevel::Low)
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern matched against paths relative to the project root"
                }
            },
            "required": ["pattern"]
        }));

        Self { definition, guard }
    }
}

#[async_trait::async_trait]
impl Tool for GlobFindTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult> {
        let start = Instant::now();

        let pattern = input
            .get("pattern")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::InvalidInput("missing required field: pattern".to_string()))?;
        let regex = glob_to_regex(pattern)?;

        let mut files = Vec::new();
        walk_files(self.guard.root(), &mut files)?;

        let mut found: Vec<String> = files
            .into_iter()
            .filter_map(|f| {
                let relative = f
                    .strip_prefix(self.guard.root())
                    .unwrap_or(&f)
                    .to_string_lossy()
                    .to_string();
                let basename = f
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                (regex.is_match(&relative) || regex.is_match(&basename)).then_some(relative)
            })
            .collect();
        found.sort();

        let count = found.len();
        Ok(ToolResult::success(
            serde_json::json!({
                "files": found,
                "count": count,
            }),
            start.elapsed().as_millis() as u64,
        ))
    }
}
