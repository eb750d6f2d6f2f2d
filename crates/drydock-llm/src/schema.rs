//! Structural validation of model-produced artifacts
//!
//! A response that is syntactically valid JSON can still be semantically
//! incomplete. These validators enforce the structural contract — required
//! top-level keys with the right types — before an artifact is handed back
//! to a caller.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Required top-level keys of a project analysis, with expected types
const ANALYSIS_KEYS: &[(&str, ExpectedType)] = &[
    ("summary", ExpectedType::Any),
    ("frameworks", ExpectedType::Array),
    ("language", ExpectedType::String),
    ("projectType", ExpectedType::String),
    ("projectStructure", ExpectedType::Any),
    ("dependencies", ExpectedType::Any),
    ("integrations", ExpectedType::Array),
    ("environmentVariables", ExpectedType::Array),
    ("buildConfig", ExpectedType::Any),
    ("security", ExpectedType::Any),
    ("recommendations", ExpectedType::Array),
];

#[derive(Debug, Clone, Copy)]
enum ExpectedType {
    String,
    Array,
    Any,
}

impl ExpectedType {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Array => value.is_array(),
            Self::Any => !value.is_null(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Array => "array",
            Self::Any => "non-null value",
        }
    }
}

/// A validated project analysis.
///
/// The analysis is model-shaped free-form JSON; only the top-level contract
/// is enforced, so it stays a [`Value`] behind typed accessors rather than a
/// rigid struct.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectAnalysis(Value);

impl ProjectAnalysis {
    /// Validate a raw object against the analysis contract.
    ///
    /// # Errors
    /// Returns [`Error::SchemaValidation`] listing every missing or
    /// mistyped key.
    pub fn validate(value: Value) -> Result<Self> {
        let Some(object) = value.as_object() else {
            return Err(Error::SchemaValidation(
                "analysis result is not a JSON object".to_string(),
            ));
        };

        let mut problems = Vec::new();
        for (key, expected) in ANALYSIS_KEYS {
            match object.get(*key) {
                None => problems.push(format!("missing '{key}'")),
                Some(v) if !expected.matches(v) => {
                    problems.push(format!("'{key}' is not a {}", expected.name()));
                }
                Some(_) => {}
            }
        }

        if problems.is_empty() {
            Ok(Self(value))
        } else {
            Err(Error::SchemaValidation(problems.join(", ")))
        }
    }

    /// The underlying JSON object
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consume into the underlying JSON object
    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Primary language reported by the analysis
    #[must_use]
    pub fn language(&self) -> &str {
        self.0["language"].as_str().unwrap_or_default()
    }

    /// Project type reported by the analysis
    #[must_use]
    pub fn project_type(&self) -> &str {
        self.0["projectType"].as_str().unwrap_or_default()
    }

    /// Frameworks detected in the project
    #[must_use]
    pub fn frameworks(&self) -> Vec<&str> {
        self.0["frameworks"]
            .as_array()
            .map(|a| a.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// One generated configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Path relative to the project root
    pub path: String,
    /// Full file content
    pub content: String,
}

/// A validated deployment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Kind of configuration produced (e.g. "dockerfile", "compose")
    #[serde(rename = "configType")]
    pub config_type: String,
    /// Generated files
    pub files: Vec<ConfigFile>,
}

impl DeploymentConfig {
    /// Validate a raw object against the configuration contract.
    ///
    /// # Errors
    /// Returns [`Error::SchemaValidation`] when `configType` is missing or
    /// `files` is absent, malformed, or empty.
    pub fn validate(value: Value) -> Result<Self> {
        let config: Self = serde_json::from_value(value)
            .map_err(|e| Error::SchemaValidation(format!("deployment config: {e}")))?;

        if config.config_type.is_empty() {
            return Err(Error::SchemaValidation(
                "deployment config has empty 'configType'".to_string(),
            ));
        }
        if config.files.is_empty() {
            return Err(Error::SchemaValidation(
                "deployment config has no files".to_string(),
            ));
        }
        for file in &config.files {
            if file.path.is_empty() {
                return Err(Error::SchemaValidation(
                    "deployment config file with empty path".to_string(),
                ));
            }
        }
        Ok(config)
    }
}

/// Expected top-level keys, used as the extractor's schema fingerprint
#[must_use]
pub fn analysis_fingerprint_keys() -> Vec<&'static str> {
    ANALYSIS_KEYS.iter().map(|(k, _)| *k).collect()
}

/// Fingerprint keys for deployment-config extraction
#[must_use]
pub fn config_fingerprint_keys() -> Vec<&'static str> {
    vec!["configType", "files"]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn complete_analysis() -> Value {
        json!({
            "summary": {"overview": "an axum web service"},
            "frameworks": ["axum"],
            "language": "rust",
            "projectType": "web-service",
            "projectStructure": {"root": "src"},
            "dependencies": {"tokio": "1"},
            "integrations": [],
            "environmentVariables": [{"name": "PORT"}],
            "buildConfig": {"tool": "cargo"},
            "security": {"issues": []},
            "recommendations": ["add a healthcheck"]
        })
    }

    #[test]
    fn test_complete_analysis_validates() {
        let analysis = ProjectAnalysis::validate(complete_analysis()).unwrap();
        assert_eq!(analysis.language(), "rust");
        assert_eq!(analysis.project_type(), "web-service");
        assert_eq!(analysis.frameworks(), vec!["axum"]);
    }

    #[test]
    fn test_incomplete_analysis_rejected() {
        let mut value = complete_analysis();
        value.as_object_mut().unwrap().remove("language");
        value.as_object_mut().unwrap().remove("security");

        let err = ProjectAnalysis::validate(value).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("missing 'language'"));
        assert!(msg.contains("missing 'security'"));
    }

    #[test]
    fn test_mistyped_key_rejected() {
        let mut value = complete_analysis();
        value["frameworks"] = json!("axum");

        let err = ProjectAnalysis::validate(value).unwrap_err();
        assert!(err.to_string().contains("'frameworks' is not a array"));
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(ProjectAnalysis::validate(json!(["not", "an", "object"])).is_err());
    }

    #[test]
    fn test_deployment_config_validates() {
        let config = DeploymentConfig::validate(json!({
            "configType": "dockerfile",
            "files": [{"path": "Dockerfile", "content": "FROM rust:1.88"}]
        }))
        .unwrap();
        assert_eq!(config.config_type, "dockerfile");
        assert_eq!(config.files.len(), 1);
    }

    #[test]
    fn test_deployment_config_rejects_empty_files() {
        let err = DeploymentConfig::validate(json!({
            "configType": "compose",
            "files": []
        }))
        .unwrap_err();
        assert!(err.to_string().contains("no files"));
    }

    #[test]
    fn test_deployment_config_rejects_missing_config_type() {
        assert!(DeploymentConfig::validate(json!({
            "files": [{"path": "Dockerfile", "content": "FROM alpine"}]
        }))
        .is_err());
    }
}
