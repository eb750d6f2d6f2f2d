//! # drydock-llm
//!
//! Model-provider abstraction for the drydock deployment engine.
//!
//! The crate gives the rest of the system one capability interface,
//! [`ModelProvider`], over two kinds of backend: any OpenAI-compatible
//! HTTP endpoint and local agentic CLIs. On top of the raw chat surface
//! it layers the parts every caller needs:
//!
//! - [`extract`]: structured-output extraction that recovers a JSON
//!   object from prose-wrapped, fenced, or truncated model text
//! - [`schema`]: structural validation of analysis and deployment-config
//!   responses
//! - [`retry`]: classified retry with exponential backoff and
//!   rate-limit reset hints

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod chat;
pub mod error;
pub mod extract;
pub mod provider;
pub mod providers;
pub mod retry;
pub mod schema;
pub mod util;

pub use chat::{
    CompletionRequest, CompletionResponse, Message, MessageRole, TokenUsage, ToolCall,
    ToolCompletionRequest, ToolCompletionResponse, ToolDefinition,
};
pub use error::{Error, Result};
pub use extract::{Extractor, ParseFailure, StructuredExtraction};
pub use provider::{ConfigRequest, ModelProvider, ProjectContext};
pub use providers::{
    AgenticCliConfig, AgenticCliProvider, OpenAiCompatConfig, OpenAiCompatProvider,
};
pub use retry::{retry_with_backoff, RetryConfig, RetryDecision, MAX_BACKOFF};
pub use schema::{ConfigFile, DeploymentConfig, ProjectAnalysis};
