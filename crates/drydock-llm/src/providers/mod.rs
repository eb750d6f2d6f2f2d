//! Provider backends
//!
//! - [`openai_compat`]: any OpenAI-compatible chat-completion endpoint,
//!   hosted or self-hosted, over raw reqwest.
//! - [`agentic`]: a local agentic CLI that carries its own file/shell
//!   tools and never receives an external tool set.

pub mod agentic;
pub mod openai_compat;

pub use agentic::{AgenticCliConfig, AgenticCliProvider};
pub use openai_compat::{OpenAiCompatConfig, OpenAiCompatProvider};
