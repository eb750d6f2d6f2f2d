//! Progress events
//!
//! One-way typed channel from the engine to whatever is watching a
//! deployment. Events carry short human-readable messages and optional
//! structured details; tool inputs and outputs are summarized, never
//! embedded verbatim.

use serde::Serialize;
use tokio::sync::mpsc;

/// Longest thinking preview forwarded to subscribers
const THINKING_PREVIEW_BYTES: usize = 240;

/// Events emitted while analyzing, deploying, and recovering
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A tool is being executed
    ToolUse {
        /// Tool name
        tool_name: String,
        /// One-line summary of what the call does
        message: String,
    },
    /// Assistant produced reasoning text between tool calls
    Thinking {
        /// Truncated preview of the text
        message: String,
    },
    /// A pre-flight check completed
    PreFlight {
        /// Check outcome description
        message: String,
        /// Structured check results
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
    },
    /// Build progress
    Build {
        /// Build log line or phase description
        message: String,
    },
    /// Deploy progress
    Deploy {
        /// Deploy phase description
        message: String,
    },
    /// Deployment status changed
    Status {
        /// New status
        message: String,
    },
    /// Something failed
    Error {
        /// Sanitized error description
        message: String,
        /// Structured error details
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
    },
}

impl ProgressEvent {
    /// Build a thinking event with a bounded preview
    #[must_use]
    pub fn thinking(text: &str) -> Self {
        Self::Thinking {
            message: drydock_llm::util::truncate_safe(text, THINKING_PREVIEW_BYTES).to_string(),
        }
    }
}

/// Sending half of the progress channel.
///
/// Cloneable and infallible from the engine's point of view: if the
/// subscriber went away, events are dropped silently rather than failing
/// the deployment.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSender {
    /// Create a connected channel
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sender that discards all events
    #[must_use]
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emit an event
    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_serialize_with_type_tag() {
        let event = ProgressEvent::ToolUse {
            tool_name: "read_file".to_string(),
            message: "reading Dockerfile".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tool_use");
        assert_eq!(json["tool_name"], "read_file");
    }

    #[test]
    fn test_thinking_preview_is_bounded() {
        let long = "x".repeat(10_000);
        let ProgressEvent::Thinking { message } = ProgressEvent::thinking(&long) else {
            panic!("wrong variant");
        };
        assert!(message.len() <= THINKING_PREVIEW_BYTES);
    }

    #[tokio::test]
    async fn test_channel_delivers_in_order() {
        let (sender, mut rx) = ProgressSender::channel();
        sender.emit(ProgressEvent::Status {
            message: "building".to_string(),
        });
        sender.emit(ProgressEvent::Status {
            message: "deploying".to_string(),
        });

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(matches!(first, ProgressEvent::Status { message } if message == "building"));
        assert!(matches!(second, ProgressEvent::Status { message } if message == "deploying"));
    }

    #[test]
    fn test_disabled_sender_does_not_panic() {
        ProgressSender::disabled().emit(ProgressEvent::Build {
            message: "step 1".to_string(),
        });
    }
}
