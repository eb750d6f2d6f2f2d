//! Tool-calling loop
//!
//! One agent session: hand the model a conversation and the tool set,
//! execute every tool it requests in order, feed results back, and repeat
//! until the model answers without tools or the step budget runs out. The
//! whole loop races a wall-clock timeout; the budget bounds model calls,
//! the timeout bounds everything else.

use crate::error::{Error, Result};
use crate::events::{ProgressEvent, ProgressSender};
use crate::transcript::Transcript;
use drydock_llm::{
    CompletionRequest, Message, ModelProvider, ToolCompletionRequest,
};
use drydock_tools::{ToolResult, ToolRunner};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Budgets for one loop run
#[derive(Debug, Clone)]
pub struct ToolLoopConfig {
    /// Maximum model calls (turns); never exceeded
    pub max_steps: u32,
    /// Wall-clock bound for the whole loop
    pub timeout: Duration,
    /// Completion token limit per call
    pub max_tokens: Option<u32>,
    /// Sampling temperature per call
    pub temperature: Option<f32>,
}

impl Default for ToolLoopConfig {
    fn default() -> Self {
        Self {
            max_steps: 20,
            timeout: Duration::from_secs(30 * 60),
            max_tokens: Some(4096),
            temperature: Some(0.2),
        }
    }
}

impl ToolLoopConfig {
    /// Set the step budget
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Set the wall-clock timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// How a loop run ended
#[derive(Debug)]
pub struct LoopOutcome {
    /// Final answer, or accumulated best-effort text on budget exhaustion
    pub final_text: String,
    /// Model calls actually made
    pub steps_used: u32,
    /// True when the loop stopped on the step budget rather than a final
    /// answer
    pub budget_exhausted: bool,
    /// Full transcript of the session
    pub transcript: Transcript,
}

/// The agent loop
pub struct ToolLoop {
    provider: Arc<dyn ModelProvider>,
    runner: Arc<ToolRunner>,
    config: ToolLoopConfig,
    progress: ProgressSender,
}

impl ToolLoop {
    /// Create a loop over a provider and tool runner
    #[must_use]
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        runner: Arc<ToolRunner>,
        config: ToolLoopConfig,
        progress: ProgressSender,
    ) -> Self {
        Self {
            provider,
            runner,
            config,
            progress,
        }
    }

    /// Run the loop to completion.
    ///
    /// Losing the race against the wall-clock timeout abandons whatever
    /// call was in flight and returns [`Error::LoopTimeout`].
    #[instrument(skip(self, messages))]
    pub async fn run(&self, messages: Vec<Message>) -> Result<LoopOutcome> {
        match tokio::time::timeout(self.config.timeout, self.run_inner(messages)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    timeout_s = self.config.timeout.as_secs(),
                    "agent loop timed out"
                );
                Err(Error::LoopTimeout(self.config.timeout.as_secs()))
            }
        }
    }

    async fn run_inner(&self, mut messages: Vec<Message>) -> Result<LoopOutcome> {
        let tools = self.runner.registry().to_llm_tools();
        let mut transcript = Transcript::new();

        for step in 1..=self.config.max_steps {
            let mut request = CompletionRequest::new("");
            request.messages = messages.clone();
            request.max_tokens = self.config.max_tokens;
            request.temperature = self.config.temperature;

            let response = self
                .provider
                .complete_with_tools(ToolCompletionRequest::new(request, tools.clone()))
                .await?;

            transcript.begin_turn();
            if let Some(content) = &response.content {
                if !content.trim().is_empty() {
                    transcript.record_text(content.clone())?;
                    self.progress.emit(ProgressEvent::thinking(content));
                    messages.push(Message::assistant(content.clone()));
                }
            }

            if !response.has_tool_calls() {
                debug!(step, "model answered without tools");
                return Ok(LoopOutcome {
                    final_text: response
                        .content
                        .unwrap_or_else(|| transcript.accumulated_text()),
                    steps_used: step,
                    budget_exhausted: false,
                    transcript,
                });
            }

            for call in &response.tool_calls {
                let input = match call.arguments_value() {
                    Ok(value) => value,
                    Err(e) => {
                        // Unparseable arguments go back to the model as a
                        // failed result, like any other tool failure
                        let failure = ToolResult::failure(
                            format!("arguments are not valid JSON: {e}"),
                            0,
                        );
                        let index =
                            transcript.record_call(&call.name, serde_json::Value::Null)?;
                        transcript.record_result(
                            index,
                            serde_json::Value::Null,
                            failure.error.clone(),
                        )?;
                        messages.push(Self::tool_message(call.id.clone(), &failure));
                        continue;
                    }
                };

                self.progress.emit(ProgressEvent::ToolUse {
                    tool_name: call.name.clone(),
                    message: format!("running {}", call.name),
                });

                let index = transcript.record_call(&call.name, input.clone())?;
                let result = match self.runner.execute(&call.name, input).await {
                    Ok(result) => result,
                    Err(e) => ToolResult::failure(e.to_string(), 0),
                };
                transcript.record_result(index, result.output.clone(), result.error.clone())?;
                messages.push(Self::tool_message(call.id.clone(), &result));
            }
        }

        info!(
            max_steps = self.config.max_steps,
            "step budget exhausted, returning accumulated text"
        );
        Ok(LoopOutcome {
            final_text: transcript.accumulated_text(),
            steps_used: self.config.max_steps,
            budget_exhausted: true,
            transcript,
        })
    }

    /// Serialize a tool result into the message fed back to the model
    fn tool_message(call_id: String, result: &ToolResult) -> Message {
        let body = serde_json::json!({
            "success": result.success,
            "output": result.output,
            "error": result.error,
        });
        Message::tool_response(call_id, body.to_string())
    }
}
