//! Conversation transcript
//!
//! Append-only record of an agent session: per turn, the assistant text,
//! the tool calls it requested, and the results those calls produced.
//! Calls and results pair 1:1 within a turn by index; a result that does
//! not match a recorded call is a programming error.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A tool call requested by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Tool name
    pub name: String,
    /// Parsed input arguments
    pub input: serde_json::Value,
}

/// The result of one recorded tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultRecord {
    /// Index of the call in the same turn
    pub tool_call_index: usize,
    /// Tool output
    pub output: serde_json::Value,
    /// Error message if the tool failed
    pub error: Option<String>,
}

/// One agent turn: assistant text plus tool activity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentTurn {
    /// Text the assistant produced this turn, if any
    pub assistant_text: Option<String>,
    /// Tool calls requested this turn
    pub tool_calls: Vec<ToolCallRecord>,
    /// Results, paired by `tool_call_index`
    pub tool_results: Vec<ToolResultRecord>,
}

/// Full session transcript
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<AgentTurn>,
}

impl Transcript {
    /// Create an empty transcript
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new turn, returning its index
    pub fn begin_turn(&mut self) -> usize {
        self.turns.push(AgentTurn::default());
        self.turns.len() - 1
    }

    /// Record assistant text on the current turn
    pub fn record_text(&mut self, text: impl Into<String>) -> Result<()> {
        let turn = self.current_turn_mut()?;
        turn.assistant_text = Some(text.into());
        Ok(())
    }

    /// Record a tool call on the current turn, returning its index
    pub fn record_call(&mut self, name: impl Into<String>, input: serde_json::Value) -> Result<usize> {
        let turn = self.current_turn_mut()?;
        turn.tool_calls.push(ToolCallRecord {
            name: name.into(),
            input,
        });
        Ok(turn.tool_calls.len() - 1)
    }

    /// Record the result for a call made this turn
    pub fn record_result(
        &mut self,
        tool_call_index: usize,
        output: serde_json::Value,
        error: Option<String>,
    ) -> Result<()> {
        let turn = self.current_turn_mut()?;
        if tool_call_index >= turn.tool_calls.len() {
            debug_assert!(false, "result for unrecorded tool call {tool_call_index}");
            return Err(Error::InvalidState(format!(
                "result references tool call {tool_call_index}, but only {} calls were recorded",
                turn.tool_calls.len()
            )));
        }
        turn.tool_results.push(ToolResultRecord {
            tool_call_index,
            output,
            error,
        });
        Ok(())
    }

    /// Append another transcript's turns (used when one session spans
    /// several agent invocations)
    pub fn extend(&mut self, other: Transcript) {
        self.turns.extend(other.turns);
    }

    /// All turns in order
    #[must_use]
    pub fn turns(&self) -> &[AgentTurn] {
        &self.turns
    }

    /// Number of turns
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the transcript is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Assistant text accumulated over all turns, newest last
    #[must_use]
    pub fn accumulated_text(&self) -> String {
        self.turns
            .iter()
            .filter_map(|t| t.assistant_text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn current_turn_mut(&mut self) -> Result<&mut AgentTurn> {
        self.turns
            .last_mut()
            .ok_or_else(|| Error::InvalidState("no turn has been started".to_string()))
    }
}
