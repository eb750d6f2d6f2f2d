//! Structured-output extraction from free-form model text
//!
//! Model output that should be JSON arrives wrapped in prose, fenced in
//! markdown, or cut off mid-object by a token limit. This module turns such
//! text into a validated JSON object through a fixed sequence of named
//! strategies, each independently testable, executed in priority order with
//! early exit on the first schema-matching success:
//!
//! 1. direct parse (text starts with `{`)
//! 2. fenced code blocks (```json and generic ```)
//! 3. string-aware bracket-matching scan from the first `{`
//! 4. truncation repair on a scan that ran out of input
//! 5. preamble stripping, then re-scan
//! 6. exhaustive scan from every `{` in the document
//!
//! Naive regex extraction fails on nested objects and on JSON-looking text
//! inside string literals; only the string-aware scanner finds balanced
//! spans correctly.

use crate::util::truncate_safe;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, trace};

/// Bytes of raw text retained in failure previews
const PREVIEW_BYTES: usize = 200;

/// Natural-language preambles models put in front of JSON
const PREAMBLE_MARKERS: &[&str] = &[
    "here is the",
    "here's the",
    "here is my",
    "let me provide",
    "below is the",
    "the following is",
    "i'll provide",
];

/// Outcome of a successful extraction.
///
/// Transient — produced during parsing, never persisted.
#[derive(Debug, Clone)]
pub struct StructuredExtraction {
    /// The extracted object
    pub json: Option<Value>,
    /// Whether the object was recovered via truncation repair
    pub is_truncated: bool,
    /// Unclosed braces/brackets at end of input on the original candidate
    pub missing_close_count: usize,
}

impl StructuredExtraction {
    fn complete(json: Value) -> Self {
        Self {
            json: Some(json),
            is_truncated: false,
            missing_close_count: 0,
        }
    }

    fn repaired(json: Value, missing_close_count: usize) -> Self {
        Self {
            json: Some(json),
            is_truncated: true,
            missing_close_count,
        }
    }
}

/// Why no strategy produced a schema-matching object.
///
/// The distinction drives caller-visible guidance: a truncated document
/// means the output token budget was too small; a malformed one means the
/// model answered in the wrong format entirely.
#[derive(Debug, Clone, Error)]
pub enum ParseFailure {
    /// The document opens more braces than it closes
    #[error(
        "model output appears truncated ({missing_close_count} unclosed); \
         increase the output token budget"
    )]
    Truncated {
        /// Opening braces minus closing braces across the document
        missing_close_count: usize,
        /// Bounded excerpt of the raw text
        preview: String,
    },

    /// The document does not contain JSON at all
    #[error("model output is not JSON; the model returned the wrong format")]
    Malformed {
        /// Bounded excerpt of the raw text
        preview: String,
    },
}

impl ParseFailure {
    /// Bounded excerpt of the raw text, for diagnostics
    #[must_use]
    pub fn preview(&self) -> &str {
        match self {
            Self::Truncated { preview, .. } | Self::Malformed { preview } => preview,
        }
    }
}

/// Multi-strategy JSON extractor with schema fingerprinting.
///
/// A candidate object is accepted only if it contains at least one of the
/// expected top-level keys. This prevents accepting an unrelated JSON blob
/// that happens to parse — prose like `{see above}` or a stray example
/// object in the model's explanation.
#[derive(Debug, Clone)]
pub struct Extractor {
    expected_keys: Vec<String>,
}

impl Extractor {
    /// Create an extractor expecting at least one of the given top-level keys
    pub fn new<I, S>(expected_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            expected_keys: expected_keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Create an extractor that accepts any JSON object
    #[must_use]
    pub fn any_object() -> Self {
        Self {
            expected_keys: Vec::new(),
        }
    }

    /// Extract a single JSON object from arbitrary model text.
    ///
    /// # Errors
    /// Returns [`ParseFailure`] when no strategy yields a schema-matching
    /// object, distinguishing truncated from malformed input.
    pub fn extract(&self, text: &str) -> Result<StructuredExtraction, ParseFailure> {
        // Strategy 1: direct parse
        let trimmed = text.trim();
        if trimmed.starts_with('{') {
            if let Some(value) = self.parse_fingerprinted(trimmed) {
                trace!(strategy = "direct", "extraction succeeded");
                return Ok(StructuredExtraction::complete(value));
            }
        }

        // Strategy 2: fenced code blocks, in order of appearance
        for block in fenced_blocks(text) {
            if let Some(value) = self.parse_fingerprinted(block.trim()) {
                trace!(strategy = "fenced", "extraction succeeded");
                return Ok(StructuredExtraction::complete(value));
            }
        }

        // Strategies 3 + 4: bracket scan from the first brace, with repair
        if let Some(start) = text.find('{') {
            if let Some(extraction) = self.scan_and_repair(text, start) {
                trace!(strategy = "scan", "extraction succeeded");
                return Ok(extraction);
            }
        }

        // Strategy 5: skip a natural-language preamble, then re-scan
        let lower = text.to_lowercase();
        for marker in PREAMBLE_MARKERS {
            if let Some(pos) = lower.find(marker) {
                let after = pos + marker.len();
                if let Some(rel) = text[after..].find('{') {
                    if let Some(extraction) = self.scan_and_repair(text, after + rel) {
                        trace!(strategy = "preamble", "extraction succeeded");
                        return Ok(extraction);
                    }
                }
            }
        }

        // Strategy 6: exhaustive — every remaining brace offset
        for (idx, _) in text.match_indices('{') {
            if let Some(extraction) = self.scan_and_repair(text, idx) {
                trace!(strategy = "exhaustive", offset = idx, "extraction succeeded");
                return Ok(extraction);
            }
        }

        let preview = truncate_safe(text.trim(), PREVIEW_BYTES).to_string();
        let opens = text.matches('{').count();
        let closes = text.matches('}').count();
        debug!(opens, closes, "all extraction strategies failed");
        if opens > closes {
            Err(ParseFailure::Truncated {
                missing_close_count: opens - closes,
                preview,
            })
        } else {
            Err(ParseFailure::Malformed { preview })
        }
    }

    /// Parse a candidate and apply the schema fingerprint
    fn parse_fingerprinted(&self, candidate: &str) -> Option<Value> {
        let value: Value = serde_json::from_str(candidate).ok()?;
        self.fingerprint(&value).then_some(value)
    }

    /// Accept only objects carrying at least one expected top-level key
    fn fingerprint(&self, value: &Value) -> bool {
        let Some(object) = value.as_object() else {
            return false;
        };
        if self.expected_keys.is_empty() {
            return true;
        }
        self.expected_keys.iter().any(|k| object.contains_key(k))
    }

    /// Scan for a balanced span starting at `start`; repair if truncated
    fn scan_and_repair(&self, text: &str, start: usize) -> Option<StructuredExtraction> {
        match scan_balanced(text, start)? {
            Scan::Complete { end } => {
                let value = self.parse_fingerprinted(&text[start..end])?;
                Some(StructuredExtraction::complete(value))
            }
            Scan::Truncated { depth } => {
                let repaired = repair_fragment(&text[start..])?;
                let value = self.parse_fingerprinted(&repaired)?;
                Some(StructuredExtraction::repaired(value, depth))
            }
        }
    }
}

/// Result of scanning one candidate span
#[derive(Debug)]
enum Scan {
    /// Balanced span ends at byte offset `end` (exclusive)
    Complete { end: usize },
    /// Input ended with `depth` brackets still open
    Truncated { depth: usize },
}

/// End-state of a string-aware scan over a fragment
#[derive(Debug, Default)]
struct ScanState {
    /// Open brackets, in order (`{` or `[`)
    stack: Vec<char>,
    /// Whether the scan ended inside a string literal
    in_string: bool,
    /// Byte offset of the opening quote of the unterminated string
    string_start: Option<usize>,
}

/// Walk `text` from `start` (which must point at `{`), maintaining a
/// bracket stack, an in-string flag, and an escape-pending flag. Braces
/// inside strings are non-structural; escaped quotes do not toggle the
/// string flag.
fn scan_balanced(text: &str, start: usize) -> Option<Scan> {
    if !text[start..].starts_with('{') {
        return None;
    }

    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => stack.push(ch),
            '}' | ']' => {
                stack.pop();
                if stack.is_empty() {
                    return Some(Scan::Complete {
                        end: start + offset + ch.len_utf8(),
                    });
                }
            }
            _ => {}
        }
    }

    Some(Scan::Truncated { depth: stack.len() })
}

/// Compute the scanner end-state for a fragment that begins at `{`
fn scan_state(fragment: &str) -> ScanState {
    let mut state = ScanState::default();
    let mut escaped = false;

    for (offset, ch) in fragment.char_indices() {
        if state.in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                state.in_string = false;
                state.string_start = None;
            }
            continue;
        }
        match ch {
            '"' => {
                state.in_string = true;
                state.string_start = Some(offset);
            }
            '{' | '[' => state.stack.push(ch),
            '}' | ']' => {
                state.stack.pop();
            }
            _ => {}
        }
    }

    state
}

/// Best-effort reconstruction of a JSON fragment cut off before its closers.
///
/// Fixed repair sequence: resolve an unterminated trailing string (closing a
/// value, stripping a dangling key), turn a dangling `:` into `: null`,
/// strip a trailing comma, then append the closers still open — recomputed
/// from the repaired fragment, so repair never invents structure. Returns
/// `None` when the result still does not parse; the caller discards the
/// candidate.
fn repair_fragment(fragment: &str) -> Option<String> {
    let mut s = fragment.trim_end().to_string();

    let state = scan_state(&s);
    if state.in_string {
        let string_start = state.string_start?;
        let before = s[..string_start].trim_end();
        if before.ends_with(':') {
            // Truncated mid-value: close the string
            s.push('"');
        } else {
            // Truncated mid-key: drop the partial key
            s.truncate(string_start);
            truncate_trailing(&mut s);
        }
    }

    truncate_trailing(&mut s);
    if s.ends_with(':') {
        s.push_str(" null");
    }

    // Append closers for whatever is still open, innermost first
    let state = scan_state(&s);
    for open in state.stack.iter().rev() {
        s.push(match open {
            '[' => ']',
            _ => '}',
        });
    }

    serde_json::from_str::<Value>(&s).ok()?;
    Some(s)
}

/// Trim trailing whitespace and at most one dangling comma
fn truncate_trailing(s: &mut String) {
    while s.ends_with(char::is_whitespace) {
        s.pop();
    }
    if s.ends_with(',') {
        s.pop();
        while s.ends_with(char::is_whitespace) {
            s.pop();
        }
    }
}

/// Bodies of triple-backtick fenced blocks, in order of appearance.
///
/// A leading language tag line (`json`, `JSON`, anything without spaces) is
/// stripped from each body.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut parts = text.split("```");
    // Text before the first fence
    let _ = parts.next();
    while let Some(body) = parts.next() {
        let body = match body.split_once('\n') {
            Some((first_line, rest)) if !first_line.trim().contains(' ') => rest,
            _ => body,
        };
        blocks.push(body);
        // Skip the prose between this block's closing fence and the next
        if parts.next().is_none() {
            break;
        }
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn analysis_extractor() -> Extractor {
        Extractor::new(["summary", "frameworks", "language"])
    }

    #[test]
    fn test_direct_parse() {
        let result = analysis_extractor()
            .extract(r#"{"summary": {"overview": "a web app"}}"#)
            .unwrap();
        assert!(!result.is_truncated);
        assert_eq!(result.json.unwrap()["summary"]["overview"], "a web app");
    }

    #[test]
    fn test_direct_parse_rejects_wrong_shape() {
        // Parses fine but carries none of the expected keys
        let err = analysis_extractor()
            .extract(r#"{"unrelated": 1}"#)
            .unwrap_err();
        assert!(matches!(err, ParseFailure::Malformed { .. }));
    }

    #[test]
    fn test_fenced_json_block() {
        let text = "Sure! ```json\n{\"summary\":{\"overview\":\"x\"}}\n``` ";
        let result = analysis_extractor().extract(text).unwrap();
        assert_eq!(result.json.unwrap(), json!({"summary":{"overview":"x"}}));
    }

    #[test]
    fn test_generic_fence_without_language_tag() {
        let text = "analysis below\n```\n{\"language\": \"rust\"}\n```\ndone";
        let result = analysis_extractor().extract(text).unwrap();
        assert_eq!(result.json.unwrap()["language"], "rust");
    }

    #[test]
    fn test_second_fence_wins_when_first_is_unrelated() {
        let text = "```json\n{\"example\": true}\n```\nand the real one:\n```json\n{\"summary\": \"ok\"}\n```";
        let result = analysis_extractor().extract(text).unwrap();
        assert_eq!(result.json.unwrap()["summary"], "ok");
    }

    #[test]
    fn test_embedded_object_in_prose() {
        let text = "The analysis result is {\"summary\": {\"nested\": [1, 2]}} as requested.";
        let result = analysis_extractor().extract(text).unwrap();
        assert!(!result.is_truncated);
        assert_eq!(result.json.unwrap(), json!({"summary": {"nested": [1, 2]}}));
    }

    #[test]
    fn test_braces_inside_strings_are_non_structural() {
        // Unbalanced braces and an escaped quote inside the string literal
        let text = r#"note: {"summary": "a\"b{c}}}", "language": "go"} end"#;
        let result = analysis_extractor().extract(text).unwrap();
        let value = result.json.unwrap();
        assert_eq!(value["summary"], "a\"b{c}}}");
        assert_eq!(value["language"], "go");
    }

    #[test]
    fn test_prose_brace_before_real_object() {
        // The first `{` opens a span that parses as nothing useful; the
        // exhaustive strategy must find the real object after it.
        let text = r#"braces { are fine } ... {"summary": "real"}"#;
        let result = analysis_extractor().extract(text).unwrap();
        assert_eq!(result.json.unwrap()["summary"], "real");
    }

    #[test]
    fn test_preamble_then_truncated_object() {
        let text = r#"Here is the analysis you asked for: {"summary": {"overview": "x", "purpose":"#;
        let result = analysis_extractor().extract(text).unwrap();
        assert!(result.is_truncated);
        assert_eq!(result.json.unwrap()["summary"]["overview"], "x");
    }

    #[test]
    fn test_truncated_mid_value_reports_missing_closers() {
        let result = analysis_extractor()
            .extract(r#"{"summary":{"overview":"x", "purpose":"#)
            .unwrap();
        assert!(result.is_truncated);
        assert_eq!(result.missing_close_count, 2);
        assert_eq!(result.json.unwrap()["summary"]["overview"], "x");
    }

    #[test]
    fn test_truncated_mid_string_value() {
        let result = analysis_extractor()
            .extract(r#"{"summary": {"overview": "a long descri"#)
            .unwrap();
        assert!(result.is_truncated);
        let value = result.json.unwrap();
        assert_eq!(value["summary"]["overview"], "a long descri");
    }

    #[test]
    fn test_truncated_mid_key_drops_partial_key() {
        let result = analysis_extractor()
            .extract(r#"{"summary": {"overview": "x"}, "frame"#)
            .unwrap();
        assert!(result.is_truncated);
        let value = result.json.unwrap();
        assert_eq!(value["summary"]["overview"], "x");
        assert!(value.get("frame").is_none());
    }

    #[test]
    fn test_truncated_inside_array() {
        let result = analysis_extractor()
            .extract(r#"{"frameworks": ["axum", "tokio","#)
            .unwrap();
        assert!(result.is_truncated);
        let value = result.json.unwrap();
        assert_eq!(value["frameworks"], json!(["axum", "tokio"]));
    }

    #[test]
    fn test_repair_preserves_leading_fields_at_any_cut() {
        // Truncation repair must either recover the complete leading fields
        // intact or fail; it must never corrupt them.
        let original = r#"{"summary": "web service", "language": "rust", "frameworks": ["axum"]}"#;
        let extractor = analysis_extractor();
        for cut in 20..original.len() {
            if !original.is_char_boundary(cut) {
                continue;
            }
            let Ok(result) = extractor.extract(&original[..cut]) else {
                continue;
            };
            let value = result.json.unwrap();
            if let Some(summary) = value.get("summary").and_then(Value::as_str) {
                // Complete leading field: must match the original exactly
                if cut > original.find(", \"language\"").unwrap() {
                    assert_eq!(summary, "web service", "corrupted at cut {cut}");
                }
            }
        }
    }

    #[test]
    fn test_not_json_at_all() {
        let err = analysis_extractor()
            .extract("I cannot analyze this repository.")
            .unwrap_err();
        assert!(matches!(err, ParseFailure::Malformed { .. }));
        assert!(!err.preview().is_empty());
    }

    #[test]
    fn test_truncated_garbage_classified_as_truncated() {
        // No strategy can recover this, but the open/close imbalance tells
        // the caller the output was cut off rather than wrong-format.
        let err = analysis_extractor()
            .extract(r#"{"unexpected_shape": {"deep": {"#)
            .unwrap_err();
        match err {
            ParseFailure::Truncated {
                missing_close_count,
                ..
            } => assert_eq!(missing_close_count, 3),
            other => panic!("expected Truncated, got {other:?}"),
        }
    }

    #[test]
    fn test_failure_preview_is_bounded() {
        let text = "prose ".repeat(200);
        let err = analysis_extractor().extract(&text).unwrap_err();
        assert!(err.preview().len() <= PREVIEW_BYTES);
    }

    #[test]
    fn test_any_object_accepts_unknown_keys() {
        let result = Extractor::any_object()
            .extract(r#"{"whatever": 1}"#)
            .unwrap();
        assert_eq!(result.json.unwrap()["whatever"], 1);
    }

    #[test]
    fn test_scan_balanced_ignores_in_string_braces() {
        let text = r#"{"a": "}}}}"}"#;
        match scan_balanced(text, 0).unwrap() {
            Scan::Complete { end } => assert_eq!(end, text.len()),
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn test_scan_balanced_escaped_quote_stays_in_string() {
        // The escaped quote must not close the string; depth stays 1
        let text = r#"{"a": "b\"{" "#;
        match scan_balanced(text, 0).unwrap() {
            Scan::Truncated { depth } => assert_eq!(depth, 1),
            other => panic!("expected Truncated, got {other:?}"),
        }
    }

    #[test]
    fn test_repair_is_idempotent() {
        let fragment = r#"{"summary": {"overview": "x","#;
        let first = repair_fragment(fragment).unwrap();
        let second = repair_fragment(&first).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_dangling_colon_becomes_null() {
        let repaired = repair_fragment(r#"{"summary":"#).unwrap();
        let value: Value = serde_json::from_str(&repaired).unwrap();
        assert!(value["summary"].is_null());
    }
}
