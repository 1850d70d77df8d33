//! Turning command outcomes into MCP tool results

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Result;
use crate::dispatch::ExecOutput;
use crate::mcp::McpToolResult;

/// Envelope status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

/// Normalized JSON result shared by envelope tools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub status: Status,
    pub stdout: String,
    pub stderr: String,
    pub artifacts: BTreeMap<String, String>,
    pub summary: Map<String, Value>,
    pub diagnostics: Vec<String>,
}

impl Envelope {
    pub fn ok(output: &ExecOutput) -> Self {
        Self {
            status: Status::Ok,
            stdout: output.stdout.clone(),
            stderr: output.stderr.clone(),
            artifacts: BTreeMap::new(),
            summary: Map::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            stdout: String::new(),
            stderr: message.into(),
            artifacts: BTreeMap::new(),
            summary: Map::new(),
            diagnostics: vec![diagnostic.into()],
        }
    }

    /// Serialized as the single text item of a tool result
    pub fn into_tool_result(self) -> McpToolResult {
        let is_error = self.status == Status::Error;
        let text = serde_json::to_string_pretty(&self).unwrap_or_else(|e| {
            serde_json::json!({
                "status": "error",
                "stdout": "",
                "stderr": e.to_string(),
                "artifacts": {},
                "summary": {},
                "diagnostics": ["failed to serialize result envelope"],
            })
            .to_string()
        });
        if is_error {
            McpToolResult::error(text)
        } else {
            McpToolResult::text(text)
        }
    }
}

/// How a non-zero exit is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitPolicy {
    /// Any non-zero exit is a failure
    #[default]
    Strict,
    /// Non-zero exit with output means findings were reported
    Findings,
}

impl ExitPolicy {
    pub fn accepts(self, output: &ExecOutput) -> bool {
        output.success()
            || (self == Self::Findings && output.exit_code > 0 && !output.stdout.trim().is_empty())
    }
}

/// Plain text result for a command outcome
pub fn text_result(
    label: &str,
    outcome: &Result<ExecOutput>,
    policy: ExitPolicy,
    max_chars: usize,
) -> McpToolResult {
    match outcome {
        Ok(output) if policy.accepts(output) => {
            let text = output.output();
            if text.trim().is_empty() {
                McpToolResult::text("Command completed successfully (no output)")
            } else {
                McpToolResult::text(limit_response(&text, max_chars))
            }
        }
        Ok(output) => McpToolResult::error(limit_response(
            &format!(
                "Command failed: exit status {}\n\nOutput:\n{}",
                output.exit_code,
                output.output()
            ),
            max_chars,
        )),
        Err(e) => McpToolResult::error(format!("{label} failed: {e}")),
    }
}

/// Envelope for a command outcome; `finish` fills artifacts and summary on success
pub fn envelope_result<F>(
    label: &str,
    outcome: &Result<ExecOutput>,
    policy: ExitPolicy,
    finish: F,
) -> Envelope
where
    F: FnOnce(&mut Envelope),
{
    match outcome {
        Ok(output) if policy.accepts(output) => {
            let mut envelope = Envelope::ok(output);
            finish(&mut envelope);
            envelope
        }
        Ok(output) => {
            let message = if output.stderr.trim().is_empty() {
                format!("exit status {}", output.exit_code)
            } else {
                output.stderr.clone()
            };
            let mut envelope = Envelope::error(
                message,
                format!("{label} exited with status {}", output.exit_code),
            );
            envelope.stdout = output.stdout.clone();
            envelope
        }
        Err(e) => Envelope::error(e.to_string(), format!("{label} failed: {e}")),
    }
}

/// Lowercased severity tally. `critical` and `high` are always present.
pub fn count_severities<'a, I>(severities: I) -> Map<String, Value>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    counts.insert("critical".into(), 0);
    counts.insert("high".into(), 0);
    let mut total = 0u64;
    for severity in severities {
        *counts.entry(severity.to_lowercase()).or_insert(0) += 1;
        total += 1;
    }
    let mut summary: Map<String, Value> = counts
        .into_iter()
        .map(|(k, v)| (k, Value::from(v)))
        .collect();
    summary.insert("total".into(), Value::from(total));
    summary
}

/// Severity rank, higher is worse; unknown labels rank lowest
pub fn severity_rank(severity: &str) -> u8 {
    match severity.to_lowercase().as_str() {
        "critical" => 5,
        "high" => 4,
        "medium" => 3,
        "low" => 2,
        "negligible" => 1,
        _ => 0,
    }
}

/// Replace oversized text with a chunked summary and a preview
pub fn limit_response(text: &str, max_chars: usize) -> String {
    let total_chars = text.chars().count();
    if max_chars == 0 || total_chars <= max_chars {
        return text.to_string();
    }

    let chunks = split_chunks(text, max_chars);
    let first = chunks.first().copied().unwrap_or_default();
    let preview: String = first.chars().take(max_chars / 4).collect();

    format!(
        "Output too large for a single response.\n\n\
         Total size: {} characters (~{} tokens)\n\
         Chunks: {}\n\
         Content type: {}\n\n\
         Preview of first chunk:\n{}\n\n\
         [{} more characters not shown; narrow the query or write results to a file]",
        total_chars,
        total_chars / 4,
        chunks.len(),
        classify(first),
        preview,
        total_chars - preview.chars().count(),
    )
}

/// Split on line boundaries so that each chunk holds at most `max_chars`
/// characters, except for single lines that are longer on their own.
fn split_chunks(text: &str, max_chars: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut chars_in_chunk = 0;
    let mut last_break = None;

    for (idx, ch) in text.char_indices() {
        chars_in_chunk += 1;
        if ch == '\n' {
            last_break = Some(idx + 1);
        }
        if chars_in_chunk >= max_chars {
            let end = last_break.filter(|b| *b > start).unwrap_or(idx + ch.len_utf8());
            chunks.push(&text[start..end]);
            chars_in_chunk = text[end..idx + ch.len_utf8()].chars().count();
            start = end;
            last_break = None;
        }
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

fn classify(chunk: &str) -> &'static str {
    let trimmed = chunk.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        "JSON"
    } else if trimmed.starts_with('<') {
        "XML"
    } else if chunk.lines().take(5).any(|l| l.contains('│') || l.contains('|')) {
        "table"
    } else {
        "text"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::Error;

    fn out(stdout: &str, stderr: &str, code: i64) -> Result<ExecOutput> {
        Ok(ExecOutput {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code: code,
        })
    }

    fn text_of(result: &McpToolResult) -> String {
        result.text_content()
    }

    #[test]
    fn test_text_success() {
        let result = text_result("trivy", &out("clean", "", 0), ExitPolicy::Strict, 1000);
        assert!(result.is_error.is_none());
        assert_eq!(text_of(&result), "clean");
    }

    #[test]
    fn test_text_empty_success() {
        let result = text_result("trivy", &out("", "", 0), ExitPolicy::Strict, 1000);
        assert!(text_of(&result).contains("no output"));
    }

    #[test]
    fn test_text_nonzero_strict_is_error() {
        let result = text_result("grype", &out("", "db missing", 1), ExitPolicy::Strict, 1000);
        assert_eq!(result.is_error, Some(true));
        let text = text_of(&result);
        assert!(text.starts_with("Command failed: exit status 1"));
        assert!(text.contains("db missing"));
    }

    #[test]
    fn test_text_nonzero_findings_is_success() {
        let result = text_result(
            "conftest",
            &out("FAIL - deny", "", 1),
            ExitPolicy::Findings,
            1000,
        );
        assert!(result.is_error.is_none());
        assert_eq!(text_of(&result), "FAIL - deny");
    }

    #[test]
    fn test_text_findings_without_output_is_error() {
        let result = text_result("conftest", &out("", "panic", 2), ExitPolicy::Findings, 1000);
        assert_eq!(result.is_error, Some(true));
    }

    #[test]
    fn test_text_dispatch_error_relayed() {
        let outcome = Err(Error::Dispatch("'trivy' not found in PATH".into()));
        let result = text_result("trivy_scan_image", &outcome, ExitPolicy::Strict, 1000);
        assert_eq!(result.is_error, Some(true));
        assert_eq!(
            text_of(&result),
            "trivy_scan_image failed: Dispatch error: 'trivy' not found in PATH"
        );
    }

    #[test]
    fn test_envelope_error_is_valid_json() {
        let outcome = Err(Error::Dispatch("boom".into()));
        let envelope = envelope_result("Grype scan", &outcome, ExitPolicy::Strict, |_| {});
        let result = envelope.into_tool_result();
        let parsed: Value = serde_json::from_str(&text_of(&result)).unwrap();
        assert_eq!(parsed["status"], "error");
        assert_eq!(parsed["stderr"], "Dispatch error: boom");
        assert_eq!(parsed["diagnostics"][0], "Grype scan failed: Dispatch error: boom");
        assert_eq!(parsed["summary"], serde_json::json!({}));
    }

    #[test]
    fn test_envelope_success_runs_finish() {
        let envelope = envelope_result("Syft SBOM", &out("{}", "", 0), ExitPolicy::Strict, |e| {
            e.artifacts.insert("sbom".into(), "./sbom.json".into());
        });
        assert_eq!(envelope.status, Status::Ok);
        assert_eq!(envelope.artifacts["sbom"], "./sbom.json");
    }

    #[test]
    fn test_envelope_nonzero_without_stderr() {
        let envelope = envelope_result("Syft SBOM", &out("", "", 2), ExitPolicy::Strict, |_| {});
        assert_eq!(envelope.status, Status::Error);
        assert_eq!(envelope.stderr, "exit status 2");
        assert_eq!(envelope.diagnostics, vec!["Syft SBOM exited with status 2"]);
    }

    #[test]
    fn test_count_severities() {
        let summary = count_severities(["Critical", "HIGH", "high", "Low"]);
        assert_eq!(summary["critical"], 1);
        assert_eq!(summary["high"], 2);
        assert_eq!(summary["low"], 1);
        assert_eq!(summary["total"], 4);

        let empty = count_severities(std::iter::empty());
        assert_eq!(empty["critical"], 0);
        assert_eq!(empty["high"], 0);
    }

    #[test]
    fn test_limit_response_passthrough() {
        assert_eq!(limit_response("small", 100), "small");
    }

    #[test]
    fn test_limit_response_summarizes() {
        let text = "line of output\n".repeat(100);
        let limited = limit_response(&text, 200);
        assert!(limited.starts_with("Output too large"));
        assert!(limited.contains("Total size: 1500 characters"));
        assert!(limited.contains("Chunks: 8"));
        assert!(limited.contains("Content type: text"));
        assert!(limited.len() < text.len());
    }

    #[test]
    fn test_split_chunks_on_line_boundaries() {
        let text = "aaaa\nbbbb\ncccc\n";
        let chunks = split_chunks(text, 7);
        assert_eq!(chunks, vec!["aaaa\n", "bbbb\n", "cccc\n"]);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_split_chunks_long_line() {
        let text = "abcdefghij";
        let chunks = split_chunks(text, 4);
        assert_eq!(chunks.concat(), text);
        assert!(chunks.iter().all(|c| c.chars().count() <= 4));
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("  {\"a\":1}"), "JSON");
        assert_eq!(classify("<xml/>"), "XML");
        assert_eq!(classify("| a | b |\n"), "table");
    }
}
