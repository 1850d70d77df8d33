//! Command dispatch: where a fully formed argument vector actually runs

pub mod images;
pub mod process;
pub mod recording;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;
use crate::config::{DispatchMode, ShipdeckConfig};
use crate::docker::{ContainerConfig, ContainerDispatcher};

pub use images::{ImageSpec, ImageTable};
pub use process::ProcessDispatcher;
pub use recording::RecordingDispatcher;

/// Maximum captured output size in bytes (10MB)
pub(crate) const MAX_OUTPUT_SIZE: usize = 10_485_760;

pub(crate) const TRUNCATION_MARKER: &str = "\n[OUTPUT TRUNCATED - exceeded 10MB limit]";

/// One ready-to-run command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// MCP tool that produced this command
    pub tool: String,
    pub argv: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl Invocation {
    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }
}

/// Result of running a command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
}

impl ExecOutput {
    /// Check if command succeeded
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Get combined output
    pub fn output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Runs argument vectors.
///
/// `Err` means the command could not be run at all. A command that ran and
/// exited non-zero is `Ok` with its exit code.
#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    /// Short label used in logs
    fn name(&self) -> &str;

    async fn execute(&self, invocation: &Invocation) -> Result<ExecOutput>;
}

/// Build the dispatcher selected by configuration
pub async fn from_config(config: &ShipdeckConfig) -> Result<Arc<dyn CommandDispatcher>> {
    let execution = &config.execution;
    let dispatcher: Arc<dyn CommandDispatcher> = match execution.dispatch {
        DispatchMode::Process => Arc::new(ProcessDispatcher::new(
            execution.workspace.clone(),
            execution.timeout_secs,
        )),
        DispatchMode::Container => {
            let images = ImageTable::default()
                .with_overrides(&config.images)
                .with_env_overrides(|name| std::env::var(name).ok());
            let container = ContainerConfig::from_execution(execution)?;
            Arc::new(ContainerDispatcher::connect(container, images).await?)
        }
        DispatchMode::DryRun => Arc::new(RecordingDispatcher::new()),
    };
    Ok(dispatcher)
}

/// Append a chunk to a capped buffer; returns false once the cap has been hit.
///
/// A chunk crossing the cap keeps its prefix up to the cap (on a char
/// boundary) followed by the truncation marker.
pub(crate) fn push_capped(buf: &mut String, total: &mut usize, chunk: &str) -> bool {
    let room = MAX_OUTPUT_SIZE.saturating_sub(*total);
    *total += chunk.len();
    if chunk.len() <= room {
        buf.push_str(chunk);
        return true;
    }
    let mut end = room;
    while !chunk.is_char_boundary(end) {
        end -= 1;
    }
    buf.push_str(chunk.get(..end).unwrap_or_default());
    buf.push_str(TRUNCATION_MARKER);
    false
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_output_combines_streams() {
        let out = ExecOutput {
            stdout: "out".into(),
            stderr: "err".into(),
            exit_code: 1,
        };
        assert!(!out.success());
        assert_eq!(out.output(), "out\nerr");

        let only_err = ExecOutput {
            stderr: "err".into(),
            ..Default::default()
        };
        assert!(only_err.success());
        assert_eq!(only_err.output(), "err");
    }

    #[test]
    fn test_push_capped_marks_truncation() {
        let mut buf = String::new();
        let mut total = MAX_OUTPUT_SIZE - 2;
        assert!(push_capped(&mut buf, &mut total, "ab"));
        assert!(!push_capped(&mut buf, &mut total, "c"));
        assert_eq!(buf, format!("ab{TRUNCATION_MARKER}"));
    }

    #[test]
    fn test_push_capped_keeps_prefix_of_oversized_chunk() {
        let mut buf = String::new();
        let mut total = MAX_OUTPUT_SIZE - 3;
        assert!(!push_capped(&mut buf, &mut total, "xyzw"));
        assert_eq!(buf, format!("xyz{TRUNCATION_MARKER}"));

        // never splits a multi-byte char
        let mut buf = String::new();
        let mut total = MAX_OUTPUT_SIZE - 1;
        assert!(!push_capped(&mut buf, &mut total, "é"));
        assert_eq!(buf, TRUNCATION_MARKER);
    }

    #[test]
    fn test_invocation_program() {
        let inv = Invocation {
            tool: "grype_version".into(),
            argv: vec!["grype".into(), "version".into()],
            env: BTreeMap::new(),
        };
        assert_eq!(inv.program(), Some("grype"));
        assert_eq!(inv.command_line(), "grype version");
    }
}
