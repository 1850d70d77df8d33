//! Append-only execution log and output file

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::Result;
use crate::config::OutputConfig;
use crate::dispatch::{ExecOutput, Invocation};

/// Record of one tool invocation
#[derive(Debug, Clone)]
pub struct JournalEntry {
    pub id: Uuid,
    pub tool: String,
    pub command_line: String,
    pub started_at: DateTime<Local>,
    started: Instant,
    pub duration_ms: u128,
    pub success: bool,
    pub output: Option<String>,
}

impl JournalEntry {
    pub fn begin(invocation: &Invocation) -> Self {
        Self {
            id: Uuid::new_v4(),
            tool: invocation.tool.clone(),
            command_line: invocation.command_line(),
            started_at: Local::now(),
            started: Instant::now(),
            duration_ms: 0,
            success: false,
            output: None,
        }
    }

    /// Record completion
    pub fn complete(&mut self, outcome: &Result<ExecOutput>, success: bool) {
        self.duration_ms = self.started.elapsed().as_millis();
        self.success = success;
        self.output = outcome.as_ref().ok().map(ExecOutput::output);
    }

    fn log_line(&self) -> String {
        format!(
            "[{}] {} tool={} argv={} duration={}ms success={}\n",
            self.started_at.format("%Y-%m-%d %H:%M:%S"),
            self.id,
            self.tool,
            self.command_line,
            self.duration_ms,
            self.success
        )
    }

    fn output_block(&self) -> Option<String> {
        let output = self.output.as_deref()?;
        let rule = "=".repeat(80);
        Some(format!(
            "{rule}\nTimestamp: {}\nTool: {}\nCommand: {}\nDuration: {}ms\n{rule}\n{}\n\n",
            self.started_at.format("%Y-%m-%d %H:%M:%S"),
            self.tool,
            self.command_line,
            self.duration_ms,
            output.trim_end()
        ))
    }
}

/// Optional append targets for invocation records.
///
/// Write failures are logged and never fail the tool call.
#[derive(Debug, Clone, Default)]
pub struct ExecutionJournal {
    execution_log: Option<PathBuf>,
    output_file: Option<PathBuf>,
    write_lock: Arc<Mutex<()>>,
}

impl ExecutionJournal {
    pub fn new(execution_log: Option<PathBuf>, output_file: Option<PathBuf>) -> Self {
        Self {
            execution_log,
            output_file,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_config(output: &OutputConfig) -> Self {
        Self::new(output.execution_log.clone(), output.output_file.clone())
    }

    pub fn is_enabled(&self) -> bool {
        self.execution_log.is_some() || self.output_file.is_some()
    }

    pub async fn record(&self, entry: &JournalEntry) {
        if !self.is_enabled() {
            return;
        }
        let _guard = self.write_lock.lock().await;

        if let Some(path) = &self.execution_log
            && let Err(e) = append(path, &entry.log_line()).await
        {
            warn!("Failed to write execution log {}: {}", path.display(), e);
        }

        if entry.success
            && let Some(path) = &self.output_file
            && let Some(block) = entry.output_block()
            && let Err(e) = append(path, &block).await
        {
            warn!("Failed to write output file {}: {}", path.display(), e);
        }
    }
}

async fn append(path: &Path, text: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(text.as_bytes()).await?;
    file.flush().await
}
