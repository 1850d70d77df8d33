//! Dispatcher that records invocations instead of running them.
//!
//! Backs `--dispatch dry-run` and doubles as the test dispatcher.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use crate::dispatch::{CommandDispatcher, ExecOutput, Invocation};
use crate::{Error, Result};

#[derive(Debug, Clone)]
enum Reply {
    /// Echo the command line on stdout with exit 0
    Echo,
    Output(ExecOutput),
    Fail(String),
}

/// Records every invocation and answers with a canned reply
#[derive(Debug)]
pub struct RecordingDispatcher {
    calls: Mutex<Vec<Invocation>>,
    reply: Reply,
}

impl Default for RecordingDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingDispatcher {
    /// Echo each command line back as stdout
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            reply: Reply::Echo,
        }
    }

    /// Reply with a fixed output
    pub fn with_output(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i64) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            reply: Reply::Output(ExecOutput {
                stdout: stdout.into(),
                stderr: stderr.into(),
                exit_code,
            }),
        }
    }

    /// Fail every call as if the command could not be started
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            reply: Reply::Fail(message.into()),
        }
    }

    pub async fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().await.clone()
    }

    pub async fn last_argv(&self) -> Option<Vec<String>> {
        self.calls.lock().await.last().map(|inv| inv.argv.clone())
    }
}

#[async_trait]
impl CommandDispatcher for RecordingDispatcher {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn execute(&self, invocation: &Invocation) -> Result<ExecOutput> {
        self.calls.lock().await.push(invocation.clone());
        match &self.reply {
            Reply::Echo => {
                info!("[dry-run] {}", invocation.command_line());
                Ok(ExecOutput {
                    stdout: invocation.command_line(),
                    ..Default::default()
                })
            }
            Reply::Output(output) => Ok(output.clone()),
            Reply::Fail(message) => Err(Error::Dispatch(message.clone())),
        }
    }
}
