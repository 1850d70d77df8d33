//! Local process dispatch

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::Duration;
use tracing::{debug, warn};

use crate::dispatch::{CommandDispatcher, ExecOutput, Invocation, MAX_OUTPUT_SIZE, push_capped};
use crate::{Error, Result};

/// Runs commands as child processes of the server
pub struct ProcessDispatcher {
    workspace: PathBuf,
    timeout_secs: u64,
}

impl ProcessDispatcher {
    pub fn new(workspace: PathBuf, timeout_secs: u64) -> Self {
        Self {
            workspace,
            timeout_secs,
        }
    }
}

#[async_trait]
impl CommandDispatcher for ProcessDispatcher {
    fn name(&self) -> &str {
        "process"
    }

    async fn execute(&self, invocation: &Invocation) -> Result<ExecOutput> {
        let (program, args) = invocation
            .argv
            .split_first()
            .ok_or_else(|| Error::Dispatch("empty argument vector".to_string()))?;

        debug!("Executing locally: {}", invocation.command_line());

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(&invocation.env)
            .current_dir(&self.workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::Dispatch(format!("'{program}' not found in PATH"))
            }
            _ => Error::Dispatch(format!("failed to start '{program}': {e}")),
        })?;
        let out_pipe = child.stdout.take();
        let err_pipe = child.stderr.take();

        let timeout = Duration::from_secs(self.timeout_secs);
        let run = async {
            let (out, err, status) = tokio::join!(
                read_bounded(out_pipe),
                read_bounded(err_pipe),
                child.wait()
            );
            Ok::<_, std::io::Error>((out?, err?, status?))
        };
        let (out, err, status) = match tokio::time::timeout(timeout, run).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "Command execution timed out after {} seconds",
                    self.timeout_secs
                );
                return Ok(ExecOutput {
                    stdout: String::new(),
                    stderr: format!("Command timed out after {} seconds", self.timeout_secs),
                    exit_code: -1,
                });
            }
        };

        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut total = 0usize;
        if push_capped(&mut stdout, &mut total, &String::from_utf8_lossy(&out)) {
            push_capped(&mut stderr, &mut total, &String::from_utf8_lossy(&err));
        }

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code: status.code().map(i64::from).unwrap_or(-1),
        })
    }
}

/// Drain a pipe to EOF, keeping at most one byte past the output cap
async fn read_bounded<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut kept = Vec::new();
    let Some(mut pipe) = pipe else {
        return Ok(kept);
    };
    let mut chunk = [0u8; 8192];
    loop {
        let n = pipe.read(&mut chunk).await?;
        if n == 0 {
            return Ok(kept);
        }
        let room = (MAX_OUTPUT_SIZE + 1).saturating_sub(kept.len());
        kept.extend_from_slice(chunk.get(..n.min(room)).unwrap_or_default());
    }
}
