//! Ephemeral container dispatch for tool CLIs

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::LogOutput;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use futures::StreamExt;
use tokio::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ExecutionConfig;
use crate::dispatch::{CommandDispatcher, ExecOutput, ImageTable, Invocation, push_capped};
use crate::{Error, Result};

/// Mount point of the workspace inside every tool container
pub const CONTAINER_WORKDIR: &str = "/workspace";

/// Container settings shared by every run
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Absolute host path bound to [`CONTAINER_WORKDIR`]
    pub workspace: PathBuf,
    /// Extra `host:container[:mode]` binds
    pub volumes: Vec<String>,
    pub timeout_secs: u64,
    pub memory_limit: Option<i64>,
}

impl ContainerConfig {
    pub fn from_execution(execution: &ExecutionConfig) -> Result<Self> {
        let workspace = std::path::absolute(&execution.workspace).map_err(|e| {
            Error::Config(format!(
                "cannot resolve workspace {}: {}",
                execution.workspace.display(),
                e
            ))
        })?;
        if !workspace.is_dir() {
            warn!("Workspace is not a directory: {}", workspace.display());
        }
        Ok(Self {
            workspace,
            volumes: execution.volumes.clone(),
            timeout_secs: execution.timeout_secs,
            memory_limit: Some(4 * 1024 * 1024 * 1024),
        })
    }

    fn binds(&self) -> Vec<String> {
        let mut binds = vec![format!(
            "{}:{}",
            self.workspace.display(),
            CONTAINER_WORKDIR
        )];
        binds.extend(self.volumes.iter().cloned());
        binds
    }
}

/// Runs each invocation in a fresh container that is removed afterwards
pub struct ContainerDispatcher {
    docker: Docker,
    config: ContainerConfig,
    images: ImageTable,
}

impl ContainerDispatcher {
    /// Connect to the local Docker daemon and verify it answers
    pub async fn connect(config: ContainerConfig, images: ImageTable) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;

        docker.ping().await.map_err(|e| {
            Error::Docker(bollard::errors::Error::DockerResponseServerError {
                status_code: 500,
                message: format!("Cannot connect to Docker: {}", e),
            })
        })?;

        Ok(Self {
            docker,
            config,
            images,
        })
    }

    /// Check if an image is present locally
    pub async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Pull the image unless it is already present
    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.image_exists(image).await? {
            return Ok(());
        }

        info!("Pulling image: {}", image);
        let options = CreateImageOptions {
            from_image: Some(image.to_string()),
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            let progress = progress?;
            if let Some(detail) = progress.error_detail {
                let message = detail
                    .message
                    .unwrap_or_else(|| format!("failed to pull {image}"));
                return Err(Error::Dispatch(message));
            }
        }
        Ok(())
    }

    async fn create(&self, name: &str, invocation: &Invocation) -> Result<()> {
        let program = invocation
            .program()
            .ok_or_else(|| Error::Dispatch("empty argument vector".to_string()))?;
        let spec = self.images.resolve(program)?;
        self.ensure_image(&spec.image).await?;

        let env: Vec<String> = invocation
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        let host_config = HostConfig {
            binds: Some(self.config.binds()),
            memory: self.config.memory_limit,
            memory_swap: self.config.memory_limit,
            pids_limit: Some(2048),
            ..Default::default()
        };

        let body = ContainerCreateBody {
            image: Some(spec.image.clone()),
            entrypoint: Some(vec![spec.binary.clone()]),
            cmd: Some(invocation.argv.iter().skip(1).cloned().collect()),
            env: Some(env),
            working_dir: Some(CONTAINER_WORKDIR.to_string()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            labels: Some(HashMap::from([
                ("shipdeck.tool".to_string(), invocation.tool.clone()),
            ])),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: Some(name.to_string()),
            ..Default::default()
        };

        self.docker.create_container(Some(options), body).await?;
        debug!("Created container {} from {}", name, spec.image);
        Ok(())
    }

    /// Block until the container exits and return its status code
    async fn wait(&self, name: &str) -> Result<i64> {
        let mut stream = self
            .docker
            .wait_container(name, None::<WaitContainerOptions>);
        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(e.into()),
            None => Err(Error::Dispatch(format!(
                "container {name} ended without an exit status"
            ))),
        }
    }

    async fn collect_logs(&self, name: &str) -> (String, String) {
        let options = LogsOptions {
            stdout: true,
            stderr: true,
            follow: false,
            ..Default::default()
        };
        let mut stream = self.docker.logs(name, Some(options));

        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut total_size: usize = 0;
        let mut truncated = false;

        while let Some(msg) = stream.next().await {
            match msg {
                Ok(LogOutput::StdOut { message }) if !truncated => {
                    truncated = !push_capped(
                        &mut stdout,
                        &mut total_size,
                        &String::from_utf8_lossy(&message),
                    );
                }
                Ok(LogOutput::StdErr { message }) if !truncated => {
                    truncated = !push_capped(
                        &mut stderr,
                        &mut total_size,
                        &String::from_utf8_lossy(&message),
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Error reading container output: {}", e);
                    break;
                }
            }
        }
        (stdout, stderr)
    }

    async fn remove(&self, name: &str) {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        if let Err(e) = self.docker.remove_container(name, Some(options)).await {
            warn!("Failed to remove container {}: {}", name, e);
        }
    }

    async fn run(&self, name: &str) -> Result<ExecOutput> {
        self.docker
            .start_container(name, None::<StartContainerOptions>)
            .await?;

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let exit_code = match tokio::time::timeout(timeout, self.wait(name)).await {
            Ok(code) => code?,
            Err(_) => {
                warn!(
                    "Container {} timed out after {} seconds",
                    name, self.config.timeout_secs
                );
                let (stdout, _) = self.collect_logs(name).await;
                return Ok(ExecOutput {
                    stdout,
                    stderr: format!(
                        "Command timed out after {} seconds",
                        self.config.timeout_secs
                    ),
                    exit_code: -1,
                });
            }
        };

        let (stdout, stderr) = self.collect_logs(name).await;
        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code,
        })
    }
}

#[async_trait]
impl CommandDispatcher for ContainerDispatcher {
    fn name(&self) -> &str {
        "container"
    }

    async fn execute(&self, invocation: &Invocation) -> Result<ExecOutput> {
        let name = container_name(invocation);
        debug!("Running in {}: {}", name, invocation.command_line());

        self.create(&name, invocation).await?;
        let result = self.run(&name).await;
        self.remove(&name).await;
        result
    }
}

/// Unique, Docker-safe container name for one run
fn container_name(invocation: &Invocation) -> String {
    let program: String = invocation
        .program()
        .unwrap_or("tool")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let program = program.trim_matches('-');
    let program = if program.is_empty() { "tool" } else { program };
    format!("shipdeck-{}-{}", program, Uuid::new_v4().simple())
}
