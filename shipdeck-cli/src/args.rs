//! CLI argument parsing

use clap::{ArgAction, Parser};
use shipdeck_core::config::{DispatchMode, ShipdeckConfig, parse_assignment};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "shipdeck")]
#[command(author, version, about = "MCP server exposing security and DevOps CLI tools")]
pub struct Args {
    /// Tools to expose: all, a category (security, supply-chain, kubernetes) or a family
    #[arg(default_value = "all")]
    pub selection: String,

    /// Print the selected tools and exit
    #[arg(long)]
    pub list: bool,

    /// Path to configuration file
    #[arg(short, long, env = "SHIPDECK_CONFIG")]
    pub config: Option<PathBuf>,

    /// HTTP port; 0 serves over stdio
    #[arg(short, long)]
    pub port: Option<u16>,

    /// HTTP bind host
    #[arg(long)]
    pub host: Option<String>,

    /// Where commands run (container, process, dry-run)
    #[arg(long)]
    pub dispatch: Option<String>,

    /// Directory mounted or used as working directory for every run
    #[arg(short, long)]
    pub workspace: Option<PathBuf>,

    /// Environment variable for every run (KEY=VALUE, repeatable)
    #[arg(long = "var", action = ArgAction::Append)]
    pub vars: Vec<String>,

    /// Container image override (PROGRAM=IMAGE, repeatable)
    #[arg(long = "image-tag", action = ArgAction::Append)]
    pub image_tags: Vec<String>,

    /// Append successful tool output to this file
    #[arg(long)]
    pub output_file: Option<PathBuf>,

    /// Append one line per invocation to this file
    #[arg(long)]
    pub execution_log: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Overlay command line flags onto a loaded configuration
    pub fn apply(&self, config: &mut ShipdeckConfig) -> shipdeck_core::Result<()> {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.host {
            config.server.host.clone_from(host);
        }
        if let Some(mode) = &self.dispatch {
            config.execution.dispatch = mode.parse::<DispatchMode>()?;
        }
        if let Some(workspace) = &self.workspace {
            config.execution.workspace.clone_from(workspace);
        }
        for raw in &self.vars {
            let (key, value) = parse_assignment(raw)?;
            config.execution.env.insert(key, value);
        }
        for raw in &self.image_tags {
            let (program, image) = parse_assignment(raw)?;
            config.images.insert(program, image);
        }
        if self.output_file.is_some() {
            config.output.output_file.clone_from(&self.output_file);
        }
        if self.execution_log.is_some() {
            config.output.execution_log.clone_from(&self.execution_log);
        }
        Ok(())
    }

    /// Default log filter for the verbosity flag
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}
