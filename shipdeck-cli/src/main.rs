mod args;
mod runner;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::args::Args;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // stdout carries the stdio transport, so logs go to stderr
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("shipdeck={0},shipdeck_core={0}", args.log_level())));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    match runner::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast::<shipdeck_core::Error>() {
                Ok(core) => eprintln!("{:?}", miette::Report::new(core)),
                Err(other) => eprintln!("Error: {other:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
