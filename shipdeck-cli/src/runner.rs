//! Server runner: configuration, dispatcher, catalog and transport

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use shipdeck_core::config::ShipdeckConfig;
use shipdeck_core::dispatch;
use shipdeck_core::mcp::{HttpMcpServer, McpServer, serve_stdio};
use shipdeck_core::tools::{Selection, ToolContext, register_selection};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::args::Args;

/// Write the selected families and their tools
pub fn print_catalog(selection: &Selection, out: &mut impl Write) -> std::io::Result<()> {
    for family in selection.families() {
        let specs = (family.tools)();
        writeln!(
            out,
            "{} [{}] - {} ({} tools)",
            family.name,
            family.category,
            family.description,
            specs.len()
        )?;
        for spec in &specs {
            writeln!(out, "  {:<42} {}", spec.name(), spec.schema.description)?;
        }
    }
    Ok(())
}

/// Resolved configuration: file cascade, then command line flags
pub fn load_config(args: &Args) -> Result<ShipdeckConfig> {
    let mut config = ShipdeckConfig::load(args.config.as_deref())?;
    args.apply(&mut config)?;
    config.expand_env_vars();
    Ok(config)
}

/// Build the server for `selection` with every tool registered
pub async fn build_server(config: &ShipdeckConfig, selection: &Selection) -> Result<McpServer> {
    let dispatcher = dispatch::from_config(config)
        .await
        .context("failed to set up command dispatcher")?;
    let ctx = Arc::new(ToolContext::from_config(config, Arc::clone(&dispatcher)));

    let server = McpServer::new(
        config.server_name(selection.label()),
        env!("CARGO_PKG_VERSION"),
    )
    .with_conflict_policy(config.server.conflict_policy);
    let count = register_selection(&server, selection, ctx).await?;
    info!(
        server = server.name(),
        dispatcher = dispatcher.name(),
        "Registered {} tools",
        count
    );
    Ok(server)
}

/// Run until stdin closes (stdio) or Ctrl-C (either transport)
pub async fn run(args: Args) -> Result<()> {
    let selection = Selection::parse(&args.selection)?;
    if args.list {
        print_catalog(&selection, &mut std::io::stdout().lock())?;
        return Ok(());
    }

    let config = load_config(&args)?;
    let server = build_server(&config, &selection).await?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        info!("Interrupted, shutting down");
        on_signal.cancel();
    });

    if config.server.port == 0 {
        info!("Serving MCP over stdio");
        serve_stdio(&server, cancel).await?;
        return Ok(());
    }

    let addr = tokio::net::lookup_host((config.server.host.as_str(), config.server.port))
        .await?
        .next()
        .with_context(|| format!("cannot resolve {}", config.server.host))?;
    let http = HttpMcpServer::start(Arc::new(server), addr).await?;
    println!("shipdeck MCP server listening on {}", http.url());
    cancel.cancelled().await;
    http.shutdown().await;
    Ok(())
}
