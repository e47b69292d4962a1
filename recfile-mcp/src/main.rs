//! Recfile MCP Server
//!
//! A Model Context Protocol (MCP) server that exposes recutils databases
//! to AI agents over stdio transport.
//!
//! ## Usage
//!
//! ```bash
//! # Start with recutils from PATH
//! recfile-mcp
//!
//! # Use a specific recutils installation and a longer command timeout
//! recfile-mcp --recutils-dir /opt/recutils/bin --timeout-secs 60
//!
//! # Enable verbose logging to a file
//! recfile-mcp --verbose --log-file /tmp/recfile-mcp.log
//! ```
//!
//! ## MCP Configuration
//!
//! Add to your MCP client configuration (e.g., Claude Desktop):
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "recutils": {
//!       "command": "recfile-mcp",
//!       "args": ["--timeout-secs", "30"]
//!     }
//!   }
//! }
//! ```
//!
//! ## Available Tools
//!
//! - **recutils_query**: Select records with an optional expression and output format
//! - **recutils_insert**: Append a record, creating the database if needed
//! - **recutils_update**: Change fields of every matching record
//! - **recutils_delete**: Remove every matching record
//! - **recutils_info**: Record types and counts

use anyhow::{Context, Result};
use clap::Parser;
use recfile::mcp::McpServer;
use recfile::EngineConfig;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Recfile MCP Server - Expose recutils databases to AI agents via Model Context Protocol
#[derive(Parser, Debug)]
#[command(name = "recfile-mcp")]
#[command(
    author,
    version,
    about = "Recfile MCP Server - Model Context Protocol interface for recutils databases"
)]
struct Args {
    /// Directory holding recsel, recinf and rec2csv (default: search PATH)
    #[arg(long, env = "RECFILE_RECUTILS_DIR")]
    recutils_dir: Option<PathBuf>,

    /// Timeout for each recutils command, in seconds
    #[arg(long, env = "RECFILE_TIMEOUT_SECS", default_value = "30")]
    timeout_secs: u64,

    /// How long a mutation waits for the database lock, in seconds
    #[arg(long, env = "RECFILE_LOCK_TIMEOUT_SECS", default_value = "10")]
    lock_timeout_secs: u64,

    /// Do not take the advisory lock around insert/update/delete
    #[arg(long)]
    no_lock: bool,

    /// Append logs to this file instead of stderr
    #[arg(long, env = "RECFILE_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

impl Args {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            recutils_dir: self.recutils_dir.clone(),
            command_timeout: Duration::from_secs(self.timeout_secs),
            lock_timeout: Duration::from_secs(self.lock_timeout_secs),
            use_lock: !self.no_lock,
        }
    }
}

fn init_logging(args: &Args) -> Result<()> {
    // RUST_LOG wins; otherwise stay quiet so logs never compete with the protocol
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if args.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("error")
        }
    });

    let (file_layer, stderr_layer) = match &args.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
            (Some(layer), None)
        }
        None => (None, Some(fmt::layer().with_writer(std::io::stderr))),
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(filter)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let config = args.engine_config();
    tracing::info!(
        "Starting Recfile MCP server (recutils: {}, timeout: {:?}, lock: {})",
        config
            .recutils_dir
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "PATH".to_string()),
        config.command_timeout,
        config.use_lock
    );

    let server = McpServer::new(config);
    tokio::select! {
        result = server.run() => result?,
        _ = shutdown_signal() => {
            tracing::info!("Signal received, shutting down");
        }
    }

    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        // Test default args
        let args = Args::try_parse_from(["recfile-mcp"]).unwrap();
        assert!(args.recutils_dir.is_none());
        assert_eq!(args.timeout_secs, 30);
        assert_eq!(args.lock_timeout_secs, 10);
        assert!(!args.no_lock);
        assert!(!args.verbose);

        // Test with recutils dir
        let args =
            Args::try_parse_from(["recfile-mcp", "--recutils-dir", "/opt/recutils/bin"]).unwrap();
        assert_eq!(args.recutils_dir, Some(PathBuf::from("/opt/recutils/bin")));

        // Test with verbose
        let args = Args::try_parse_from(["recfile-mcp", "-v"]).unwrap();
        assert!(args.verbose);
    }

    #[test]
    fn test_engine_config_from_args() {
        let args = Args::try_parse_from([
            "recfile-mcp",
            "--timeout-secs",
            "5",
            "--lock-timeout-secs",
            "2",
            "--no-lock",
        ])
        .unwrap();
        let config = args.engine_config();
        assert_eq!(config.command_timeout, Duration::from_secs(5));
        assert_eq!(config.lock_timeout, Duration::from_secs(2));
        assert!(!config.use_lock);
        assert_eq!(config.program("recsel"), PathBuf::from("recsel"));
    }

    #[test]
    fn test_invalid_timeout_rejected() {
        let result = Args::try_parse_from(["recfile-mcp", "--timeout-secs", "soon"]);
        assert!(result.is_err());
    }
}
