//! Shell Daemon - Headless Surface Registry
//!
//! Runs a complete shell (owner transport, sender guard, view registry) over
//! the headless surface backend and drives it with a command script, one
//! JSON result per line on stdout. Useful for exercising registry behavior
//! without a windowing toolkit.
//!
//! # Usage
//!
//! ```bash
//! # Read commands from stdin
//! shell-daemon
//!
//! # Run a script file
//! shell-daemon --script demo.shell
//!
//! # With config file and a shorter request timeout
//! shell-daemon --config ~/.config/surf-shell/shell.toml --timeout-ms 5000
//!
//! # Verbose logging
//! RUST_LOG=debug shell-daemon
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: destroy every view and exit

mod script;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use shell_core::view::{HeadlessFactory, HeadlessHost, SurfaceFactory, SurfaceHost};
use shell_core::{
    load_config_from_path, ConfigOverrides, FirstPartySurface, Shell, ShellBuilder,
};

use script::ScriptRunner;

/// Shell Daemon - headless surface registry driven by a command script
#[derive(Parser, Debug)]
#[command(name = "shell-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "SHELL_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Command script to run; stdin when absent
    #[arg(short = 's', long, value_name = "FILE")]
    script: Option<PathBuf>,

    /// Reverse request timeout in milliseconds
    #[arg(short = 't', long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Session partition for views
    #[arg(long, value_name = "NAME")]
    view_partition: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "SHELL_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

/// Initialize logging with the specified level
///
/// Logs go to stderr so stdout carries only command results.
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("shell_daemon={level},shell_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

/// Build a started shell over the headless backend
fn build_shell(args: &Args) -> Result<Shell> {
    let mut config = load_config_from_path(args.config.clone())
        .with_context(|| format!("Failed to load config: {:?}", args.config))?;

    let mut overrides = ConfigOverrides::new();
    if let Some(timeout_ms) = args.timeout_ms {
        overrides = overrides.with_request_timeout_ms(timeout_ms);
    }
    if let Some(partition) = &args.view_partition {
        overrides = overrides.with_view_partition(partition.clone());
    }
    overrides.apply(&mut config);
    info!(source = %config.source(), path = ?config.config_file_path, "Configuration loaded");

    let host = HeadlessHost::new();
    let factory = HeadlessFactory::new(&host);
    let shell = ShellBuilder::new(config)
        .with_host(host as Arc<dyn SurfaceHost>)
        .with_factory(factory as Arc<dyn SurfaceFactory>)
        .build()
        .context("Failed to build shell")?;
    shell.start();
    Ok(shell)
}

/// Run commands until the input ends
async fn run_commands(runner: &ScriptRunner<'_>, script: Option<&PathBuf>) -> Result<()> {
    if let Some(path) = script {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read script: {path:?}"))?;
        runner
            .run_script(&text, |output| println!("{output}"))
            .await?;
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        // Interactive input keeps going after a bad line.
        match runner.run_line(&line).await {
            Ok(Some(output)) => println!("{output}"),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Command failed"),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("Shell Daemon starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let shell = build_shell(&args)?;
    let main_window = shell.spawn_controller(Some(FirstPartySurface::Main));
    main_window.client().on_view_event(|envelope| {
        info!(
            view_id = %envelope.view_id,
            event = envelope.event.kind().native_name(),
            "View event"
        );
    });

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

    let runner = ScriptRunner::new(&shell, &main_window);
    let result = tokio::select! {
        result = run_commands(&runner, args.script.as_ref()) => result,
        _ = sigterm.recv() => {
            info!("Received SIGTERM, initiating shutdown");
            Ok(())
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, initiating shutdown");
            Ok(())
        }
    };

    info!("Shutting down...");
    main_window.destroy();
    shell.shutdown();

    match result {
        Ok(()) => {
            info!("Shell daemon stopped cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Daemon stopped with error");
            Err(e)
        }
    }
}
