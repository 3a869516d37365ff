//! Funcbox CLI
//!
//! A command-line tool for invoking function handlers locally.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use funcbox::{Config, EXAMPLE_CONFIG, InvocationPayload, InvocationResponse, Invoker, Runtime};
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "funcbox")]
#[command(about = "A tool for invoking function handlers in ephemeral processes")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: funcbox.toml)
        #[arg(short, long, default_value = "funcbox.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Invoke a handler from a source file
    Invoke {
        /// Handler source file
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Runtime ID (javascript, typescript, python)
        #[arg(short, long)]
        runtime: String,

        /// Event as inline JSON
        #[arg(short, long, conflicts_with = "event_file")]
        event: Option<String>,

        /// Read the event from a JSON file
        #[arg(long, value_name = "PATH")]
        event_file: Option<PathBuf>,

        /// Name of the exported handler function
        #[arg(long)]
        handler: Option<String>,

        /// Deadline in milliseconds
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },

    /// Run a JSON invocation request (default: read from stdin)
    Request {
        /// Request file
        #[arg(value_name = "FILE")]
        request: Option<PathBuf>,
    },

    /// List runtimes and the interpreter each one resolves to
    Runtimes,

    /// Show effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
    } else {
        debug!("using default configuration");
    }
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Invoke {
            source,
            runtime,
            event,
            event_file,
            handler,
            timeout_ms,
        } => {
            let payload = build_payload(
                &source,
                runtime,
                event.as_deref(),
                event_file.as_deref(),
                handler,
                timeout_ms,
            )
            .await?;
            run_payload(config, payload).await
        }
        Commands::Request { request } => {
            let payload = read_request(request.as_deref()).await?;
            run_payload(config, payload).await
        }
        Commands::Runtimes => {
            list_runtimes(&config);
            Ok(())
        }
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
    }
}

async fn build_payload(
    source: &Path,
    runtime: String,
    event: Option<&str>,
    event_file: Option<&Path>,
    handler: Option<String>,
    timeout_ms: Option<u64>,
) -> Result<InvocationPayload> {
    let code = tokio::fs::read_to_string(source)
        .await
        .context("failed to read source file")?;

    let event: Value = match (event, event_file) {
        (Some(inline), _) => serde_json::from_str(inline).context("event is not valid JSON")?,
        (None, Some(path)) => {
            let content = tokio::fs::read_to_string(path)
                .await
                .context("failed to read event file")?;
            serde_json::from_str(&content).context("event file is not valid JSON")?
        }
        (None, None) => Value::Object(serde_json::Map::new()),
    };

    let mut payload = InvocationPayload::new(runtime, code).with_event(event);
    if let Some(handler) = handler {
        payload = payload.with_handler(handler);
    }
    if let Some(timeout_ms) = timeout_ms {
        payload = payload.with_timeout_ms(timeout_ms);
    }
    Ok(payload)
}

async fn read_request(path: Option<&Path>) -> Result<InvocationPayload> {
    let content = match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .context("failed to read request file")?,
        None => {
            let mut content = String::new();
            tokio::io::stdin()
                .read_to_string(&mut content)
                .await
                .context("failed to read request from stdin")?;
            content
        }
    };

    serde_json::from_str(&content).context("request is not a valid invocation payload")
}

async fn run_payload(config: Config, payload: InvocationPayload) -> Result<()> {
    let invoker = Invoker::new(config);

    // Ctrl-C cancels the running handler instead of killing the CLI outright
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling invocation");
            on_interrupt.cancel();
        }
    });

    info!(runtime = %payload.runtime, "invoking handler");
    let response = invoker.handle_with_cancel(payload, cancel).await;

    print_response(&response)?;

    if let Some(canonical) = &response.response {
        info!(status = canonical.status_code, "invocation complete");
    }

    if response.ok {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

/// Print the response JSON to stdout, keeping stdout clean for piping
fn print_response(response: &InvocationResponse) -> Result<()> {
    let json = serde_json::to_string_pretty(response).context("failed to encode response")?;
    println!("{json}");
    Ok(())
}

fn list_runtimes(config: &Config) {
    println!("Available runtimes:\n");

    for runtime in Runtime::ALL {
        let adapter = funcbox::adapter_for(runtime);
        let interpreter = match config.interpreter_for(adapter) {
            Ok(interpreter) => {
                let mut command = interpreter.program.display().to_string();
                for arg in &interpreter.args {
                    command.push(' ');
                    command.push_str(arg);
                }
                command
            }
            Err(e) => format!("unavailable ({e})"),
        };
        println!(
            "  {:<12} .{:<4} {}",
            runtime.id(),
            adapter.source_extension(),
            interpreter
        );
    }
}

fn show_config(config: &Config) {
    println!("Workspace root: {}", config.workspace_root().display());
    println!();
    println!("Default timeout: {} ms", config.default_timeout_ms);
    println!("Max timeout: {} ms", config.max_timeout_ms);
    println!("Max concurrent invocations: {}", config.max_concurrent);
    println!("Max log lines: {}", config.max_log_lines);
    println!("Isolation: {:?}", config.isolation);
    println!();

    let mut overrides: Vec<_> = config.interpreters.iter().collect();
    overrides.sort_by_key(|(id, _)| *id);
    println!("Interpreter overrides: {}", overrides.len());
    for (id, interpreter) in overrides {
        println!("  {:<12} {}", id, interpreter.command.join(" "));
    }
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
