//! Vitrine CLI
//!
//! A command-line tool for executing untrusted scripts in embedded
//! sandboxes, either one-shot or as a JSON-lines request/response service.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::EnvFilter;
use vitrine::{
    EXAMPLE_CONFIG, Engine, EngineConfig, ExecutionRequest, ExecutionSettings, HostValue,
    OutboundMessage, RequestMessage,
};

#[derive(Parser)]
#[command(name = "vitrine")]
#[command(about = "A tool for sandboxed execution of untrusted scripts")]
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
        /// Output path (default: vitrine.toml)
        #[arg(short, long, default_value = "vitrine.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Execute a script file
    Run {
        /// Script file to execute
        #[arg(value_name = "FILE")]
        script: PathBuf,

        /// Named input values as name=value pairs
        #[arg(short, long = "input", value_name = "NAME=VALUE")]
        inputs: Vec<String>,

        /// Wall-clock budget in milliseconds
        #[arg(short, long)]
        timeout_ms: Option<u64>,

        /// Guest memory limit in bytes
        #[arg(short, long)]
        memory_limit: Option<usize>,
    },

    /// Execute a script given on the command line
    Eval {
        /// Script text
        #[arg(value_name = "CODE")]
        code: String,

        /// Named input values as name=value pairs
        #[arg(short, long = "input", value_name = "NAME=VALUE")]
        inputs: Vec<String>,

        /// Wall-clock budget in milliseconds
        #[arg(short, long)]
        timeout_ms: Option<u64>,

        /// Guest memory limit in bytes
        #[arg(short, long)]
        memory_limit: Option<usize>,
    },

    /// Serve the request/response protocol over stdin/stdout (JSON lines)
    Serve,

    /// Show the effective configuration
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
    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        EngineConfig::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        EngineConfig::default()
    };

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Run {
            script,
            inputs,
            timeout_ms,
            memory_limit,
        } => {
            let code = tokio::fs::read_to_string(&script)
                .await
                .context("failed to read script file")?;
            run_once(config, &code, &inputs, timeout_ms, memory_limit).await
        }
        Commands::Eval {
            code,
            inputs,
            timeout_ms,
            memory_limit,
        } => run_once(config, &code, &inputs, timeout_ms, memory_limit).await,
        Commands::Serve => run_serve(config).await,
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
    }
}

async fn run_once(
    config: EngineConfig,
    code: &str,
    inputs: &[String],
    timeout_ms: Option<u64>,
    memory_limit: Option<usize>,
) -> Result<()> {
    let mut request = ExecutionRequest::new(uuid::Uuid::new_v4().to_string(), code);
    for pair in inputs {
        let (name, value) = parse_input(pair)?;
        request.inputs.insert(name, value);
    }

    let settings = ExecutionSettings {
        timeout_ms,
        memory_limit,
    };
    let has_overrides = timeout_ms.is_some() || memory_limit.is_some();

    let engine = Engine::new(config);
    engine
        .ready()
        .await
        .context("engine failed to initialise")?;

    info!("executing script");
    let result = engine
        .execute_with(
            request,
            if has_overrides { Some(&settings) } else { None },
        )
        .await;

    match result.outcome {
        Ok(value) => {
            println!("{value}");
            Ok(())
        }
        Err(error) => {
            eprintln!("{error}");
            std::process::exit(1);
        }
    }
}

/// Parse a `name=value` input pair.
///
/// The value is interpreted as a number when it parses as one, as a boolean
/// for `true`/`false`, as JSON when it parses as JSON, and as plain text
/// otherwise.
fn parse_input(pair: &str) -> Result<(String, HostValue)> {
    let (name, raw) = pair
        .split_once('=')
        .with_context(|| format!("input '{pair}' is not a name=value pair"))?;

    let value = if let Ok(number) = raw.parse::<f64>() {
        HostValue::Number(number)
    } else if raw == "true" {
        HostValue::Bool(true)
    } else if raw == "false" {
        HostValue::Bool(false)
    } else if let Ok(json) = serde_json::from_str(raw) {
        HostValue::Other(json)
    } else {
        HostValue::Text(raw.to_string())
    };

    Ok((name.to_string(), value))
}

async fn run_serve(config: EngineConfig) -> Result<()> {
    let engine = Arc::new(Engine::new(config));
    let (request_tx, request_rx) = mpsc::channel::<RequestMessage>(64);
    let (response_tx, mut response_rx) = mpsc::channel::<OutboundMessage>(64);

    let service = tokio::spawn(vitrine::serve(engine, request_rx, response_tx));

    // Writer: one JSON line per outbound message.
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(message) = response_rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(line) => {
                    if stdout.write_all(line.as_bytes()).await.is_err()
                        || stdout.write_all(b"\n").await.is_err()
                        || stdout.flush().await.is_err()
                    {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "failed to serialize response"),
            }
        }
    });

    // Reader: one JSON request per stdin line.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RequestMessage>(&line) {
            Ok(request) => {
                if request_tx.send(request).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "discarding malformed request line"),
        }
    }
    drop(request_tx);

    service.await.context("protocol service failed")?;
    writer.await.context("response writer failed")?;
    Ok(())
}

fn show_config(config: &EngineConfig) {
    println!("Timeout: {} ms", config.timeout_ms);
    println!("Memory limit: {} bytes", config.memory_limit);
    println!("Max workers: {}", config.max_workers);
    println!("Max result depth: {}", config.max_result_depth);
}

async fn init_config(output: &PathBuf, force: bool) -> Result<()> {
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
