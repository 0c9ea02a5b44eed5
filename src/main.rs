mod config;
mod error;
mod host;
mod result;
mod sandbox;
mod script;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::SandboxError;
use crate::host::static_host::StaticHost;
use crate::sandbox::Sandbox;

const DEFAULT_CONFIG_PATH: &str = "config/quarry.toml";

fn print_help() {
    println!(
        "\
quarry v{}

Restricted script execution sandbox for data-retrieval steps.

USAGE:
    quarry [OPTIONS] <SCRIPT>

ARGUMENTS:
    SCRIPT    Path to the script file to execute

OPTIONS:
    -c, --config <PATH>    Path to TOML configuration file
                           [default: {DEFAULT_CONFIG_PATH}]
    -h, --help             Print this help message and exit
    -V, --version          Print version and exit

ENVIRONMENT VARIABLES:
    Variables are referenced in the config file via ${{VAR_NAME}} syntax.

    RUST_LOG    Log level filter for tracing
                (e.g. debug, quarry=debug,warn)

OUTPUT:
    On success the result (columns, rows, log) is printed to stdout as
    JSON. On failure a single '<ErrorKind> <message>' line is printed to
    stderr and the exit code is non-zero. Script print output never
    reaches stdout — it only travels via the result's log field.

EXAMPLES:
    quarry retrieve.qs                        # uses config/quarry.toml
    quarry -c /etc/quarry/prod.toml step.qs   # custom config path
    RUST_LOG=debug quarry retrieve.qs         # with debug logging",
        env!("CARGO_PKG_VERSION"),
    );
}

struct CliArgs {
    script_path: String,
    config_path: Option<String>,
}

fn parse_args() -> Result<CliArgs> {
    let mut script_path = None;
    let mut config_path = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("quarry v{}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--config" | "-c" => {
                config_path = Some(
                    args.next()
                        .context("--config requires a path argument")?,
                );
            }
            other if other.starts_with('-') => {
                anyhow::bail!("unknown option '{other}' (see --help)");
            }
            other => {
                if script_path.replace(other.to_string()).is_some() {
                    anyhow::bail!("only one script path may be given");
                }
            }
        }
    }

    Ok(CliArgs {
        script_path: script_path.context("missing script path (see --help)")?,
        config_path,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (RUST_LOG=debug for debug mode)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("quarry=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;

    // An explicitly given config must exist; the default one may be absent.
    let config = match &args.config_path {
        Some(path) => {
            info!("Loading configuration from {path}");
            Config::load(path).with_context(|| format!("loading config {path}"))?
        }
        None if std::path::Path::new(DEFAULT_CONFIG_PATH).is_file() => {
            info!("Loading configuration from {DEFAULT_CONFIG_PATH}");
            Config::load(DEFAULT_CONFIG_PATH)
                .with_context(|| format!("loading config {DEFAULT_CONFIG_PATH}"))?
        }
        None => {
            info!("No configuration file found, using defaults");
            Config::default()
        }
    };

    let source = std::fs::read_to_string(&args.script_path)
        .with_context(|| format!("reading script {}", args.script_path))?;

    let host = Arc::new(StaticHost::new(config.host.clone()));
    let sandbox = Arc::new(Sandbox::new(&config.script, host)?);
    let deadline = Duration::from_secs(config.execution.timeout_secs);

    // The sandbox enforces no quota of its own: run the execution on a
    // blocking thread under a hard deadline. Cancellation is coarse — on
    // timeout the process exits, taking the runaway thread with it.
    let execution = tokio::task::spawn_blocking({
        let sandbox = Arc::clone(&sandbox);
        move || sandbox.run(&source)
    });

    let outcome = match tokio::time::timeout(deadline, execution).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join_error)) => Err(SandboxError::runtime(format!(
            "execution aborted: {join_error}"
        ))),
        Err(_) => {
            warn!("Execution exceeded the {}s deadline", deadline.as_secs());
            Err(SandboxError::runtime(format!(
                "execution timed out after {}s",
                deadline.as_secs()
            )))
        }
    };

    match outcome {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
