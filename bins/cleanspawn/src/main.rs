use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use cleanspawn_common::DisposalPolicy;
use cleanspawn_process::{LaunchConfig, Spawner};

/// Launch a program that inherits only its standard streams
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Close inherited descriptors immediately instead of marking them close-on-exec
    #[arg(long)]
    close: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Program and arguments (overrides the config's program and args)
    #[arg(last = true, value_name = "COMMAND")]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    initialize_logging(if args.debug { "debug" } else { config.log_level.as_str() })?;

    info!("Launching {} {:?}", config.program, config.args);

    let spawner = Spawner::with_enumerator(config.enumerator());
    let child = spawner
        .spawn(&config.to_spawn_options())
        .with_context(|| format!("Failed to spawn {}", config.program))?;

    let report = child.handoff().clone();
    if report.is_complete() {
        info!(
            "Handed {} inherited descriptors to {} (PID {})",
            report.descriptors_sent,
            child.program(),
            child.id()
        );
    } else {
        warn!(
            "Incomplete descriptor handoff to PID {}: sent={}, write_failures={}, enumeration_error={:?}",
            child.id(),
            report.descriptors_sent,
            report.write_failures,
            report.enumeration_error
        );
    }

    let status = match child.wait_async().await {
        Ok(status) => status,
        Err(e) => {
            error!("Failed to wait for child: {}", e);
            return Err(anyhow!("Wait failed: {}", e));
        }
    };

    info!("Child finished with {}", status);
    std::process::exit(status.shell_code());
}

fn load_config(args: &Args) -> Result<LaunchConfig> {
    let mut config = match &args.config {
        Some(path) => LaunchConfig::load_from_file(path)?,
        None => {
            let program = args
                .command
                .first()
                .ok_or_else(|| anyhow!("Either --config or a command after `--` is required"))?;
            LaunchConfig::new(program.clone())
        }
    };

    if let Some((program, rest)) = args.command.split_first() {
        config.program = program.clone();
        config.args = rest.to_vec();
    }

    if args.close {
        config.disposal = DisposalPolicy::Close;
    }

    config.validate()?;
    Ok(config)
}

fn initialize_logging(level: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    Ok(())
}
