use anyhow::{Context, Result};
use keybureau::core::commands::{execute, Command, USAGE};
use keybureau::core::config::Config;
use keybureau::core::startup::{build_state, load_state};
use keybureau::core::tracing_init::init_tracing;
use std::env;
use std::path::PathBuf;
use tracing::{error, info};

const DEFAULT_CONFIG: &str = "config.toml";

fn main() -> Result<()> {
    let mut args: Vec<String> = env::args().skip(1).collect();

    if matches!(args.first().map(String::as_str), Some("help" | "--help" | "-h")) {
        println!("{}", USAGE);
        return Ok(());
    }

    let explicit_config = args.first().is_some_and(|arg| arg.ends_with(".toml"));
    let config_path = if explicit_config {
        PathBuf::from(args.remove(0))
    } else {
        PathBuf::from(DEFAULT_CONFIG)
    };

    // An explicit path must exist; the default one is optional
    let config = if explicit_config || config_path.exists() {
        Config::from_file(&config_path).context(format!(
            "Failed to load configuration from '{}'. \
            Copy config.example.toml to config.toml and adjust the values.",
            config_path.display()
        ))?
    } else {
        Config::default()
    };

    init_tracing(&config.logging)?;

    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };

    // Save and scan delays only need a single thread
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    runtime.block_on(async_main(config, config_path, command))
}

async fn async_main(config: Config, config_path: PathBuf, command: Command) -> Result<()> {
    info!(
        config_path = %config_path.display(),
        backend = ?config.store.backend,
        store_path = %config.store.path.display(),
        log_level = %config.logging.level,
        "Key bureau starting"
    );

    let state = build_state(config)?;
    load_state(&state)?;

    match execute(&state, command).await {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output);
            }
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Command failed");
            Err(e.into())
        }
    }
}
