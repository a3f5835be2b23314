mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing::warn;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use websearch_core::AppConfig;

use crate::cli::{Cli, Commands};

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config).unwrap_or_else(|_| {
        warn!(path = %cli.config, "config file not found, using built-in defaults");
        include_str!("../config/default.toml").to_string()
    });
    let mut config: AppConfig = toml::from_str(&config_str)?;

    if let Ok(v) = std::env::var("WEBSEARCH_ENV") {
        config.environment = websearch_core::config::Environment::from_env_str(&v);
    }
    config.apply_environment_preset();

    if let Ok(v) = std::env::var("PORT") {
        if let Ok(port) = v.parse() {
            config.general.port = port;
        }
    }
    if let Ok(v) = std::env::var("REDIS_HOST") {
        config.redis.host = v;
    }
    if let Ok(v) = std::env::var("REDIS_PORT") {
        if let Ok(port) = v.parse() {
            config.redis.port = port;
        }
    }
    if let Ok(v) = std::env::var("REDIS_DB") {
        if let Ok(db) = v.parse() {
            config.redis.db = db;
        }
    }
    if let Ok(v) = std::env::var("SECRET_KEY") {
        config.general.secret_key = v;
    }

    match cli.command {
        Commands::Search {
            url,
            query,
            max_pages,
        } => {
            commands::search::run(config, url, query, max_pages).await?;
        }
        Commands::Serve { port } => {
            commands::serve::run(config, port).await?;
        }
    }

    Ok(())
}
