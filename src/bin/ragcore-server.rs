//! ragcore-server - HTTP server for the retrieval core
//!
//! Usage:
//!   ragcore-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>      Path to configuration file (default: config.toml)
//!   --host <HOST>        API server host (default: 127.0.0.1)
//!   --port <PORT>        API server port (default: 8080)

use ragcore::api::{create_router, AppState};
use ragcore::config::AppConfig;
use ragcore::embedder::{Embedder, HttpEmbedder};
use ragcore::generator::{Generator, HttpGenerator};
use ragcore::store::KnowledgeStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct ServerArgs {
    config_path: PathBuf,
    host: String,
    port: u16,
}

impl Default for ServerArgs {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config.toml"),
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

fn parse_args() -> ServerArgs {
    let mut args = ServerArgs::default();
    let mut iter = std::env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                if let Some(path) = iter.next() {
                    args.config_path = PathBuf::from(path);
                }
            }
            "--host" => {
                if let Some(host) = iter.next() {
                    args.host = host;
                }
            }
            "--port" => {
                if let Some(port) = iter.next() {
                    if let Ok(p) = port.parse() {
                        args.port = p;
                    }
                }
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {arg}");
                print_help();
                std::process::exit(1);
            }
        }
    }

    args
}

fn print_help() {
    println!("ragcore-server - HTTP server for the retrieval core");
    println!();
    println!("USAGE:");
    println!("    ragcore-server [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --config <PATH>      Path to configuration file (default: config.toml)");
    println!("    --host <HOST>        API server host (default: 127.0.0.1)");
    println!("    --port <PORT>        API server port (default: 8080)");
    println!("    --help, -h           Print this help message");
}

fn setup_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,ragcore=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args();
    setup_logging();

    info!("ragcore-server v{}", ragcore::VERSION);

    let config = if args.config_path.exists() {
        info!(path = ?args.config_path, "loading configuration");
        AppConfig::from_file(&args.config_path)?
    } else {
        info!("config file not found, using defaults");
        AppConfig::default()
    };
    config.validate()?;

    let timeout = Duration::from_secs(config.backend.request_timeout_secs);
    let embedder: Arc<dyn Embedder> = Arc::new(HttpEmbedder::new(
        config.backend.embedder_base_url.clone(),
        config.backend.embedder_model.clone(),
        timeout,
    )?);
    let generator: Arc<dyn Generator> = Arc::new(HttpGenerator::new(
        config.backend.generator_base_url.clone(),
        config.backend.generator_endpoint.clone(),
        timeout,
    )?);

    let store = Arc::new(KnowledgeStore::open(&config, embedder.clone())?);
    let state = AppState::new(store, embedder, generator, Arc::new(config));
    let router = create_router(state);

    let addr = format!("{}:{}", args.host, args.port);
    info!(%addr, "ragcore-server listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = ServerArgs::default();
        assert_eq!(args.host, "127.0.0.1");
        assert_eq!(args.port, 8080);
    }
}
