use anyhow::Result;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wikicolor::{
    config::Config,
    services::{ColorService, Prefetcher},
    web::WebServer,
};

#[derive(Parser)]
#[command(name = "wikicolor")]
#[command(version)]
#[command(about = "Resolves a representative terminal color for recent Wikimedia Commons uploads")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// Listening IP address
        #[arg(short = 'H', long, value_name = "IP")]
        host: Option<String>,

        /// Listening port
        #[arg(short, long, value_name = "PORT")]
        port: Option<u16>,
    },
    /// Resolve one batch and print a color bar per image
    Resolve {
        /// Number of images to resolve
        #[arg(short = 'n', long)]
        max: Option<usize>,

        /// Session deadline, e.g. `20s` or `2m`
        #[arg(short, long, value_parser = humantime::parse_duration)]
        deadline: Option<Duration>,
    },
    /// Print the effective configuration as TOML
    DumpConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = if cli.log_level == "trace" {
        format!("wikicolor={},tower_http=trace", cli.log_level)
    } else {
        format!("wikicolor={}", cli.log_level)
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(
            cli.log_json
                .then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
        )
        .with(
            (!cli.log_json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        )
        .init();

    let config = Config::load(Some(&cli.config))?;

    match cli.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
    }) {
        Command::Serve { host, port } => serve(config, host, port).await,
        Command::Resolve { max, deadline } => resolve(config, max, deadline).await,
        Command::DumpConfig => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

/// Cancel `tokens` on ctrl-c
fn spawn_signal_handler(tokens: Vec<CancellationToken>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down gracefully"),
            Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
        }
        for token in tokens {
            token.cancel();
        }
    });
}

async fn serve(mut config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.web.host = host;
    }
    if let Some(port) = port {
        config.web.port = port;
    }

    info!("Starting wikicolor v{}", env!("CARGO_PKG_VERSION"));
    let service = Arc::new(ColorService::new(config.clone())?);

    let app_token = CancellationToken::new();
    spawn_signal_handler(vec![app_token.clone(), service.shutdown_token()]);

    if config.prefetch.enabled {
        let prefetcher = Prefetcher::new(Arc::clone(&service), config.prefetch.clone());
        let token = app_token.clone();
        tokio::spawn(async move { prefetcher.run(token).await });
    }

    let web_server = WebServer::new(&config.web, Arc::clone(&service))?;
    info!(
        "Starting web server on {}:{}",
        web_server.host(),
        web_server.port()
    );
    web_server.serve_with_cancellation(app_token).await?;

    service.shutdown().await;
    Ok(())
}

async fn resolve(config: Config, max: Option<usize>, deadline: Option<Duration>) -> Result<()> {
    let service = ColorService::new(config)?;
    spawn_signal_handler(vec![service.shutdown_token()]);

    let request = service.request(max, deadline);
    let mut stream = service.resolve(request);

    while let Some(result) = stream.next().await {
        match &result.outcome {
            Ok(color) => println!("\x1b[30;48;5;{}m{:80}\x1b[0m", color.xterm, result.url),
            Err(e) => warn!("{}: {}", result.url, e),
        }
    }

    service.shutdown().await;
    Ok(())
}
