use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use penaltybox::config::{LoggingConfig, PenaltyBoxConfig};
use penaltybox::http::HttpServer;
use penaltybox::ratelimit::{spawn_sweeper, Limiter, RateLimiter, ShardedRateLimiter};

/// Per-client rate limiter with blacklist escalation.
#[derive(Parser, Debug)]
#[command(name = "penaltybox", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = PenaltyBoxConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    if args.log_json {
        config.logging.json = true;
    }

    init_tracing(&config.logging);

    info!("Starting penaltybox");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let settings = config.rate_limiting.settings();
    info!(
        listen_addr = %config.server.listen_addr,
        max_requests = settings.max_requests,
        window = ?settings.window,
        backoff = ?settings.backoff,
        sharded = config.rate_limiting.sharded,
        "Configuration loaded"
    );

    if config.rate_limiting.sharded {
        run(Arc::new(ShardedRateLimiter::new(settings)), &config).await?;
    } else {
        run(Arc::new(RateLimiter::new(settings)), &config).await?;
    }

    info!("penaltybox stopped");
    Ok(())
}

/// Serve with the given limiter until a shutdown signal arrives.
async fn run<L: Limiter + 'static>(limiter: Arc<L>, config: &PenaltyBoxConfig) -> anyhow::Result<()> {
    let sweeper = config
        .rate_limiting
        .sweep_interval()
        .map(|every| spawn_sweeper(Arc::clone(&limiter), every));

    let server = HttpServer::new(
        config.server.listen_addr,
        limiter,
        config.server.client_header_name()?,
    );
    let result = server.serve_with_shutdown(shutdown_signal()).await;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    Ok(result?)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
