//! throttle-proxy
//!
//! A single-origin reverse proxy that rate limits each client with its own
//! token bucket.
//!
//! ```text
//!   client ──▶ Logging ──▶ PanicRecovery ──▶ RateLimit ──▶ Forward ──▶ origin
//!                                               │
//!                                               └──▶ 429 when the bucket is empty
//! ```

use std::path::PathBuf;
use clap::Parser;
use tokio::net::TcpListener;

use throttle_proxy::config::{self, ProxyConfig};
use throttle_proxy::http::HttpServer;
use throttle_proxy::lifecycle::{signals, Shutdown};
use throttle_proxy::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "throttle-proxy")]
#[command(about = "Per-client rate limiting reverse proxy", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port (overrides config and PORT).
    #[arg(short, long)]
    port: Option<u16>,

    /// Origin base URL (overrides config and ORIGIN_SERVER_URL).
    #[arg(short, long)]
    origin: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut ProxyConfig) {
        if let Some(port) = self.port {
            config.listener.bind_address = format!("0.0.0.0:{}", port);
        }
        if let Some(origin) = &self.origin {
            config.origin.url = origin.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let env_file = config::load_dotenv()?;
    let config = config::load_effective_config(cli.config.as_deref(), |config| cli.apply(config))?;

    logging::init_logging(&config.observability)?;

    tracing::info!("throttle-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &env_file {
        tracing::info!(path = %path.display(), "Loaded environment file");
    }
    tracing::info!(
        bind_address = %config.listener.bind_address,
        origin = %config.origin.url,
        rate_limit_enabled = config.rate_limit.enabled,
        requests_per_second = config.rate_limit.requests_per_second,
        burst_size = config.rate_limit.burst_size,
        cleanup_interval_secs = config.rate_limit.cleanup_interval_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
