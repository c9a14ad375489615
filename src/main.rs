//! remote-desk-server: screen streaming and input injection over HTTP and
//! WebSocket.

use anyhow::{Context, Result};
use clap::Parser;
use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use remote_desk::config::ServerConfig;
use remote_desk::provider::{create_provider, ProviderKind};
use remote_desk::server::{router, AppState};

/// Upper bound on draining connections once shutdown has begun
const FORCE_EXIT_AFTER: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "remote-desk-server", version, about)]
struct Cli {
    /// Port to listen on [env: REMOTE_DESK_PORT, default 6485]
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind [env: REMOTE_DESK_BIND, default 0.0.0.0]
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Capability provider [env: REMOTE_DESK_PROVIDER, default xdotool]
    #[arg(long, value_enum)]
    provider: Option<ProviderKind>,

    /// Seconds before a held key or button is released automatically
    #[arg(long)]
    hold_timeout: Option<u64>,

    /// JPEG quality used when a capture names none (1-100)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: Option<u8>,
}

impl Cli {
    fn apply(self, mut config: ServerConfig) -> ServerConfig {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(provider) = self.provider {
            config.provider = provider;
        }
        if let Some(secs) = self.hold_timeout.filter(|s| *s > 0) {
            config.hold_timeout = Duration::from_secs(secs);
        }
        if let Some(quality) = self.quality {
            config.default_quality = quality;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.apply(ServerConfig::from_env());

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_new(&config.log_level)
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    info!("remote-desk-server v{} on {}", env!("CARGO_PKG_VERSION"), host);
    info!(
        "[Server] provider={:?} hold_timeout={:?} default_quality={}",
        config.provider, config.hold_timeout, config.default_quality
    );

    let provider = create_provider(config.provider).context("Failed to create capability provider")?;
    let addr = config.socket_addr();
    let state = AppState::new(provider, config);
    let app = router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("[Server] Listening on http://{} (WebSocket at /ws)", addr);

    let shutdown = state.shutdown.clone();
    let agent = state.agent.clone();
    let signal = async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => {
                    info!("[Server] Interrupted; releasing held inputs");
                    let released = agent.holds().release_all().await;
                    info!("[Server] Released {} held input(s)", released.len());
                    shutdown.trigger();
                }
                Err(e) => {
                    error!("[Server] Failed to listen for ctrl-c: {}", e);
                    shutdown.cancelled().await;
                }
            },
            _ = shutdown.cancelled() => {}
        }
    };

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(signal)
    .into_future();

    let watchdog = state.shutdown.clone();
    tokio::select! {
        result = server => result.context("Server failed")?,
        _ = async {
            watchdog.cancelled().await;
            tokio::time::sleep(FORCE_EXIT_AFTER).await;
        } => warn!("[Server] Connections still open after {:?}; exiting", FORCE_EXIT_AFTER),
    }

    state.metrics.log_summary("[Server] Dispatch totals");
    info!("[Server] Stopped");
    Ok(())
}
