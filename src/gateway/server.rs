use crate::analysis::AnalysisScheduler;
use crate::cli::GatewayOpts;
use crate::config::{Config, GatewayBindMode};
use crate::gateway::auth::CredentialStore;
use crate::gateway::fanout::Broadcaster;
use crate::gateway::liveness::LivenessSupervisor;
use crate::gateway::registry::SessionRegistry;
use crate::gateway::routes;
use crate::providers::{self, ModelProvider};
use crate::telemetry::{AlertEngine, LatestState};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Close code and reason sent to every session on shutdown.
pub const CLOSE_SHUTDOWN: u16 = 1000;
pub const SHUTDOWN_REASON: &str = "Server shutting down";

/// One gateway instance. Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
    pub fanout: Broadcaster,
    pub latest: Arc<LatestState>,
    pub alerts: Arc<Mutex<AlertEngine>>,
    pub analysis: Arc<AnalysisScheduler>,
    pub credentials: Arc<CredentialStore>,
    pub shutdown: CancellationToken,
    pub start_time: std::time::Instant,
    pub version: String,
}

impl GatewayState {
    /// Build state, resolving the analysis provider from configuration.
    pub fn new(config: Config) -> Result<Self> {
        let provider = providers::resolve_provider(&config)?;
        Self::with_provider(config, provider)
    }

    /// Build state around an explicit provider (or none).
    pub fn with_provider(
        config: Config,
        provider: Option<Arc<dyn ModelProvider>>,
    ) -> Result<Self> {
        let registry = Arc::new(SessionRegistry::new());
        let fanout = Broadcaster::new(registry.clone());

        let alerts = AlertEngine::new(
            config.thresholds(),
            Duration::from_secs(config.alerts.cooldown_secs),
            config.alerts.log_capacity,
        );
        let analysis = AnalysisScheduler::new(config.analysis.clone(), provider, fanout.clone());
        let credentials =
            CredentialStore::from_config(&config.auth).context("Failed to set up credentials")?;

        Ok(Self {
            latest: Arc::new(LatestState::new(config.gateway.history_capacity)),
            alerts: Arc::new(Mutex::new(alerts)),
            analysis: Arc::new(analysis),
            credentials: Arc::new(credentials),
            config: Arc::new(config),
            registry,
            fanout,
            shutdown: CancellationToken::new(),
            start_time: std::time::Instant::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn supervisor(&self) -> LivenessSupervisor {
        LivenessSupervisor::new(
            self.registry.clone(),
            self.fanout.clone(),
            Duration::from_secs(self.config.liveness.interval_secs),
            Duration::from_secs(self.config.liveness.stale_after_secs),
        )
    }

    /// Ask every open session to close. Each connection task deregisters
    /// itself as it exits.
    pub fn close_all(&self, code: u16, reason: &str) -> usize {
        let sessions = self.registry.all();
        for session in &sessions {
            session.terminate(code, reason);
        }
        sessions.len()
    }
}

/// The gateway server.
pub struct GatewayServer {
    state: GatewayState,
    listener: TcpListener,
    addr: SocketAddr,
    supervisor: JoinHandle<()>,
}

impl GatewayServer {
    /// Start the gateway server with the given configuration.
    pub async fn start(config: Config, opts: GatewayOpts) -> Result<Self> {
        let port = opts.port.unwrap_or(config.gateway.port);
        let bind_addr = resolve_bind_address(&config, opts.bind.as_deref(), port)?;
        let state = GatewayState::new(config)?;
        Self::bind(state, bind_addr).await
    }

    /// Bind `addr` and spawn the liveness supervisor for `state`.
    pub async fn bind(state: GatewayState, addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        let addr = listener.local_addr()?;
        let supervisor = state.supervisor().spawn(state.shutdown.child_token());

        info!("Gateway server bound to {}", addr);
        Ok(Self {
            state,
            listener,
            addr,
            supervisor,
        })
    }

    /// Run the server until a shutdown signal or [`shutdown`](Self::shutdown).
    pub async fn run_until_shutdown(self) -> Result<()> {
        let Self {
            state,
            listener,
            addr,
            supervisor,
        } = self;
        let app = routes::build_routes(state.clone());

        print_startup_banner(&state, &addr);

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await?;

        state.shutdown.cancel();
        if let Err(e) = supervisor.await {
            warn!("Liveness supervisor ended abnormally: {}", e);
        }

        info!("Gateway server shut down gracefully");
        Ok(())
    }

    /// Get the bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> &GatewayState {
        &self.state
    }

    /// Token that stops the server when cancelled.
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    /// Trigger graceful shutdown.
    pub fn shutdown(&self) {
        self.state.shutdown.cancel();
    }
}

/// Wait for Ctrl+C, SIGTERM or a programmatic shutdown, then close sessions.
async fn shutdown_signal(state: GatewayState) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
        _ = state.shutdown.cancelled() => {
            info!("Shutdown requested");
        }
    }

    state.shutdown.cancel();
    let closed = state.close_all(CLOSE_SHUTDOWN, SHUTDOWN_REASON);
    if closed > 0 {
        info!("Closing {} open session(s)", closed);
    }
}

/// Resolve the bind address from configuration.
pub fn resolve_bind_address(
    config: &Config,
    bind_override: Option<&str>,
    port: u16,
) -> Result<SocketAddr> {
    let bind = bind_override
        .and_then(|b| b.parse().ok())
        .unwrap_or(config.gateway.bind);

    let host = match bind {
        GatewayBindMode::Loopback => "127.0.0.1",
        GatewayBindMode::Lan => "0.0.0.0",
        GatewayBindMode::Custom => config
            .gateway
            .custom_bind_host
            .as_deref()
            .unwrap_or("0.0.0.0"),
    };

    format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Invalid bind address {host}:{port}"))
}

fn print_startup_banner(state: &GatewayState, addr: &SocketAddr) {
    let analysis = if !state.config.analysis.enabled {
        "disabled".to_string()
    } else {
        format!(
            "{} every {}s",
            state.config.analysis.model, state.config.analysis.interval_secs
        )
    };

    info!("-------------------------------------------");
    info!("  CleanKiln Gateway v{}", state.version);
    info!("  Listening on: http://{}", addr);
    info!("  WebSocket: ws://{}/ (also /ws)", addr);
    info!("  Health: http://{}/health", addr);
    info!(
        "  Heartbeat: every {}s, stale after {}s",
        state.config.liveness.interval_secs, state.config.liveness.stale_after_secs
    );
    info!("  Analysis: {}", analysis);
    info!("-------------------------------------------");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::registry::Outbound;
    use tokio::sync::mpsc;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.auth.bcrypt_cost = 4;
        config.auth.jwt_secret = Some("test".to_string());
        config
    }

    #[test]
    fn bind_modes_resolve() {
        let mut config = test_config();
        assert_eq!(
            resolve_bind_address(&config, None, 3000).unwrap(),
            "0.0.0.0:3000".parse().unwrap()
        );
        assert_eq!(
            resolve_bind_address(&config, Some("loopback"), 3000).unwrap(),
            "127.0.0.1:3000".parse().unwrap()
        );

        config.gateway.bind = GatewayBindMode::Custom;
        config.gateway.custom_bind_host = Some("not a host".to_string());
        assert!(resolve_bind_address(&config, None, 3000).is_err());
    }

    #[tokio::test]
    async fn instances_are_independent() {
        let a = GatewayState::with_provider(test_config(), None).unwrap();
        let b = GatewayState::with_provider(test_config(), None).unwrap();

        let (tx, _rx) = mpsc::channel(4);
        a.registry.register(tx);
        assert_eq!(a.registry.len(), 1);
        assert!(b.registry.is_empty());
    }

    #[tokio::test]
    async fn close_all_queues_close_frames() {
        let state = GatewayState::with_provider(test_config(), None).unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        let session = state.registry.register(tx);

        assert_eq!(state.close_all(CLOSE_SHUTDOWN, SHUTDOWN_REASON), 1);
        assert_eq!(
            rx.try_recv(),
            Ok(Outbound::Close {
                code: 1000,
                reason: SHUTDOWN_REASON.to_string()
            })
        );
        assert!(session.cancel_token().is_cancelled());
    }
}
