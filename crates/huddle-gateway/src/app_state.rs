//! Shared application state.
//!
//! Wires the presence registry, realtime core, room gateway, dispatcher and
//! idle sweeper together, and registers the built-in services. Startup errors
//! are returned, never panicked on.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use huddle_core::error::Result;

use crate::collab::{ChatStore, IdentityProvider, InMemoryChatStore, StaticIdentityProvider};
use crate::config::GatewayConfig;
use crate::dispatch::Dispatcher;
use crate::gateway::{GatewayOptions, RoomGateway};
use crate::obs::GatewayMetrics;
use crate::realtime::{PresenceRegistry, RealtimeCore};
use crate::services::{ChatService, SysService};
use crate::sweeper::IdleSweeper;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: GatewayConfig,
    registry: Arc<PresenceRegistry>,
    core: Arc<RealtimeCore>,
    gateway: Arc<RoomGateway>,
    dispatcher: Arc<Dispatcher>,
    identity: Arc<dyn IdentityProvider>,
    sweeper: Arc<IdleSweeper>,
    metrics: Arc<GatewayMetrics>,
    shutdown: CancellationToken,
}

impl AppState {
    /// Build state with the config-seeded in-memory collaborators.
    pub fn new(cfg: GatewayConfig) -> Result<Self> {
        let identity = Arc::new(StaticIdentityProvider::from_config(&cfg.identities));
        let store = Arc::new(InMemoryChatStore::from_config(&cfg));
        Self::with_collaborators(cfg, identity, store)
    }

    pub fn with_collaborators(
        cfg: GatewayConfig,
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn ChatStore>,
    ) -> Result<Self> {
        cfg.validate()?;

        let metrics = Arc::new(GatewayMetrics::default());
        let registry = Arc::new(PresenceRegistry::new());
        let core = Arc::new(RealtimeCore::new(Arc::clone(&metrics)));

        let gateway = Arc::new(RoomGateway::new(
            Arc::clone(&registry),
            Arc::clone(&core),
            Arc::clone(&store),
            Arc::clone(&metrics),
            GatewayOptions {
                message_timeout_ms: cfg.gateway.message_timeout_ms,
                history: cfg.gateway.history_limits(),
            },
        ));

        let dispatcher = Dispatcher::new();
        dispatcher.register_text(Arc::new(ChatService::new(Arc::clone(&gateway))));
        dispatcher.register_text(Arc::new(SysService::new(Arc::clone(&gateway))));

        let sweeper = Arc::new(IdleSweeper::new(
            Arc::clone(&registry),
            Arc::clone(&core),
            store,
            Arc::clone(&metrics),
            &cfg.sweeper,
        ));

        tracing::info!(
            services = ?dispatcher.registered_text_svcs(),
            identities = cfg.identities.len(),
            rooms = cfg.rooms.len(),
            "application state ready"
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                registry,
                core,
                gateway,
                dispatcher: Arc::new(dispatcher),
                identity,
                sweeper,
                metrics,
                shutdown: CancellationToken::new(),
            }),
        })
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.inner.cfg
    }

    pub fn registry(&self) -> &Arc<PresenceRegistry> {
        &self.inner.registry
    }

    pub fn core(&self) -> &Arc<RealtimeCore> {
        &self.inner.core
    }

    pub fn gateway(&self) -> &Arc<RoomGateway> {
        &self.inner.gateway
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.inner.dispatcher
    }

    pub fn identity(&self) -> &Arc<dyn IdentityProvider> {
        &self.inner.identity
    }

    pub fn sweeper(&self) -> &Arc<IdleSweeper> {
        &self.inner.sweeper
    }

    pub fn metrics(&self) -> &Arc<GatewayMetrics> {
        &self.inner.metrics
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Start the idle sweeper; it stops when shutdown begins.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        Arc::clone(&self.inner.sweeper).spawn(self.shutdown_token())
    }

    /// Flip readiness and tell every session and the sweeper to stop.
    pub fn begin_shutdown(&self) {
        self.inner.metrics.set_draining();
        self.inner.shutdown.cancel();
    }

    pub fn is_draining(&self) -> bool {
        self.inner.metrics.is_draining()
    }

    /// Point-in-time gauges rendered alongside the registry metrics.
    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("huddle_sessions", self.inner.registry.len() as u64),
            (
                "huddle_transport_connections",
                self.inner.core.connection_count() as u64,
            ),
        ]
    }
}
