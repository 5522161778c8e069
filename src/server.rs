//! Server facade
//!
//! [`EmbeddedServer`] owns the lifecycle of the whole assembly: the
//! application context, the connector set with its shared port group, and
//! the event bus observers wired in by a configurator. State is exposed
//! through pull-based accessors for the presentation shell.

use crate::config::ServerConfig;
use crate::connector::{ConnectorSet, PortGroup};
use crate::error::{ServerError, ServerResult};
use crate::lifecycle::{LifecycleBus, LifecycleEvent, LifecycleState, Transition};
use crate::resources::ResourceRegistry;
use crate::webapp::{self, AppState};
use axum::Router;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

struct States {
    server: LifecycleState,
    context: LifecycleState,
}

struct Inner {
    connectors: Option<ConnectorSet>,
    router: Option<Router>,
}

/// The embedded server instance.
///
/// Start/stop/destroy serialize on one internal lock; state reads never
/// block on an in-flight transition.
pub struct EmbeddedServer {
    config: ServerConfig,
    registry: Arc<ResourceRegistry>,
    bus: Arc<LifecycleBus>,
    port_group: Arc<PortGroup>,
    states: Mutex<States>,
    inner: tokio::sync::Mutex<Inner>,
}

impl EmbeddedServer {
    pub fn new(config: ServerConfig, registry: Arc<ResourceRegistry>) -> Self {
        let port_group = Arc::new(PortGroup::new(config.listen_port));
        Self {
            config,
            registry,
            bus: Arc::new(LifecycleBus::new()),
            port_group,
            states: Mutex::new(States {
                server: LifecycleState::New,
                context: LifecycleState::New,
            }),
            inner: tokio::sync::Mutex::new(Inner {
                connectors: None,
                router: None,
            }),
        }
    }

    /// The lifecycle bus. Observers must be subscribed before `start` for
    /// their events to be seen from the first transition.
    pub fn bus(&self) -> Arc<LifecycleBus> {
        self.bus.clone()
    }

    pub fn registry(&self) -> Arc<ResourceRegistry> {
        self.registry.clone()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Current server state.
    pub fn state(&self) -> LifecycleState {
        self.states.lock().server
    }

    /// Current application context state.
    pub fn context_state(&self) -> LifecycleState {
        self.states.lock().context
    }

    /// The externally visible listen port; 0 while unbound.
    pub fn port(&self) -> u16 {
        self.port_group.current_port()
    }

    fn set_server_state(&self, state: LifecycleState) {
        self.states.lock().server = state;
    }

    fn set_context_state(&self, state: LifecycleState) {
        self.states.lock().context = state;
    }

    /// Validate configuration, prepare the install layout, and build the
    /// application router. Legal only once, from `New`.
    pub async fn init(&self) -> ServerResult<()> {
        let mut inner = self.inner.lock().await;
        if self.state() != LifecycleState::New {
            return Err(ServerError::startup("already initialized"));
        }

        self.config.validate()?;
        self.config.layout.ensure_writable_dirs()?;

        let router = webapp::build_router(
            AppState::new(self.registry.clone()),
            &self.config.layout.webapp_dir(),
            self.config.cors_enabled,
        );
        inner.router = Some(router);
        inner.connectors = Some(ConnectorSet::new(
            self.config.connectors.clone(),
            self.port_group.clone(),
            self.bus.clone(),
        ));

        self.set_server_state(LifecycleState::Initialized);
        self.set_context_state(LifecycleState::Initialized);
        info!("server initialized, root {:?}", self.config.layout.root());
        Ok(())
    }

    /// Start the server: fires `BeforeStart`, binds connectors, fires
    /// `ConfigureStart`, brings the context up, fires `AfterStart`.
    /// Startup failures shut down any partially bound connectors, leave the
    /// server `Failed`, and propagate.
    pub async fn start(&self) -> ServerResult<()> {
        let mut inner = self.inner.lock().await;
        match self.state() {
            LifecycleState::Initialized | LifecycleState::Stopped => {}
            other => {
                return Err(ServerError::startup(format!(
                    "cannot start from state {other}"
                )));
            }
        }

        self.bus.fire(LifecycleEvent::Server(Transition::BeforeStart)).await;
        self.set_server_state(LifecycleState::Starting);

        let router = inner
            .router
            .clone()
            .ok_or_else(|| ServerError::startup("router not initialized"))?;
        let connectors = inner
            .connectors
            .as_mut()
            .ok_or_else(|| ServerError::startup("connectors not initialized"))?;

        if let Err(err) = connectors.start_all(router).await {
            self.set_server_state(LifecycleState::Failed);
            self.set_context_state(LifecycleState::Failed);
            return Err(err);
        }

        self.bus
            .fire(LifecycleEvent::Server(Transition::ConfigureStart))
            .await;

        self.set_context_state(LifecycleState::Starting);
        self.bus.fire(LifecycleEvent::Context(Transition::BeforeStart)).await;
        self.set_context_state(LifecycleState::Started);
        self.bus.fire(LifecycleEvent::Context(Transition::AfterStart)).await;

        self.set_server_state(LifecycleState::Started);
        self.bus.fire(LifecycleEvent::Server(Transition::AfterStart)).await;

        info!(
            "server started on port {} ({} connector(s))",
            self.port(),
            connectors.bound_ports().len()
        );
        Ok(())
    }

    /// Stop the server. Listeners are torn down without draining in-flight
    /// requests; the database and naming resources are released by the
    /// `AfterStop` observers.
    pub async fn stop(&self) -> ServerResult<()> {
        let mut inner = self.inner.lock().await;
        if self.state() != LifecycleState::Started {
            return Err(ServerError::startup(format!(
                "cannot stop from state {}",
                self.state()
            )));
        }

        self.bus.fire(LifecycleEvent::Server(Transition::BeforeStop)).await;
        self.set_server_state(LifecycleState::Stopping);

        self.set_context_state(LifecycleState::Stopping);
        self.bus.fire(LifecycleEvent::Context(Transition::BeforeStop)).await;

        if let Some(connectors) = inner.connectors.as_mut() {
            connectors.stop_all().await;
        }

        self.set_context_state(LifecycleState::Stopped);
        self.bus.fire(LifecycleEvent::Context(Transition::AfterStop)).await;

        self.set_server_state(LifecycleState::Stopped);
        self.bus.fire(LifecycleEvent::Server(Transition::AfterStop)).await;

        info!("server stopped");
        Ok(())
    }

    /// Stop if started, then release everything. Further operations fail.
    pub async fn destroy(&self) -> ServerResult<()> {
        if self.state() == LifecycleState::Started {
            self.stop().await?;
        }

        let mut inner = self.inner.lock().await;
        if self.state() == LifecycleState::Destroyed {
            return Err(ServerError::startup("already destroyed"));
        }
        inner.connectors = None;
        inner.router = None;
        self.set_server_state(LifecycleState::Destroyed);
        self.set_context_state(LifecycleState::Destroyed);
        info!("server destroyed");
        Ok(())
    }

    /// Addresses of all live listeners.
    pub async fn bound_addrs(&self) -> Vec<SocketAddr> {
        let inner = self.inner.lock().await;
        inner
            .connectors
            .as_ref()
            .map(|set| set.bound_addrs())
            .unwrap_or_default()
    }

    /// Ports of all live listeners, in bind order.
    pub async fn bound_ports(&self) -> Vec<u16> {
        let inner = self.inner.lock().await;
        inner
            .connectors
            .as_ref()
            .map(|set| set.bound_ports())
            .unwrap_or_default()
    }
}
