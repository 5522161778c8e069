//! Connector set and shared port assignment
//!
//! Each [`ConnectorSpec`](crate::config::ConnectorSpec) becomes one bound
//! listener task. Connectors configured with port 0 form a port group: the
//! first connector binds an OS-assigned ephemeral port, records it as the
//! group's canonical port, and every later connector binds that same port
//! on its own address. The canonical port resets to auto only when the
//! connector holding it stops.

use crate::config::{ConnectorSpec, Protocol};
use crate::error::{ServerError, ServerResult};
use crate::lifecycle::{LifecycleBus, LifecycleEvent, Transition};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use parking_lot::Mutex;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::limit::GlobalConcurrencyLimitLayer;
use tracing::{info, warn};

struct GroupState {
    port: u16,
    holder: Option<usize>,
}

/// Shared listen port for a set of connectors.
///
/// Mutated from connector lifecycle transitions; all access goes through
/// one lock so a late-binding connector always observes the canonical port.
pub struct PortGroup {
    configured: u16,
    state: Mutex<GroupState>,
}

impl PortGroup {
    /// `configured` of 0 requests OS assignment for the first connector.
    pub fn new(configured: u16) -> Self {
        Self {
            configured,
            state: Mutex::new(GroupState {
                port: configured,
                holder: None,
            }),
        }
    }

    /// Port the next connector should bind: 0 until a canonical port is
    /// recorded, then that port.
    pub fn bind_port(&self) -> u16 {
        self.state.lock().port
    }

    /// Currently shared port, 0 when unbound.
    pub fn current_port(&self) -> u16 {
        self.state.lock().port
    }

    /// Record the OS-assigned port after connector `index` bound. Only the
    /// first auto-assigned connector becomes the holder.
    pub fn record(&self, index: usize, actual: u16) {
        let mut state = self.state.lock();
        if state.port == 0 && actual > 0 {
            state.port = actual;
            state.holder = Some(index);
        }
    }

    /// Release connector `index`. The group resets to its configured value
    /// only when the holder of the canonical port stops; other connectors
    /// stopping leave the group untouched.
    pub fn release(&self, index: usize) {
        let mut state = self.state.lock();
        if state.holder == Some(index) {
            state.port = self.configured;
            state.holder = None;
        }
    }
}

enum ShutdownControl {
    /// Plain HTTP served through `axum::serve`; cancelling drops the accept
    /// loop outright (no request drain).
    Token(CancellationToken),
    /// HTTPS served through `axum-server`; shutdown is immediate.
    Handle(axum_server::Handle),
}

/// One live listener.
pub struct BoundConnector {
    index: usize,
    protocol: Protocol,
    local_addr: SocketAddr,
    /// Whether this connector participates in the shared port group.
    grouped: bool,
    shutdown: ShutdownControl,
    task: JoinHandle<()>,
}

impl BoundConnector {
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Ordered set of listeners sharing one [`PortGroup`].
pub struct ConnectorSet {
    specs: Vec<ConnectorSpec>,
    port_group: Arc<PortGroup>,
    bus: Arc<LifecycleBus>,
    bound: Vec<BoundConnector>,
}

impl ConnectorSet {
    pub fn new(specs: Vec<ConnectorSpec>, port_group: Arc<PortGroup>, bus: Arc<LifecycleBus>) -> Self {
        Self {
            specs,
            port_group,
            bus,
            bound: Vec::new(),
        }
    }

    pub fn port_group(&self) -> Arc<PortGroup> {
        self.port_group.clone()
    }

    /// Ports of all live connectors, in bind order.
    pub fn bound_ports(&self) -> Vec<u16> {
        self.bound.iter().map(BoundConnector::port).collect()
    }

    pub fn bound_addrs(&self) -> Vec<SocketAddr> {
        self.bound.iter().map(BoundConnector::local_addr).collect()
    }

    /// Bind and start every connector in configuration order. On failure the
    /// connectors bound so far are stopped before the error propagates.
    pub async fn start_all(&mut self, router: Router) -> ServerResult<()> {
        for index in 0..self.specs.len() {
            let spec = self.specs[index].clone();
            let grouped = spec.port.is_none();
            self.bus
                .fire(LifecycleEvent::Connector {
                    index,
                    transition: Transition::BeforeStart,
                    port: spec.port.unwrap_or_else(|| self.port_group.bind_port()),
                })
                .await;

            let connector = match self.start_one(index, &spec, router.clone()).await {
                Ok(connector) => connector,
                Err(err) => {
                    self.stop_all().await;
                    return Err(err);
                }
            };

            let port = connector.port();
            if grouped {
                self.port_group.record(index, port);
            }
            self.bound.push(connector);

            self.bus
                .fire(LifecycleEvent::Connector {
                    index,
                    transition: Transition::AfterStart,
                    port,
                })
                .await;
        }
        Ok(())
    }

    async fn start_one(
        &self,
        index: usize,
        spec: &ConnectorSpec,
        router: Router,
    ) -> ServerResult<BoundConnector> {
        let bind_addr = spec
            .bind_addr
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let port = spec.port.unwrap_or_else(|| self.port_group.bind_port());
        let addr = SocketAddr::new(bind_addr, port);

        // Executor sizing: max_threads caps concurrently served requests on
        // this connector. One semaphore spans every route on the listener.
        let app = router.layer(GlobalConcurrencyLimitLayer::new(spec.executor.max_threads));
        info!(
            "connector[{}] {} binding {} (executor '{}': max={} spare={} idle={}ms)",
            index,
            spec.protocol,
            addr,
            spec.executor.name,
            spec.executor.max_threads,
            spec.executor.min_spare_threads,
            spec.executor.idle_timeout_ms
        );

        match spec.protocol {
            Protocol::Http => {
                let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
                    ServerError::bind_with_source(addr.to_string(), "failed to bind listener", e.into())
                })?;
                let local_addr = listener.local_addr().map_err(|e| {
                    ServerError::bind_with_source(addr.to_string(), "failed to read bound address", e.into())
                })?;

                let token = CancellationToken::new();
                let serve_token = token.clone();
                let task = tokio::spawn(async move {
                    let server = axum::serve(listener, app);
                    // Stop drops the accept loop; in-flight requests are not
                    // drained.
                    tokio::select! {
                        _ = serve_token.cancelled() => {}
                        result = server => {
                            if let Err(err) = result {
                                warn!("HTTP connector on {} exited: {}", local_addr, err);
                            }
                        }
                    }
                });

                Ok(BoundConnector {
                    index,
                    protocol: Protocol::Http,
                    local_addr,
                    grouped: spec.port.is_none(),
                    shutdown: ShutdownControl::Token(token),
                    task,
                })
            }
            Protocol::Https => {
                let tls = spec.tls.as_ref().ok_or_else(|| {
                    ServerError::config("HTTPS connector requires TLS material")
                })?;
                let tls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
                    .await
                    .map_err(|e| {
                        ServerError::startup_with_source(
                            format!("failed to load TLS material from {:?}", tls.cert_path),
                            e.into(),
                        )
                    })?;

                let listener = std::net::TcpListener::bind(addr).map_err(|e| {
                    ServerError::bind_with_source(addr.to_string(), "failed to bind listener", e.into())
                })?;
                listener.set_nonblocking(true)?;
                let local_addr = listener.local_addr()?;

                let handle = axum_server::Handle::new();
                let serve_handle = handle.clone();
                let task = tokio::spawn(async move {
                    let result = axum_server::from_tcp_rustls(listener, tls_config)
                        .handle(serve_handle)
                        .serve(app.into_make_service())
                        .await;
                    if let Err(err) = result {
                        warn!("HTTPS connector on {} exited: {}", local_addr, err);
                    }
                });

                Ok(BoundConnector {
                    index,
                    protocol: Protocol::Https,
                    local_addr,
                    grouped: spec.port.is_none(),
                    shutdown: ShutdownControl::Handle(handle),
                    task,
                })
            }
        }
    }

    /// Stop every live connector in bind order, releasing the port group as
    /// each one goes down.
    pub async fn stop_all(&mut self) {
        for connector in self.bound.drain(..) {
            let BoundConnector {
                index,
                protocol,
                local_addr,
                grouped,
                shutdown,
                task,
            } = connector;
            let port = local_addr.port();

            self.bus
                .fire(LifecycleEvent::Connector {
                    index,
                    transition: Transition::BeforeStop,
                    port,
                })
                .await;

            match shutdown {
                ShutdownControl::Token(token) => token.cancel(),
                ShutdownControl::Handle(handle) => handle.shutdown(),
            }
            if let Err(err) = task.await {
                warn!("{} connector on {} task join failed: {}", protocol, local_addr, err);
            }
            info!("connector[{}] {} stopped on {}", index, protocol, local_addr);

            if grouped {
                self.port_group.release(index);
            }
            self.bus
                .fire(LifecycleEvent::Connector {
                    index,
                    transition: Transition::AfterStop,
                    port,
                })
                .await;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }
}
