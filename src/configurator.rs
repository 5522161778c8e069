//! Configurator strategies
//!
//! A closed set of server assemblies selected at the process boundary,
//! replacing dynamic selection with compile-time strategy objects. Each
//! configurator builds a [`ServerConfig`] over the install layout and wires
//! whatever observers its assembly needs into the server's lifecycle bus.
//!
//! - `minimal`: one all-interfaces HTTP listener on a fixed port.
//! - `loopback`: local-only listeners on every loopback address, sharing
//!   one auto-assigned port.
//! - `database`: `loopback` plus the embedded database and naming
//!   resources, opened and closed with the server.
//! - `tls`: `database` plus an HTTPS listener on its own fixed port.

use crate::config::{AppLayout, ConnectorSpec, ServerConfig, ThreadPoolSpec, TlsMaterial};
use crate::database::DbLifecycleAdapter;
use crate::error::{ServerError, ServerResult};
use crate::net;
use crate::server::EmbeddedServer;
use localdb::DatabaseService;
use std::sync::Arc;

/// Default fixed port for the minimal assembly.
pub const DEFAULT_HTTP_PORT: u16 = 8081;

/// Default fixed port for the HTTPS listener.
pub const DEFAULT_HTTPS_PORT: u16 = 8443;

/// A server assembly strategy.
pub trait Configurator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Build the server configuration. `port` is the process-level port
    /// setting; `None` uses the strategy's default.
    fn build(&self, layout: AppLayout, port: Option<u16>) -> ServerResult<ServerConfig>;

    /// Subscribe the strategy's observers to the server's lifecycle bus.
    /// Must run before the first `start`.
    fn wire(&self, _server: &EmbeddedServer) -> ServerResult<()> {
        Ok(())
    }
}

/// One all-interfaces HTTP listener on a fixed port.
pub struct MinimalConfigurator;

impl Configurator for MinimalConfigurator {
    fn name(&self) -> &'static str {
        "minimal"
    }

    fn build(&self, layout: AppLayout, port: Option<u16>) -> ServerResult<ServerConfig> {
        let listen_port = port.unwrap_or(DEFAULT_HTTP_PORT);
        Ok(ServerConfig::new(layout)
            .with_listen_port(listen_port)
            .with_connector(ConnectorSpec::http(ThreadPoolSpec::new("executor1"))))
    }
}

/// Local-only listeners on every loopback address sharing one port.
pub struct LoopbackConfigurator;

impl LoopbackConfigurator {
    fn connectors(&self) -> ServerResult<Vec<ConnectorSpec>> {
        let addresses = net::loopback_addresses();
        if addresses.is_empty() {
            return Err(ServerError::config("no loopback addresses available"));
        }
        // IPv4 and IPv6 loopback need one listener each; all join the
        // shared port group.
        Ok(addresses
            .into_iter()
            .map(|addr| {
                ConnectorSpec::http(ThreadPoolSpec::new("executor1")).with_bind_addr(addr)
            })
            .collect())
    }
}

impl Configurator for LoopbackConfigurator {
    fn name(&self) -> &'static str {
        "loopback"
    }

    fn build(&self, layout: AppLayout, port: Option<u16>) -> ServerResult<ServerConfig> {
        let mut config = ServerConfig::new(layout).with_listen_port(port.unwrap_or(0));
        for connector in self.connectors()? {
            config = config.with_connector(connector);
        }
        Ok(config)
    }
}

/// `loopback` plus the embedded database and naming resources.
pub struct DatabaseConfigurator {
    inner: LoopbackConfigurator,
}

impl DatabaseConfigurator {
    pub fn new() -> Self {
        Self {
            inner: LoopbackConfigurator,
        }
    }
}

impl Default for DatabaseConfigurator {
    fn default() -> Self {
        Self::new()
    }
}

impl Configurator for DatabaseConfigurator {
    fn name(&self) -> &'static str {
        "database"
    }

    fn build(&self, layout: AppLayout, port: Option<u16>) -> ServerResult<ServerConfig> {
        self.inner.build(layout, port)
    }

    fn wire(&self, server: &EmbeddedServer) -> ServerResult<()> {
        let service = Arc::new(DatabaseService::new());
        DbLifecycleAdapter::new(service, server.config().layout.db_dir())
            .with_registry(server.registry())
            .attach(&server.bus());
        Ok(())
    }
}

/// `database` plus an HTTPS listener on its own fixed port.
pub struct TlsConfigurator {
    inner: DatabaseConfigurator,
    https_port: u16,
}

impl TlsConfigurator {
    pub fn new() -> Self {
        Self {
            inner: DatabaseConfigurator::new(),
            https_port: DEFAULT_HTTPS_PORT,
        }
    }

    pub fn with_https_port(mut self, port: u16) -> Self {
        self.https_port = port;
        self
    }
}

impl Default for TlsConfigurator {
    fn default() -> Self {
        Self::new()
    }
}

impl Configurator for TlsConfigurator {
    fn name(&self) -> &'static str {
        "tls"
    }

    fn build(&self, layout: AppLayout, port: Option<u16>) -> ServerResult<ServerConfig> {
        let tls = TlsMaterial {
            cert_path: layout.tls_dir().join("cert.pem"),
            key_path: layout.tls_dir().join("key.pem"),
        };
        if !tls.cert_path.is_file() || !tls.key_path.is_file() {
            return Err(ServerError::config(format!(
                "TLS material not found under {:?} (expected cert.pem and key.pem)",
                layout.tls_dir()
            )));
        }

        let config = self.inner.build(layout, port)?;
        Ok(config.with_connector(
            ConnectorSpec::https(tls, ThreadPoolSpec::new("executor2"))
                .with_port(self.https_port),
        ))
    }

    fn wire(&self, server: &EmbeddedServer) -> ServerResult<()> {
        self.inner.wire(server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Protocol;
    use crate::resources::ResourceRegistry;
    use tempfile::TempDir;

    fn layout(dir: &TempDir) -> AppLayout {
        let layout = AppLayout::new(dir.path());
        std::fs::create_dir_all(layout.webapp_dir()).unwrap();
        layout
    }

    #[test]
    fn test_minimal_uses_fixed_port() {
        let dir = TempDir::new().unwrap();
        let config = MinimalConfigurator.build(layout(&dir), None).unwrap();
        assert_eq!(config.listen_port, DEFAULT_HTTP_PORT);
        assert_eq!(config.connectors.len(), 1);
        assert!(config.connectors[0].bind_addr.is_none());
    }

    #[test]
    fn test_minimal_honors_port_override() {
        let dir = TempDir::new().unwrap();
        let config = MinimalConfigurator.build(layout(&dir), Some(9090)).unwrap();
        assert_eq!(config.listen_port, 9090);
    }

    #[test]
    fn test_loopback_builds_one_connector_per_address() {
        let dir = TempDir::new().unwrap();
        let config = LoopbackConfigurator.build(layout(&dir), None).unwrap();
        assert_eq!(config.listen_port, 0);
        assert_eq!(config.connectors.len(), net::loopback_addresses().len());
        for connector in &config.connectors {
            assert!(connector.bind_addr.unwrap().is_loopback());
            assert!(connector.port.is_none());
        }
    }

    #[tokio::test]
    async fn test_database_wire_subscribes_adapter() {
        let dir = TempDir::new().unwrap();
        let configurator = DatabaseConfigurator::new();
        let config = configurator.build(layout(&dir), None).unwrap();
        let server = EmbeddedServer::new(config, Arc::new(ResourceRegistry::new()));

        let before = server.bus().observer_count();
        configurator.wire(&server).unwrap();
        assert_eq!(server.bus().observer_count(), before + 1);
    }

    #[test]
    fn test_tls_requires_certificate_material() {
        let dir = TempDir::new().unwrap();
        let err = TlsConfigurator::new().build(layout(&dir), None).unwrap_err();
        assert!(err.to_string().contains("TLS material"));
    }

    #[test]
    fn test_tls_adds_https_connector_on_fixed_port() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        std::fs::create_dir_all(layout.tls_dir()).unwrap();
        std::fs::write(layout.tls_dir().join("cert.pem"), "cert").unwrap();
        std::fs::write(layout.tls_dir().join("key.pem"), "key").unwrap();

        let config = TlsConfigurator::new()
            .with_https_port(9443)
            .build(layout, None)
            .unwrap();

        let https = config.connectors.last().unwrap();
        assert_eq!(https.protocol, Protocol::Https);
        assert_eq!(https.port, Some(9443));
        assert!(https.tls.is_some());
    }
}
