//! Server configuration
//!
//! Configuration model for the embedded server: the install-root filesystem
//! layout, per-connector listener specs with their executor sizing, and the
//! top-level [`ServerConfig`] consumed by the server facade.

use crate::error::{ServerError, ServerResult};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// Filesystem layout beneath the application's install root.
///
/// All server state lives under one root directory:
/// `logs/`, `work/`, `webapp/`, `db/`, and `tls/` for certificate material.
#[derive(Debug, Clone)]
pub struct AppLayout {
    root: PathBuf,
}

impl AppLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for server and access logs.
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Scratch directory for server working state.
    pub fn work_dir(&self) -> PathBuf {
        self.root.join("work")
    }

    /// Directory holding the deployed web application content.
    pub fn webapp_dir(&self) -> PathBuf {
        self.root.join("webapp")
    }

    /// Directory holding the embedded database files.
    pub fn db_dir(&self) -> PathBuf {
        self.root.join("db")
    }

    /// Directory holding PEM certificate material for TLS connectors.
    pub fn tls_dir(&self) -> PathBuf {
        self.root.join("tls")
    }

    /// Create the directories the server writes to. The webapp directory is
    /// deployed content and is validated, not created.
    pub fn ensure_writable_dirs(&self) -> ServerResult<()> {
        std::fs::create_dir_all(self.logs_dir())?;
        std::fs::create_dir_all(self.work_dir())?;
        std::fs::create_dir_all(self.db_dir())?;
        Ok(())
    }
}

/// Listener protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Https,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Http => write!(f, "http"),
            Protocol::Https => write!(f, "https"),
        }
    }
}

/// PEM certificate and key backing an HTTPS connector.
#[derive(Debug, Clone)]
pub struct TlsMaterial {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Executor sizing for one connector.
///
/// `max_threads` bounds the number of requests served concurrently on the
/// connector. `min_spare_threads` and `idle_timeout_ms` are advisory sizing
/// hints carried through to logs.
#[derive(Debug, Clone)]
pub struct ThreadPoolSpec {
    pub name: String,
    pub max_threads: usize,
    pub min_spare_threads: usize,
    pub idle_timeout_ms: u64,
}

impl ThreadPoolSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_threads: 20,
            min_spare_threads: 2,
            idle_timeout_ms: 60_000,
        }
    }

    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    pub fn with_min_spare_threads(mut self, min_spare_threads: usize) -> Self {
        self.min_spare_threads = min_spare_threads;
        self
    }

    pub fn with_idle_timeout_ms(mut self, idle_timeout_ms: u64) -> Self {
        self.idle_timeout_ms = idle_timeout_ms;
        self
    }

    fn validate(&self) -> ServerResult<()> {
        if self.max_threads == 0 {
            return Err(ServerError::config(format!(
                "executor '{}': max_threads must be at least 1",
                self.name
            )));
        }
        if self.min_spare_threads > self.max_threads {
            return Err(ServerError::config(format!(
                "executor '{}': min_spare_threads ({}) exceeds max_threads ({})",
                self.name, self.min_spare_threads, self.max_threads
            )));
        }
        Ok(())
    }
}

/// One network listener configuration.
#[derive(Debug, Clone)]
pub struct ConnectorSpec {
    pub protocol: Protocol,
    /// Address to bind. `None` binds all interfaces.
    pub bind_addr: Option<IpAddr>,
    /// Fixed port for this connector alone. `None` joins the server's
    /// shared port group.
    pub port: Option<u16>,
    pub tls: Option<TlsMaterial>,
    pub executor: ThreadPoolSpec,
}

impl ConnectorSpec {
    pub fn http(executor: ThreadPoolSpec) -> Self {
        Self {
            protocol: Protocol::Http,
            bind_addr: None,
            port: None,
            tls: None,
            executor,
        }
    }

    pub fn https(tls: TlsMaterial, executor: ThreadPoolSpec) -> Self {
        Self {
            protocol: Protocol::Https,
            bind_addr: None,
            port: None,
            tls: Some(tls),
            executor,
        }
    }

    pub fn with_bind_addr(mut self, addr: IpAddr) -> Self {
        self.bind_addr = Some(addr);
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    fn validate(&self) -> ServerResult<()> {
        if self.protocol == Protocol::Https && self.tls.is_none() {
            return Err(ServerError::config(
                "HTTPS connector requires TLS material",
            ));
        }
        self.executor.validate()
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port shared by auto-grouped connectors. 0 requests OS assignment.
    pub listen_port: u16,
    /// Install-root layout; the base directory must exist or be creatable
    /// before server start.
    pub layout: AppLayout,
    /// Ordered connector set; connectors bind in this order.
    pub connectors: Vec<ConnectorSpec>,
    /// Enable permissive CORS on the application router.
    pub cors_enabled: bool,
}

impl ServerConfig {
    pub fn new(layout: AppLayout) -> Self {
        Self {
            listen_port: 0,
            layout,
            connectors: Vec::new(),
            cors_enabled: false,
        }
    }

    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = port;
        self
    }

    pub fn with_connector(mut self, connector: ConnectorSpec) -> Self {
        self.connectors.push(connector);
        self
    }

    pub fn with_cors(mut self, enabled: bool) -> Self {
        self.cors_enabled = enabled;
        self
    }

    /// Validate the configuration ahead of server initialization.
    pub fn validate(&self) -> ServerResult<()> {
        if self.connectors.is_empty() {
            return Err(ServerError::config("at least one connector is required"));
        }
        for connector in &self.connectors {
            connector.validate()?;
        }
        if !self.layout.webapp_dir().is_dir() {
            return Err(ServerError::config(format!(
                "webapp directory not found: {:?}",
                self.layout.webapp_dir()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tempfile::TempDir;

    fn layout_with_webapp() -> (TempDir, AppLayout) {
        let dir = TempDir::new().unwrap();
        let layout = AppLayout::new(dir.path());
        std::fs::create_dir_all(layout.webapp_dir()).unwrap();
        (dir, layout)
    }

    #[test]
    fn test_layout_paths() {
        let layout = AppLayout::new("/opt/app");
        assert_eq!(layout.logs_dir(), PathBuf::from("/opt/app/logs"));
        assert_eq!(layout.work_dir(), PathBuf::from("/opt/app/work"));
        assert_eq!(layout.webapp_dir(), PathBuf::from("/opt/app/webapp"));
        assert_eq!(layout.db_dir(), PathBuf::from("/opt/app/db"));
        assert_eq!(layout.tls_dir(), PathBuf::from("/opt/app/tls"));
    }

    #[test]
    fn test_ensure_writable_dirs() {
        let dir = TempDir::new().unwrap();
        let layout = AppLayout::new(dir.path());
        layout.ensure_writable_dirs().unwrap();
        assert!(layout.logs_dir().is_dir());
        assert!(layout.work_dir().is_dir());
        assert!(layout.db_dir().is_dir());
    }

    #[test]
    fn test_config_builder() {
        let (_dir, layout) = layout_with_webapp();
        let config = ServerConfig::new(layout)
            .with_listen_port(8081)
            .with_connector(
                ConnectorSpec::http(ThreadPoolSpec::new("executor1"))
                    .with_bind_addr(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            );

        assert_eq!(config.listen_port, 8081);
        assert_eq!(config.connectors.len(), 1);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_requires_connectors() {
        let (_dir, layout) = layout_with_webapp();
        let config = ServerConfig::new(layout);
        assert!(matches!(
            config.validate().unwrap_err(),
            ServerError::Config { .. }
        ));
    }

    #[test]
    fn test_validate_requires_webapp_dir() {
        let dir = TempDir::new().unwrap();
        let config = ServerConfig::new(AppLayout::new(dir.path()))
            .with_connector(ConnectorSpec::http(ThreadPoolSpec::new("executor1")));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("webapp"));
    }

    #[test]
    fn test_https_requires_tls_material() {
        let (_dir, layout) = layout_with_webapp();
        let mut spec = ConnectorSpec::http(ThreadPoolSpec::new("executor2"));
        spec.protocol = Protocol::Https;
        let config = ServerConfig::new(layout).with_connector(spec);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_executor_spec_bounds() {
        let spec = ThreadPoolSpec::new("executor1")
            .with_max_threads(2)
            .with_min_spare_threads(5);
        let (_dir, layout) = layout_with_webapp();
        let config = ServerConfig::new(layout).with_connector(ConnectorSpec::http(spec));
        assert!(config.validate().is_err());
    }
}
