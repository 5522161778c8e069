//! Kiosk Server
//!
//! Harness for embedding a local web server inside a desktop-style
//! application. It provides:
//!
//! - **Server Facade**: explicit init/start/stop/destroy lifecycle over an
//!   Axum-served web application directory
//! - **Lifecycle Bus**: typed transition events dispatched to observers in
//!   registration order
//! - **Connector Set**: loopback-restricted multi-address listeners sharing
//!   one auto-assigned port, plus optional TLS listeners
//! - **Database Lifecycle**: an embedded SQLite database opened on
//!   before-start and closed on after-stop, published through a named
//!   resource registry
//! - **Presentation Shell**: channel-driven start/stop/open controls whose
//!   enablement is a pure function of lifecycle state
//!
//! # Architecture
//!
//! ```text
//! Shell command
//!      │
//!      ▼
//! ┌───────────────┐
//! │ EmbeddedServer│──► state transitions
//! └──────┬────────┘
//!        │ fires
//!        ▼
//! ┌───────────────┐     ┌────────────────┐
//! │ Lifecycle Bus │────►│ Db Adapter     │──► open/close SQLite
//! └──────┬────────┘     │ Shell refresh  │──► re-read state
//!        │              └────────────────┘
//!        ▼
//! ┌───────────────┐
//! │ Connector Set │──► bind loopback/TLS listeners, shared port
//! └───────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use kiosk_server::config::AppLayout;
//! use kiosk_server::configurator::{Configurator, DatabaseConfigurator};
//! use kiosk_server::resources::ResourceRegistry;
//! use kiosk_server::server::EmbeddedServer;
//! use kiosk_server::shell::{Shell, ShellCommand};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let configurator = DatabaseConfigurator::new();
//!     let config = configurator
//!         .build(AppLayout::new("."), None)
//!         .unwrap();
//!     let server = Arc::new(EmbeddedServer::new(config, Arc::new(ResourceRegistry::new())));
//!     configurator.wire(&server).unwrap();
//!     server.init().await.unwrap();
//!
//!     let (shell, handle) = Shell::new(server);
//!     handle.send(ShellCommand::Start);
//!     shell.run().await;
//! }
//! ```

pub mod config;
pub mod configurator;
pub mod connector;
pub mod database;
pub mod error;
pub mod lifecycle;
pub mod net;
pub mod resources;
pub mod server;
pub mod shell;
pub mod webapp;

// Re-exports for convenience
pub use config::{AppLayout, ConnectorSpec, Protocol, ServerConfig, ThreadPoolSpec, TlsMaterial};
pub use configurator::{
    Configurator, DatabaseConfigurator, LoopbackConfigurator, MinimalConfigurator, TlsConfigurator,
};
pub use error::{ServerError, ServerResult};
pub use lifecycle::{LifecycleBus, LifecycleEvent, LifecycleObserver, LifecycleState, Transition};
pub use resources::{Resource, ResourceRegistry, DATA_SOURCE_NAME, ENV_VALUE_NAME};
pub use server::EmbeddedServer;
pub use shell::{button_states, ButtonStates, Shell, ShellCommand, ShellHandle, ShellStatus};

// Re-export localdb types for embedders
pub use localdb::{DatabaseHandle, DatabaseService, DbError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "Kiosk Server";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "Kiosk Server");
    }
}
