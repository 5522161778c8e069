//! Database lifecycle adapter
//!
//! Links the embedded database to server lifecycle events: the database
//! opens on `Server(BeforeStart)`, its naming resources bind on
//! `Server(ConfigureStart)`, and both are torn down on `Server(AfterStop)`.
//! The adapter holds explicit references to the service and registry; it is
//! wired in by the configurator, not looked up globally.

use crate::lifecycle::{LifecycleBus, LifecycleEvent, LifecycleObserver, Transition};
use crate::resources::{Resource, ResourceRegistry, DATA_SOURCE_NAME, ENV_VALUE_NAME};
use async_trait::async_trait;
use localdb::DatabaseService;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Demonstration environment value bound alongside the data source.
pub const ENV_TEST_VALUE: i64 = 12345;

/// Opens/closes the embedded database in lockstep with the server.
pub struct DbLifecycleAdapter {
    service: Arc<DatabaseService>,
    db_dir: PathBuf,
    registry: Option<Arc<ResourceRegistry>>,
}

impl DbLifecycleAdapter {
    pub fn new(service: Arc<DatabaseService>, db_dir: impl Into<PathBuf>) -> Self {
        Self {
            service,
            db_dir: db_dir.into(),
            registry: None,
        }
    }

    /// Also bind the data source and environment value into `registry`
    /// during `ConfigureStart`.
    pub fn with_registry(mut self, registry: Arc<ResourceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Subscribe this adapter to the bus.
    pub fn attach(self, bus: &LifecycleBus) {
        bus.subscribe("db-lifecycle", Arc::new(self));
    }
}

#[async_trait]
impl LifecycleObserver for DbLifecycleAdapter {
    async fn on_event(&self, event: &LifecycleEvent) -> anyhow::Result<()> {
        match event {
            LifecycleEvent::Server(Transition::BeforeStart) => {
                self.service.start(&self.db_dir).await?;
            }
            LifecycleEvent::Server(Transition::ConfigureStart) => {
                if let Some(registry) = &self.registry {
                    let handle = self.service.handle().await?;
                    registry.register(DATA_SOURCE_NAME, Resource::DataSource(handle))?;
                    registry.register(ENV_VALUE_NAME, Resource::Value(ENV_TEST_VALUE))?;
                    info!("bound naming resources: {:?}", registry.names());
                }
            }
            LifecycleEvent::Server(Transition::AfterStop) => {
                if let Some(registry) = &self.registry {
                    registry.remove(DATA_SOURCE_NAME);
                    registry.remove(ENV_VALUE_NAME);
                }
                self.service.stop().await;
            }
            _ => {}
        }
        Ok(())
    }
}
