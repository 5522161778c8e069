//! Lifecycle states and event bus
//!
//! The server facade, the application context, and each connector move
//! through [`LifecycleState`]s; the transitions between them are broadcast
//! as typed [`LifecycleEvent`]s over a [`LifecycleBus`].
//!
//! Dispatch contract: observers run in registration order, awaited one at a
//! time on the task performing the transition. A slow observer therefore
//! delays the transition. An observer returning an error is logged and does
//! not roll back the transition in progress, nor does it stop later
//! observers from running.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Lifecycle state of a server component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    New,
    Initialized,
    Starting,
    Started,
    Stopping,
    Stopped,
    Destroyed,
    Failed,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleState::New => "NEW",
            LifecycleState::Initialized => "INITIALIZED",
            LifecycleState::Starting => "STARTING",
            LifecycleState::Started => "STARTED",
            LifecycleState::Stopping => "STOPPING",
            LifecycleState::Stopped => "STOPPED",
            LifecycleState::Destroyed => "DESTROYED",
            LifecycleState::Failed => "FAILED",
        };
        write!(f, "{name}")
    }
}

/// A named lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    BeforeStart,
    ConfigureStart,
    AfterStart,
    BeforeStop,
    AfterStop,
}

/// A transition event tagged with the component it belongs to.
///
/// Connector events carry the connector's index in the configured set and
/// its bound port (0 when not bound yet).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Server(Transition),
    Context(Transition),
    Connector {
        index: usize,
        transition: Transition,
        port: u16,
    },
}

/// Observer of lifecycle events.
#[async_trait]
pub trait LifecycleObserver: Send + Sync {
    async fn on_event(&self, event: &LifecycleEvent) -> anyhow::Result<()>;
}

struct FnObserver<F>(F);

#[async_trait]
impl<F> LifecycleObserver for FnObserver<F>
where
    F: Fn(&LifecycleEvent) -> anyhow::Result<()> + Send + Sync,
{
    async fn on_event(&self, event: &LifecycleEvent) -> anyhow::Result<()> {
        (self.0)(event)
    }
}

#[derive(Clone)]
struct Registration {
    name: String,
    observer: Arc<dyn LifecycleObserver>,
}

/// Subscription list dispatching lifecycle events in registration order.
pub struct LifecycleBus {
    observers: Mutex<Vec<Registration>>,
}

impl LifecycleBus {
    pub fn new() -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Register an observer. Observers are invoked in registration order.
    pub fn subscribe(&self, name: impl Into<String>, observer: Arc<dyn LifecycleObserver>) {
        self.observers.lock().push(Registration {
            name: name.into(),
            observer,
        });
    }

    /// Register a synchronous closure as an observer.
    pub fn subscribe_fn<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&LifecycleEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(name, Arc::new(FnObserver(f)));
    }

    /// Broadcast an event to every observer, in registration order, on the
    /// calling task. Observer errors are contained here: they are logged
    /// and dispatch continues.
    pub async fn fire(&self, event: LifecycleEvent) {
        debug!("lifecycle event: {:?}", event);
        let observers: Vec<Registration> = self.observers.lock().clone();
        for registration in observers {
            if let Err(err) = registration.observer.on_event(&event).await {
                warn!(
                    "lifecycle observer '{}' failed on {:?}: {:#}",
                    registration.name, event, err
                );
            }
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }
}

impl Default for LifecycleBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_observers_run_in_registration_order() {
        let bus = LifecycleBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for id in 0..3 {
            let seen = seen.clone();
            bus.subscribe_fn(format!("observer-{id}"), move |_| {
                seen.lock().push(id);
                Ok(())
            });
        }

        bus.fire(LifecycleEvent::Server(Transition::BeforeStart)).await;
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_failing_observer_does_not_stop_dispatch() {
        let bus = LifecycleBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        {
            let seen = seen.clone();
            bus.subscribe_fn("first", move |_| {
                seen.lock().push("first");
                Ok(())
            });
        }
        bus.subscribe_fn("failing", |_| anyhow::bail!("observer blew up"));
        {
            let seen = seen.clone();
            bus.subscribe_fn("last", move |_| {
                seen.lock().push("last");
                Ok(())
            });
        }

        bus.fire(LifecycleEvent::Server(Transition::AfterStop)).await;
        assert_eq!(*seen.lock(), vec!["first", "last"]);
    }

    #[tokio::test]
    async fn test_typed_event_matching() {
        let bus = LifecycleBus::new();
        let before_starts = Arc::new(Mutex::new(0usize));

        {
            let before_starts = before_starts.clone();
            bus.subscribe_fn("db", move |event| {
                if matches!(event, LifecycleEvent::Server(Transition::BeforeStart)) {
                    *before_starts.lock() += 1;
                }
                Ok(())
            });
        }

        bus.fire(LifecycleEvent::Server(Transition::BeforeStart)).await;
        bus.fire(LifecycleEvent::Context(Transition::BeforeStart)).await;
        bus.fire(LifecycleEvent::Connector {
            index: 0,
            transition: Transition::BeforeStart,
            port: 0,
        })
        .await;
        bus.fire(LifecycleEvent::Server(Transition::AfterStart)).await;

        assert_eq!(*before_starts.lock(), 1);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(LifecycleState::Started.to_string(), "STARTED");
        assert_eq!(LifecycleState::Stopped.to_string(), "STOPPED");
    }
}
