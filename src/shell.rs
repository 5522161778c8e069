//! Presentation shell
//!
//! Headless stand-in for the desktop window: start/stop/open controls whose
//! enablement mirrors the server and context lifecycle states. Commands
//! arrive over a channel; lifecycle callbacks (which run on server tasks)
//! marshal back to the shell task through a refresh channel, and the shell
//! re-reads current state from the facade on every notice rather than
//! trusting event payloads.
//!
//! Errors from start/stop are caught at this boundary and surfaced as a
//! status message; the shell keeps running.

use crate::lifecycle::{LifecycleEvent, LifecycleState};
use crate::server::EmbeddedServer;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

/// Enablement of the three shell controls, derived purely from state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonStates {
    pub start: bool,
    pub stop: bool,
    pub open: bool,
}

/// Pure mapping from lifecycle states to control enablement.
pub fn button_states(server: LifecycleState, context: LifecycleState) -> ButtonStates {
    let start = matches!(
        server,
        LifecycleState::New | LifecycleState::Initialized | LifecycleState::Stopped
    );
    let stop = server == LifecycleState::Started;
    let open = context == LifecycleState::Started;
    ButtonStates { start, stop, open }
}

/// User-initiated shell actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellCommand {
    Start,
    Stop,
    Open,
    Close,
}

/// Snapshot of the shell's view of the world.
#[derive(Debug, Clone, PartialEq)]
pub struct ShellStatus {
    pub server: LifecycleState,
    pub context: LifecycleState,
    pub buttons: ButtonStates,
    /// Error or informational message surfaced at the shell boundary.
    pub message: Option<String>,
    /// URL produced by the most recent Open action.
    pub opened_url: Option<String>,
}

impl ShellStatus {
    fn initial() -> Self {
        Self {
            server: LifecycleState::New,
            context: LifecycleState::New,
            buttons: button_states(LifecycleState::New, LifecycleState::New),
            message: None,
            opened_url: None,
        }
    }

    /// One-line status text, e.g. `srv=STARTED / ctx=STARTED`.
    pub fn status_line(&self) -> String {
        format!("srv={} / ctx={}", self.server, self.context)
    }
}

/// Handle held by the embedder: command sender plus observable status.
#[derive(Clone)]
pub struct ShellHandle {
    commands: mpsc::UnboundedSender<ShellCommand>,
    status: watch::Receiver<ShellStatus>,
}

impl ShellHandle {
    pub fn send(&self, command: ShellCommand) {
        // A closed shell simply ignores further commands.
        let _ = self.commands.send(command);
    }

    pub fn status(&self) -> watch::Receiver<ShellStatus> {
        self.status.clone()
    }
}

/// The shell task: the single owner of user-initiated lifecycle actions.
pub struct Shell {
    server: Arc<EmbeddedServer>,
    commands: mpsc::UnboundedReceiver<ShellCommand>,
    refresh: mpsc::UnboundedReceiver<()>,
    status: watch::Sender<ShellStatus>,
    opened_url: Option<String>,
}

impl Shell {
    /// Create a shell over the server, wiring a refresh observer into the
    /// server's lifecycle bus.
    pub fn new(server: Arc<EmbeddedServer>) -> (Self, ShellHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ShellStatus::initial());

        // Lifecycle callbacks run on server tasks; sending a unit notice is
        // the cross-thread marshaling point.
        server.bus().subscribe_fn("shell-refresh", move |_event: &LifecycleEvent| {
            let _ = refresh_tx.send(());
            Ok(())
        });

        let shell = Self {
            server,
            commands: command_rx,
            refresh: refresh_rx,
            status: status_tx,
            opened_url: None,
        };
        let handle = ShellHandle {
            commands: command_tx,
            status: status_rx,
        };
        (shell, handle)
    }

    /// Run until a `Close` command. Always publishes a final status.
    pub async fn run(mut self) {
        self.publish(None);
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(ShellCommand::Start) => self.handle_start().await,
                        Some(ShellCommand::Stop) => self.handle_stop().await,
                        Some(ShellCommand::Open) => self.handle_open(),
                        Some(ShellCommand::Close) | None => {
                            self.handle_close().await;
                            break;
                        }
                    }
                }
                notice = self.refresh.recv() => {
                    if notice.is_some() {
                        // Pull-based refresh: re-read state, ignore payloads.
                        self.publish(None);
                    }
                }
            }
        }
    }

    async fn handle_start(&mut self) {
        info!("shell: start requested");
        match self.server.start().await {
            Ok(()) => self.publish(None),
            Err(err) => {
                error!("start failed: {err}");
                self.publish(Some(format!("ERROR: {err}")));
            }
        }
    }

    async fn handle_stop(&mut self) {
        info!("shell: stop requested");
        match self.server.stop().await {
            Ok(()) => self.publish(None),
            Err(err) => {
                error!("stop failed: {err}");
                self.publish(Some(format!("ERROR: {err}")));
            }
        }
    }

    fn handle_open(&mut self) {
        let buttons = button_states(self.server.state(), self.server.context_state());
        if !buttons.open {
            self.publish(Some("application context is not started".to_string()));
            return;
        }
        let url = format!("http://localhost:{}/", self.server.port());
        info!("shell: open {url}");
        self.opened_url = Some(url);
        self.publish(None);
    }

    async fn handle_close(&mut self) {
        info!("shell: close requested");
        if let Err(err) = self.server.destroy().await {
            error!("destroy failed: {err}");
            self.publish(Some(format!("ERROR: {err}")));
            return;
        }
        self.publish(None);
    }

    fn publish(&self, message: Option<String>) {
        let server = self.server.state();
        let context = self.server.context_state();
        self.status.send_replace(ShellStatus {
            server,
            context,
            buttons: button_states(server, context),
            message,
            opened_url: self.opened_url.clone(),
        });
    }
}
