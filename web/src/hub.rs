//! Live-update fan-out for status page viewers.
//!
//! A single actor task owns the set of connected viewers. Everything else talks
//! to it through a [`HubHandle`], which sends commands over an `mpsc` channel:
//!
//! ```text
//! ws connection ── Register / Unregister ──┐
//!                                          ├──> ViewerHub (owns viewers)
//! choreographer ── Broadcast ──────────────┘          │
//!                                                     └──> one signal per viewer
//! ```
//!
//! The signal carries no content. Each viewer has a signal channel of capacity
//! one, so refreshes that arrive while one is still pending collapse into it.
//! A viewer whose receiving side is gone is dropped on the next broadcast.

use paysaga_core::notifier::{NotifyError, Notifier};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Text frame sent to a viewer on every refresh signal.
pub const UPDATE_FRAME: &str = "update";

/// Default capacity of the hub's command channel.
pub const DEFAULT_COMMAND_CAPACITY: usize = 64;

/// Identifier of a registered viewer.
pub type ViewerId = u64;

enum HubCommand {
    Register {
        id: ViewerId,
        signals: mpsc::Sender<()>,
    },
    Unregister {
        id: ViewerId,
    },
    Broadcast,
    Count {
        reply: oneshot::Sender<usize>,
    },
}

/// A registered viewer: its id and the refresh signals addressed to it.
#[derive(Debug)]
pub struct Viewer {
    /// Id to unregister with.
    pub id: ViewerId,
    /// Receives one `()` per refresh (coalesced while unread).
    pub signals: mpsc::Receiver<()>,
}

/// Actor owning the set of connected viewers.
pub struct ViewerHub {
    commands: mpsc::Receiver<HubCommand>,
    viewers: HashMap<ViewerId, mpsc::Sender<()>>,
}

impl ViewerHub {
    /// Spawn the hub actor on the current runtime.
    ///
    /// The actor stops once every [`HubHandle`] has been dropped.
    #[must_use]
    pub fn spawn(capacity: usize) -> (HubHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let hub = Self {
            commands: rx,
            viewers: HashMap::new(),
        };

        let handle = HubHandle {
            commands: tx,
            next_id: Arc::new(AtomicU64::new(1)),
        };

        (handle, tokio::spawn(hub.run()))
    }

    async fn run(mut self) {
        tracing::debug!("Viewer hub started");

        while let Some(command) = self.commands.recv().await {
            match command {
                HubCommand::Register { id, signals } => {
                    self.viewers.insert(id, signals);
                    tracing::debug!(viewer_id = id, viewers = self.viewers.len(), "Viewer registered");
                },
                HubCommand::Unregister { id } => {
                    if self.viewers.remove(&id).is_some() {
                        tracing::debug!(viewer_id = id, viewers = self.viewers.len(), "Viewer unregistered");
                    }
                },
                HubCommand::Broadcast => self.broadcast(),
                HubCommand::Count { reply } => {
                    let _ = reply.send(self.viewers.len());
                },
            }
        }

        tracing::debug!("Viewer hub stopped");
    }

    fn broadcast(&mut self) {
        self.viewers.retain(|id, signals| match signals.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => true,
            Err(mpsc::error::TrySendError::Closed(())) => {
                tracing::debug!(viewer_id = *id, "Dropping disconnected viewer");
                false
            },
        });

        tracing::debug!(viewers = self.viewers.len(), "Refresh broadcast");
    }
}

/// Cloneable handle to a running [`ViewerHub`].
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<HubCommand>,
    next_id: Arc<AtomicU64>,
}

impl HubHandle {
    /// Register a new viewer.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Closed`] if the hub has stopped.
    pub async fn register(&self) -> Result<Viewer, NotifyError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(1);

        self.commands
            .send(HubCommand::Register { id, signals: tx })
            .await
            .map_err(|_| NotifyError::Closed)?;

        Ok(Viewer { id, signals: rx })
    }

    /// Remove a viewer. Unknown ids are ignored.
    pub async fn unregister(&self, id: ViewerId) {
        if self.commands.send(HubCommand::Unregister { id }).await.is_err() {
            tracing::debug!(viewer_id = id, "Hub already stopped");
        }
    }

    /// Signal every registered viewer to refresh.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Closed`] if the hub has stopped.
    pub async fn broadcast(&self) -> Result<(), NotifyError> {
        self.commands
            .send(HubCommand::Broadcast)
            .await
            .map_err(|_| NotifyError::Closed)
    }

    /// Number of registered viewers.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Closed`] if the hub has stopped.
    pub async fn viewer_count(&self) -> Result<usize, NotifyError> {
        let (reply, answer) = oneshot::channel();
        self.commands
            .send(HubCommand::Count { reply })
            .await
            .map_err(|_| NotifyError::Closed)?;
        answer.await.map_err(|_| NotifyError::Closed)
    }
}

impl Notifier for HubHandle {
    fn notify_refresh(&self) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        Box::pin(self.broadcast())
    }
}
