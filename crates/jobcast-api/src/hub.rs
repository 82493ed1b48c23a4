//! Broadcast hub for live status updates.
//!
//! A single coordinator task owns the set of registered observers and
//! serializes registration, removal and broadcast. Each observer gets a
//! forwarding task that moves messages, in broadcast order, from an
//! unbounded staging queue into the observer's bounded outbox. A stalled
//! observer holds up only its own forwarder, and is dropped once a single
//! message waits longer than the write timeout.

use jobcast_config::HubConfig;
use jobcast_core::{StatusEvent, StatusNotifier};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Identity of a registered observer.
pub type ObserverId = u64;

/// A message queued for observers. Shared, not copied, across outboxes.
pub type OutboundMessage = Arc<str>;

enum HubCommand {
    Register {
        id: ObserverId,
        outbox: mpsc::Sender<OutboundMessage>,
    },
    Unregister(ObserverId),
    Broadcast(OutboundMessage),
    Count(oneshot::Sender<usize>),
}

/// Handle to the hub. Cheap to clone.
#[derive(Clone)]
pub struct BroadcastHub {
    commands: mpsc::UnboundedSender<HubCommand>,
    next_id: Arc<AtomicU64>,
    observer_buffer: usize,
}

/// The coordinator side of the hub; run it on its own task.
pub struct HubCoordinator {
    commands: mpsc::UnboundedReceiver<HubCommand>,
    requeue: mpsc::WeakUnboundedSender<HubCommand>,
    observers: HashMap<ObserverId, mpsc::UnboundedSender<OutboundMessage>>,
    write_timeout: Duration,
}

impl BroadcastHub {
    pub fn new(config: &HubConfig) -> (Self, HubCoordinator) {
        let (tx, rx) = mpsc::unbounded_channel();
        let coordinator = HubCoordinator {
            commands: rx,
            requeue: tx.downgrade(),
            observers: HashMap::new(),
            write_timeout: config.write_timeout,
        };
        let hub = Self {
            commands: tx,
            next_id: Arc::new(AtomicU64::new(1)),
            observer_buffer: config.observer_buffer.max(1),
        };
        (hub, coordinator)
    }

    /// Register a new observer and return its id and outbox.
    ///
    /// The caller drains the outbox onto the connection. Dropping the outbox
    /// makes the next delivery fail, which unregisters the observer.
    pub fn register(&self) -> (ObserverId, mpsc::Receiver<OutboundMessage>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.observer_buffer);
        self.send(HubCommand::Register { id, outbox: tx });
        (id, rx)
    }

    /// Remove an observer. Safe to call more than once.
    pub fn unregister(&self, id: ObserverId) {
        self.send(HubCommand::Unregister(id));
    }

    /// Queue a message for every registered observer.
    pub fn broadcast(&self, message: impl Into<OutboundMessage>) {
        self.send(HubCommand::Broadcast(message.into()));
    }

    /// Number of registered observers, or 0 if the coordinator has stopped.
    pub async fn observer_count(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        self.send(HubCommand::Count(tx));
        rx.await.unwrap_or(0)
    }

    fn send(&self, command: HubCommand) {
        if self.commands.send(command).is_err() {
            debug!("Hub coordinator stopped, dropping command");
        }
    }
}

impl StatusNotifier for BroadcastHub {
    fn publish(&self, event: StatusEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => self.broadcast(json),
            Err(e) => warn!(job_id = %event.job_id, error = %e, "Failed to encode status event"),
        }
    }
}

impl HubCoordinator {
    /// Process hub commands until cancelled or every hub handle is dropped.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Starting broadcast hub");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }

        info!(observers = self.observers.len(), "Broadcast hub stopped");
    }

    fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register { id, outbox } => {
                let staging = self.spawn_forwarder(id, outbox);
                self.observers.insert(id, staging);
                debug!(observer = id, total = self.observers.len(), "Observer registered");
            }
            HubCommand::Unregister(id) => {
                if self.observers.remove(&id).is_some() {
                    debug!(observer = id, total = self.observers.len(), "Observer unregistered");
                }
            }
            HubCommand::Broadcast(message) => self.broadcast(message),
            HubCommand::Count(reply) => {
                let _ = reply.send(self.observers.len());
            }
        }
    }

    fn broadcast(&mut self, message: OutboundMessage) {
        // A send only fails once the forwarder has exited.
        self.observers
            .retain(|id, staging| match staging.send(message.clone()) {
                Ok(()) => true,
                Err(_) => {
                    debug!(observer = id, "Observer writer gone, removed");
                    false
                }
            });
    }

    /// Start the single writer for one observer and return its staging queue.
    ///
    /// Dropping the returned sender ends the writer once the queue drains.
    fn spawn_forwarder(
        &self,
        id: ObserverId,
        outbox: mpsc::Sender<OutboundMessage>,
    ) -> mpsc::UnboundedSender<OutboundMessage> {
        let (staging, mut pending) = mpsc::unbounded_channel::<OutboundMessage>();
        let requeue = self.requeue.clone();
        let write_timeout = self.write_timeout;

        tokio::spawn(async move {
            while let Some(message) = pending.recv().await {
                if outbox.send_timeout(message, write_timeout).await.is_err() {
                    warn!(observer = id, "Observer too slow or gone, dropping it");
                    if let Some(requeue) = requeue.upgrade() {
                        let _ = requeue.send(HubCommand::Unregister(id));
                    }
                    break;
                }
            }
        });

        staging
    }
}
