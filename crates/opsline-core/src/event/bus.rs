//! Event bus for pipeline commands and notifications.
//!
//! Notifications go out on a `tokio::sync::broadcast` channel: any number of
//! subscribers, and a slow subscriber loses old events rather than holding up
//! the coordinator. Commands (`ServiceRequestStarted`, `StepCompleted`) must
//! not be lost, so they also travel on a bounded `mpsc` channel read by the
//! event listener. Sending a command waits for room instead of dropping it.

use std::sync::Arc;

use opsline_types::event::PipelineEvent;
use tokio::sync::{broadcast, mpsc, Mutex};

/// Bus carrying pipeline commands and notifications.
///
/// Cloning the bus clones the senders; every clone feeds the same
/// subscribers and the same command receiver.
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
    commands: mpsc::Sender<PipelineEvent>,
    command_rx: Arc<Mutex<mpsc::Receiver<PipelineEvent>>>,
}

impl EventBus {
    /// Create a new event bus. `capacity` bounds both the notification
    /// buffer and the number of commands waiting for the listener.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        let (commands, command_rx) = mpsc::channel(capacity);
        Self {
            sender,
            commands,
            command_rx: Arc::new(Mutex::new(command_rx)),
        }
    }

    /// Create a new subscriber that will receive all future notifications
    /// and a copy of every command.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    /// Publish a notification to all current subscribers.
    ///
    /// If there are no subscribers, the event is dropped. Commands published
    /// here are seen by subscribers only; use [`EventBus::send_command`] to
    /// reach the coordinator.
    pub fn publish(&self, event: PipelineEvent) {
        tracing::trace!(
            request_id = %event.request_id(),
            kind = ?event.kind(),
            "publishing pipeline event"
        );
        let _ = self.sender.send(event);
    }

    /// Queue a command for the listener, waiting while the command channel
    /// is full. Subscribers receive a copy.
    ///
    /// A notification passed here is only published.
    pub async fn send_command(&self, event: PipelineEvent) {
        if !event.is_command() {
            self.publish(event);
            return;
        }

        self.publish(event.clone());
        // The bus owns the receiver, so the channel outlives every sender.
        if self.commands.send(event).await.is_err() {
            tracing::error!("command channel closed; command dropped");
        }
    }

    /// The single command receiver. The listener holds the lock while it
    /// runs, so at most one listener consumes commands at a time.
    pub(crate) fn command_receiver(&self) -> Arc<Mutex<mpsc::Receiver<PipelineEvent>>> {
        Arc::clone(&self.command_rx)
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Commands sent but not yet taken by the listener.
    pub fn pending_commands(&self) -> usize {
        self.commands.max_capacity() - self.commands.capacity()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            commands: self.commands.clone(),
            command_rx: Arc::clone(&self.command_rx),
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .field("pending_commands", &self.pending_commands())
            .finish()
    }
}
