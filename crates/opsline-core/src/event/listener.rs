//! Bridges the event bus to the execution coordinator.
//!
//! The listener consumes the bus's command channel and hands every command to
//! the task queue as a job that calls `ExecutionCoordinator::handle_event`.
//! While the queue is full the listener waits, and the bounded command channel
//! in turn holds senders back; no command is dropped.

use std::sync::Arc;

use opsline_types::event::PipelineEvent;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::execution::ExecutionCoordinator;
use crate::queue::TaskQueue;
use crate::repository::pipeline::PipelineRepository;
use crate::repository::service_request::ServiceRequestRepository;
use crate::repository::step_log::StepLogRepository;

use super::bus::EventBus;

/// Background task forwarding bus commands into the task queue.
pub struct EventListener {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl EventListener {
    /// Start forwarding commands sent on `bus`.
    ///
    /// Commands sent before or after `spawn` are all delivered: they wait in
    /// the bus's command channel until the listener takes them.
    pub fn spawn<P, S, L>(
        bus: &EventBus,
        coordinator: Arc<ExecutionCoordinator<P, S, L>>,
        queue: TaskQueue,
    ) -> Self
    where
        P: PipelineRepository + 'static,
        S: ServiceRequestRepository + 'static,
        L: StepLogRepository + 'static,
    {
        let receiver = bus.command_receiver();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(listen(receiver, coordinator, queue, cancel.clone()));
        Self { cancel, handle }
    }

    /// Stop listening after forwarding every command already sent.
    ///
    /// Jobs already handed to the queue keep running; shut the queue down
    /// afterwards to wait for them.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "event listener task panicked");
        }
    }
}

async fn listen<P, S, L>(
    receiver: Arc<Mutex<mpsc::Receiver<PipelineEvent>>>,
    coordinator: Arc<ExecutionCoordinator<P, S, L>>,
    queue: TaskQueue,
    cancel: CancellationToken,
) where
    P: PipelineRepository + 'static,
    S: ServiceRequestRepository + 'static,
    L: StepLogRepository + 'static,
{
    let mut receiver = receiver.lock().await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            received = receiver.recv() => match received {
                Some(event) => forward(event, &coordinator, &queue).await,
                None => {
                    tracing::debug!("command channel closed; listener stopping");
                    return;
                }
            },
        }
    }

    // Forward whatever was sent before the cancellation.
    while let Ok(event) = receiver.try_recv() {
        forward(event, &coordinator, &queue).await;
    }
    tracing::debug!("event listener stopped");
}

async fn forward<P, S, L>(
    event: PipelineEvent,
    coordinator: &Arc<ExecutionCoordinator<P, S, L>>,
    queue: &TaskQueue,
) where
    P: PipelineRepository + 'static,
    S: ServiceRequestRepository + 'static,
    L: StepLogRepository + 'static,
{
    if !event.is_command() {
        return;
    }

    let request_id = event.request_id();
    let coordinator = Arc::clone(coordinator);
    let job = async move {
        match coordinator.handle_event(&event).await {
            Ok(Some(report)) => tracing::debug!(
                request_id = %report.request_id,
                status = %report.status,
                "command handled"
            ),
            Ok(None) => {}
            Err(e) => tracing::warn!(
                request_id = %request_id,
                kind = ?event.kind(),
                error = %e,
                "command rejected"
            ),
        }
    };

    if let Err(e) = queue.enqueue(job).await {
        tracing::warn!(request_id = %request_id, error = %e, "could not queue command");
    }
}
