//
// Copyright 2025-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Event dispatcher
//!
//! Decodes deliveries, routes each event to its handler and reports an outcome
//! for acknowledgement. Every delivery is acknowledged whatever the outcome;
//! nothing is retried.
//!
//! Events are partitioned over a fixed set of workers by player ID so that all
//! events for one player are applied in arrival order by a single worker.

use crate::badges::BadgeResolver;
use crate::config::DispatcherConfig;
use crate::error::{ErrorKind, PresenceResult};
use crate::presence::PresenceStateMachine;
use chrono::{DateTime, Utc};
use metrics::counter;
use presence_common::event::{DecodeError, EventEnvelope, TimedEvent};
use presence_common::InboundEvent;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Result of processing one delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Handled,
    Failed(ErrorKind),
    /// The delivery carried an event kind this service does not consume
    Skipped,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Handled => "handled",
            DeliveryOutcome::Failed(_) => "failed",
            DeliveryOutcome::Skipped => "skipped",
        }
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryOutcome::Failed(kind) => write!(f, "failed ({})", kind),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Routes a decoded event to the component that owns it
#[derive(Clone)]
pub struct EventRouter {
    presence: PresenceStateMachine,
    badges: BadgeResolver,
}

impl EventRouter {
    pub fn new(presence: PresenceStateMachine, badges: BadgeResolver) -> Self {
        Self { presence, badges }
    }

    pub async fn route(&self, event: &TimedEvent) -> PresenceResult<()> {
        match &event.event {
            InboundEvent::PlayerConnect(connect) => {
                self.presence.connect(connect, event.timestamp).await?;
            }
            InboundEvent::PlayerDisconnect(disconnect) => {
                self.presence.disconnect(disconnect, event.timestamp).await?;
            }
            InboundEvent::PlayerServerSwitch(switch) => {
                self.presence.switch_server(switch).await?;
            }
            InboundEvent::PlayerRoleChanged(change) => {
                self.badges.apply_role_change(change).await?;
            }
        }
        Ok(())
    }

    /// Route and classify, logging failures
    async fn process(&self, event: &TimedEvent) -> DeliveryOutcome {
        let kind = event.event.kind();
        let player_id = event.event.player_id();
        let outcome = match self.route(event).await {
            Ok(()) => DeliveryOutcome::Handled,
            Err(e) => {
                match e.kind() {
                    ErrorKind::Unavailable => {
                        tracing::error!(%kind, %player_id, "Event handling failed: {}", e)
                    }
                    _ => tracing::warn!(%kind, %player_id, "Event rejected: {}", e),
                }
                DeliveryOutcome::Failed(e.kind())
            }
        };
        counter!("presence_events_total", "kind" => kind.as_str(), "outcome" => outcome.as_str())
            .increment(1);
        outcome
    }
}

struct Job {
    event: TimedEvent,
    reply: oneshot::Sender<DeliveryOutcome>,
}

/// Cloneable submission side of the dispatcher
#[derive(Clone)]
pub struct DispatchHandle {
    queues: Arc<Vec<mpsc::Sender<Job>>>,
}

impl DispatchHandle {
    /// Decode a raw delivery and process it, returning once it has been handled
    pub async fn dispatch(&self, body: &[u8], received_at: DateTime<Utc>) -> DeliveryOutcome {
        match EventEnvelope::decode(body, received_at) {
            Ok(event) => self.submit(event).await,
            Err(DecodeError::UnknownKind(kind)) => {
                tracing::warn!(%kind, "Skipping unknown event kind");
                counter!("presence_events_total", "kind" => "unknown", "outcome" => "skipped")
                    .increment(1);
                DeliveryOutcome::Skipped
            }
            Err(e) => {
                tracing::warn!("Discarding undecodable delivery: {}", e);
                counter!("presence_events_total", "kind" => "malformed", "outcome" => "failed")
                    .increment(1);
                DeliveryOutcome::Failed(ErrorKind::Validation)
            }
        }
    }

    /// Queue an already decoded event on its player's worker
    pub async fn submit(&self, event: TimedEvent) -> DeliveryOutcome {
        let partition = (event.event.player_id().as_u128() % self.queues.len() as u128) as usize;
        let (reply, outcome) = oneshot::channel();
        if self.queues[partition].send(Job { event, reply }).await.is_err() {
            tracing::error!(partition, "Dispatcher worker has stopped");
            return DeliveryOutcome::Failed(ErrorKind::Unavailable);
        }
        outcome
            .await
            .unwrap_or(DeliveryOutcome::Failed(ErrorKind::Unavailable))
    }
}

/// Worker pool owning the per-partition queues
pub struct Dispatcher {
    handle: DispatchHandle,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    pub fn start(router: EventRouter, config: &DispatcherConfig) -> Self {
        let worker_count = config.workers.max(1);
        let queue_depth = config.queue_depth.max(1);

        let mut queues = Vec::with_capacity(worker_count);
        let mut workers = Vec::with_capacity(worker_count);
        for worker in 0..worker_count {
            let (sender, receiver) = mpsc::channel(queue_depth);
            queues.push(sender);
            workers.push(tokio::spawn(run_worker(worker, router.clone(), receiver)));
        }
        tracing::info!(worker_count, queue_depth, "Event dispatcher started");

        Self {
            handle: DispatchHandle {
                queues: Arc::new(queues),
            },
            workers,
        }
    }

    pub fn handle(&self) -> DispatchHandle {
        self.handle.clone()
    }

    /// Close the queues and wait for workers to drain them.
    ///
    /// Queues only close once every outstanding [`DispatchHandle`] is dropped,
    /// so producers must be stopped first.
    pub async fn shutdown(self) {
        drop(self.handle);
        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::error!("Dispatcher worker panicked: {}", e);
            }
        }
        tracing::info!("Event dispatcher drained");
    }
}

async fn run_worker(worker: usize, router: EventRouter, mut receiver: mpsc::Receiver<Job>) {
    tracing::debug!(worker, "Dispatcher worker running");
    while let Some(job) = receiver.recv().await {
        let outcome = router.process(&job.event).await;
        // Producer may have gone away; the event is applied regardless
        let _ = job.reply.send(outcome);
    }
    tracing::debug!(worker, "Dispatcher worker stopped");
}
