use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::assignment::AssignmentCoordinator;
use crate::error::AppError;
use crate::models::order::OrderStatus;
use crate::observability::metrics::Metrics;
use crate::store::ChangeEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    AssignOrder(Uuid),
    CreditDelivery(Uuid),
    DrainWaiting(Uuid),
}

impl Trigger {
    // the (entity, transition) routing table; everything else is a no-op,
    // including redelivered events whose before and after are identical
    pub fn classify(event: &ChangeEvent) -> Option<Trigger> {
        match event {
            ChangeEvent::OrderCreated { after }
                if after.runner.is_none() && after.status.is_open() =>
            {
                Some(Trigger::AssignOrder(after.id))
            }
            ChangeEvent::OrderUpdated { before, after }
                if before.status != OrderStatus::Delivered
                    && after.status == OrderStatus::Delivered
                    && after.runner.is_some() =>
            {
                Some(Trigger::CreditDelivery(after.id))
            }
            ChangeEvent::RunnerCreated { after } if after.is_active => {
                Some(Trigger::DrainWaiting(after.id))
            }
            ChangeEvent::RunnerUpdated { before, after }
                if !before.is_active && after.is_active =>
            {
                Some(Trigger::DrainWaiting(after.id))
            }
            _ => None,
        }
    }
}

pub struct Dispatcher {
    coordinator: Arc<AssignmentCoordinator>,
    metrics: Metrics,
}

impl Dispatcher {
    pub fn new(coordinator: Arc<AssignmentCoordinator>, metrics: Metrics) -> Self {
        Self {
            coordinator,
            metrics,
        }
    }

    pub async fn dispatch(&self, event: ChangeEvent) {
        let Some(trigger) = Trigger::classify(&event) else {
            return;
        };

        let start = Instant::now();
        let result = match trigger {
            Trigger::AssignOrder(id) => self.coordinator.handle_order_created(id).await,
            Trigger::CreditDelivery(id) => self.coordinator.handle_order_delivered(id).await,
            Trigger::DrainWaiting(id) => self.coordinator.handle_runner_activated(id).await,
        };
        let elapsed = start.elapsed().as_secs_f64();

        // failures stop at this boundary; the event source redelivers, the
        // handlers are idempotent
        match result {
            Ok(()) => {
                self.metrics
                    .handler_latency_seconds
                    .with_label_values(&["success"])
                    .observe(elapsed);
            }
            Err(AppError::NotFound(what)) => {
                self.metrics
                    .handler_latency_seconds
                    .with_label_values(&["skipped"])
                    .observe(elapsed);
                warn!(?trigger, "skipping event: {what} missing");
            }
            Err(err) => {
                self.metrics
                    .handler_latency_seconds
                    .with_label_values(&["error"])
                    .observe(elapsed);
                error!(?trigger, error = %err, "event handler failed");
            }
        }
    }
}

pub async fn run_event_loop(
    dispatcher: Arc<Dispatcher>,
    mut events_rx: mpsc::UnboundedReceiver<ChangeEvent>,
) {
    info!("event loop started");

    while let Some(event) = events_rx.recv().await {
        let dispatcher = dispatcher.clone();
        // one task per event; ordering across handlers is not guaranteed and
        // the store's version guards carry the correctness
        tokio::spawn(async move {
            dispatcher.dispatch(event).await;
        });
    }

    warn!("event loop stopped: change stream closed");
}
