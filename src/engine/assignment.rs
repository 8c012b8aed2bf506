use std::sync::Arc;

use tokio::time::{sleep, Duration};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::engine::conflict::ConflictChecker;
use crate::engine::counters::CounterLifecycle;
use crate::engine::selector::RunnerSelector;
use crate::error::AppError;
use crate::models::order::Order;
use crate::models::runner::Runner;
use crate::notify::Notifier;
use crate::observability::metrics::Metrics;
use crate::store::{OrderUpdate, RunnerUpdate, Store, WriteOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    Assigned(Uuid),
    Waiting,
    // a concurrent handler got to the order first
    Lost,
}

pub struct AssignmentCoordinator {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    selector: RunnerSelector,
    checker: ConflictChecker,
    counters: CounterLifecycle,
    metrics: Metrics,
    config: EngineConfig,
}

impl AssignmentCoordinator {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        metrics: Metrics,
        config: EngineConfig,
    ) -> Self {
        Self {
            selector: RunnerSelector::new(store.clone(), config.conflict_window_minutes),
            checker: ConflictChecker::new(store.clone(), config.conflict_window_minutes),
            counters: CounterLifecycle::new(store.clone(), metrics.clone()),
            store,
            notifier,
            metrics,
            config,
        }
    }

    pub async fn handle_order_created(&self, order_id: Uuid) -> Result<(), AppError> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("order {order_id}")))?;

        // replayed creation events land here with the runner already set
        if order.runner.is_some() || order.status.is_terminal() {
            return Ok(());
        }

        self.notify_created(&order).await?;
        self.assign(order).await?;
        Ok(())
    }

    pub async fn handle_order_delivered(&self, order_id: Uuid) -> Result<(), AppError> {
        self.counters.credit_delivery(order_id).await
    }

    pub async fn handle_runner_activated(&self, runner_id: Uuid) -> Result<(), AppError> {
        let runner = self
            .store
            .get_runner(runner_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("runner {runner_id}")))?;

        if !runner.is_active {
            // deactivated again before this handler ran
            return Ok(());
        }

        let waiting = self
            .store
            .waiting_orders(self.config.activation_batch_cap)
            .await?;

        let mut drained = 0usize;
        for order in waiting {
            if self.assign_to(runner_id, order).await? {
                drained += 1;
            }
        }

        if drained > 0 {
            info!(runner_id = %runner_id, drained, "drained waiting orders onto activated runner");
        }
        Ok(())
    }

    // selection and the load increment are both version-guarded: the increment
    // only lands if the runner is unchanged since it was read, and the order
    // write only lands if no concurrent handler assigned it first
    pub async fn assign(&self, order: Order) -> Result<AssignOutcome, AppError> {
        for attempt in 0..self.config.assign_max_attempts {
            let Some(runner) = self.selector.select(order.delivery_time).await? else {
                return self.mark_waiting(&order).await;
            };

            let outcome = self
                .store
                .update_runner(runner.id, Some(runner.version), &[RunnerUpdate::AddActive(1)])
                .await?;
            if outcome == WriteOutcome::Conflict {
                warn!(
                    order_id = %order.id,
                    runner_id = %runner.id,
                    attempt,
                    "runner changed during selection; retrying"
                );
                sleep(Duration::from_millis(self.config.assign_retry_backoff_ms)).await;
                continue;
            }

            return self.commit_assignment(&order, &runner).await;
        }

        warn!(order_id = %order.id, "assignment attempts exhausted");
        self.mark_waiting(&order).await
    }

    // activation drain path: the target runner is fixed, only the conflict
    // check and the paired writes remain
    async fn assign_to(&self, runner_id: Uuid, order: Order) -> Result<bool, AppError> {
        let runner = self
            .store
            .get_runner(runner_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("runner {runner_id}")))?;

        if !runner.is_active {
            return Ok(false);
        }

        if let Some(time) = order.delivery_time {
            if self.checker.has_conflict(runner_id, time).await? {
                info!(order_id = %order.id, runner_id = %runner_id, "waiting order conflicts; leaving it waiting");
                return Ok(false);
            }
        }

        let outcome = self
            .store
            .update_runner(runner.id, Some(runner.version), &[RunnerUpdate::AddActive(1)])
            .await?;
        if outcome == WriteOutcome::Conflict {
            warn!(order_id = %order.id, runner_id = %runner_id, "runner changed during drain; leaving order waiting");
            return Ok(false);
        }

        Ok(matches!(
            self.commit_assignment(&order, &runner).await?,
            AssignOutcome::Assigned(_)
        ))
    }

    async fn commit_assignment(
        &self,
        order: &Order,
        runner: &Runner,
    ) -> Result<AssignOutcome, AppError> {
        let outcome = self
            .store
            .update_order(
                order.id,
                Some(order.version),
                &[OrderUpdate::SetRunner(runner.id), OrderUpdate::SetWaiting(false)],
            )
            .await?;

        if outcome == WriteOutcome::Conflict {
            // release the slot taken above; the winner accounted for its own
            self.store
                .update_runner(runner.id, None, &[RunnerUpdate::AddActive(-1)])
                .await?;
            info!(order_id = %order.id, "order already assigned by a concurrent handler");
            return Ok(AssignOutcome::Lost);
        }

        if order.waiting_for_runner {
            self.metrics.waiting_orders.dec();
        }
        self.metrics
            .assignments_total
            .with_label_values(&["assigned"])
            .inc();
        self.metrics
            .runner_active_orders
            .with_label_values(&[&runner.id.to_string()])
            .set(i64::from(runner.active_orders) + 1);

        self.notifier.runner_assigned(runner, order).await;
        info!(
            order_id = %order.id,
            order_num = order.order_num,
            runner_id = %runner.id,
            "order assigned"
        );
        Ok(AssignOutcome::Assigned(runner.id))
    }

    async fn mark_waiting(&self, order: &Order) -> Result<AssignOutcome, AppError> {
        let outcome = self
            .store
            .update_order(order.id, Some(order.version), &[OrderUpdate::SetWaiting(true)])
            .await?;

        if outcome == WriteOutcome::Conflict {
            return Ok(AssignOutcome::Lost);
        }

        if !order.waiting_for_runner {
            self.metrics.waiting_orders.inc();
        }
        self.metrics
            .assignments_total
            .with_label_values(&["waiting"])
            .inc();

        self.notifier.no_runner_available(order).await;
        warn!(order_id = %order.id, order_num = order.order_num, "no runner available; order is waiting");
        Ok(AssignOutcome::Waiting)
    }

    async fn notify_created(&self, order: &Order) -> Result<(), AppError> {
        let restaurant = self
            .store
            .get_restaurant(order.restaurant)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("restaurant {}", order.restaurant)))?;
        let customer = self
            .store
            .get_customer(order.customer)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("customer {}", order.customer)))?;

        self.notifier.order_created(order, &restaurant, &customer).await;
        Ok(())
    }
}
