use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::Order;
use crate::models::party::{Customer, Restaurant};
use crate::models::runner::Runner;
use crate::store::{
    ChangeEvent, OrderUpdate, RunnerUpdate, Store, StoreCounts, WriteOutcome,
};

pub struct MemoryStore {
    orders: DashMap<Uuid, Order>,
    runners: DashMap<Uuid, Runner>,
    restaurants: DashMap<Uuid, Restaurant>,
    customers: DashMap<Uuid, Customer>,
    events_tx: mpsc::UnboundedSender<ChangeEvent>,
}

impl MemoryStore {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ChangeEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        (
            Self {
                orders: DashMap::new(),
                runners: DashMap::new(),
                restaurants: DashMap::new(),
                customers: DashMap::new(),
                events_tx,
            },
            events_rx,
        )
    }

    pub fn insert_restaurant(&self, restaurant: Restaurant) {
        self.restaurants.insert(restaurant.id, restaurant);
    }

    pub fn insert_customer(&self, customer: Customer) {
        self.customers.insert(customer.id, customer);
    }

    fn emit(&self, event: ChangeEvent) {
        // receiver dropped means no engine is listening; writes still apply
        let _ = self.events_tx.send(event);
    }
}

fn apply_order_ops(order: &mut Order, ops: &[OrderUpdate]) {
    for op in ops {
        match op {
            OrderUpdate::SetStatus(status) => order.status = *status,
            OrderUpdate::SetRunner(runner) => order.runner = Some(*runner),
            OrderUpdate::SetWaiting(waiting) => order.waiting_for_runner = *waiting,
            OrderUpdate::MarkCredited => order.runner_credited = true,
        }
    }
    order.version += 1;
}

fn apply_runner_ops(runner: &mut Runner, ops: &[RunnerUpdate]) {
    for op in ops {
        match op {
            RunnerUpdate::SetActive(active) => runner.is_active = *active,
            RunnerUpdate::AddActive(delta) => {
                runner.active_orders = add_clamped(runner.active_orders, *delta);
            }
            RunnerUpdate::AddCompleted(delta) => {
                runner.completed_orders = add_clamped(runner.completed_orders, *delta);
            }
            RunnerUpdate::AddTotalCompleted(delta) => {
                runner.total_completed_orders =
                    add_clamped(runner.total_completed_orders, *delta);
            }
            RunnerUpdate::SetCompleted(value) => runner.completed_orders = *value,
            RunnerUpdate::SetTotalCompleted(value) => runner.total_completed_orders = *value,
        }
    }
    runner.version += 1;
    runner.updated_at = Utc::now();
}

// counters are non-negative; decrements floor at 0
fn add_clamped(current: u32, delta: i64) -> u32 {
    if delta >= 0 {
        current.saturating_add(delta.min(i64::from(u32::MAX)) as u32)
    } else {
        current.saturating_sub(delta.unsigned_abs().min(u64::from(u32::MAX)) as u32)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, AppError> {
        Ok(self.orders.get(&id).map(|entry| entry.value().clone()))
    }

    async fn get_runner(&self, id: Uuid) -> Result<Option<Runner>, AppError> {
        Ok(self.runners.get(&id).map(|entry| entry.value().clone()))
    }

    async fn get_restaurant(&self, id: Uuid) -> Result<Option<Restaurant>, AppError> {
        Ok(self.restaurants.get(&id).map(|entry| entry.value().clone()))
    }

    async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>, AppError> {
        Ok(self.customers.get(&id).map(|entry| entry.value().clone()))
    }

    async fn create_order(&self, order: Order) -> Result<(), AppError> {
        self.orders.insert(order.id, order.clone());
        self.emit(ChangeEvent::OrderCreated { after: order });
        Ok(())
    }

    async fn upsert_runner(&self, runner: Runner) -> Result<(), AppError> {
        let before = self.runners.insert(runner.id, runner.clone());
        match before {
            Some(before) => self.emit(ChangeEvent::RunnerUpdated {
                before,
                after: runner,
            }),
            None => self.emit(ChangeEvent::RunnerCreated { after: runner }),
        }
        Ok(())
    }

    async fn active_runners(&self) -> Result<Vec<Runner>, AppError> {
        Ok(self
            .runners
            .iter()
            .filter(|entry| entry.value().is_active)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn all_runners(&self) -> Result<Vec<Runner>, AppError> {
        Ok(self
            .runners
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn open_orders_for_runner(&self, runner: Uuid) -> Result<Vec<Order>, AppError> {
        Ok(self
            .orders
            .iter()
            .filter(|entry| {
                let order = entry.value();
                order.runner == Some(runner) && order.status.is_open()
            })
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn waiting_orders(&self, limit: usize) -> Result<Vec<Order>, AppError> {
        let mut waiting: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| {
                let order = entry.value();
                order.waiting_for_runner && order.runner.is_none() && order.status.is_open()
            })
            .map(|entry| entry.value().clone())
            .collect();

        waiting.sort_by_key(|order| order.created_at);
        waiting.truncate(limit);
        Ok(waiting)
    }

    async fn update_order(
        &self,
        id: Uuid,
        expected_version: Option<u64>,
        ops: &[OrderUpdate],
    ) -> Result<WriteOutcome, AppError> {
        let mut entry = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("order {id}")))?;

        if let Some(expected) = expected_version {
            if entry.value().version != expected {
                return Ok(WriteOutcome::Conflict);
            }
        }

        let before = entry.value().clone();
        apply_order_ops(entry.value_mut(), ops);
        let after = entry.value().clone();
        drop(entry);

        self.emit(ChangeEvent::OrderUpdated { before, after });
        Ok(WriteOutcome::Applied)
    }

    async fn update_runner(
        &self,
        id: Uuid,
        expected_version: Option<u64>,
        ops: &[RunnerUpdate],
    ) -> Result<WriteOutcome, AppError> {
        let mut entry = self
            .runners
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("runner {id}")))?;

        if let Some(expected) = expected_version {
            if entry.value().version != expected {
                return Ok(WriteOutcome::Conflict);
            }
        }

        let before = entry.value().clone();
        apply_runner_ops(entry.value_mut(), ops);
        let after = entry.value().clone();
        drop(entry);

        self.emit(ChangeEvent::RunnerUpdated { before, after });
        Ok(WriteOutcome::Applied)
    }

    async fn batch_update_runners(
        &self,
        updates: Vec<(Uuid, Vec<RunnerUpdate>)>,
    ) -> Result<(), AppError> {
        for (id, ops) in updates {
            // unconditional per-document writes; a missing runner fails the batch
            self.update_runner(id, None, &ops).await?;
        }
        Ok(())
    }

    async fn counts(&self) -> Result<StoreCounts, AppError> {
        let waiting = self
            .orders
            .iter()
            .filter(|entry| entry.value().waiting_for_runner)
            .count();

        Ok(StoreCounts {
            orders: self.orders.len(),
            runners: self.runners.len(),
            waiting,
        })
    }
}
