pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::{Order, OrderStatus};
use crate::models::party::{Customer, Restaurant};
use crate::models::runner::Runner;

#[derive(Debug, Clone)]
pub enum ChangeEvent {
    OrderCreated { after: Order },
    OrderUpdated { before: Order, after: Order },
    RunnerCreated { after: Runner },
    RunnerUpdated { before: Runner, after: Runner },
}

#[derive(Debug, Clone, Copy)]
pub enum OrderUpdate {
    SetStatus(OrderStatus),
    SetRunner(Uuid),
    SetWaiting(bool),
    MarkCredited,
}

#[derive(Debug, Clone, Copy)]
pub enum RunnerUpdate {
    SetActive(bool),
    AddActive(i64),
    AddCompleted(i64),
    AddTotalCompleted(i64),
    SetCompleted(u32),
    SetTotalCompleted(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    // expected version did not match; nothing was written
    Conflict,
}

#[derive(Debug, Clone, Copy)]
pub struct StoreCounts {
    pub orders: usize,
    pub runners: usize,
    pub waiting: usize,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, AppError>;
    async fn get_runner(&self, id: Uuid) -> Result<Option<Runner>, AppError>;
    async fn get_restaurant(&self, id: Uuid) -> Result<Option<Restaurant>, AppError>;
    async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>, AppError>;

    async fn create_order(&self, order: Order) -> Result<(), AppError>;
    async fn upsert_runner(&self, runner: Runner) -> Result<(), AppError>;

    async fn active_runners(&self) -> Result<Vec<Runner>, AppError>;
    async fn all_runners(&self) -> Result<Vec<Runner>, AppError>;
    async fn open_orders_for_runner(&self, runner: Uuid) -> Result<Vec<Order>, AppError>;
    async fn waiting_orders(&self, limit: usize) -> Result<Vec<Order>, AppError>;

    async fn update_order(
        &self,
        id: Uuid,
        expected_version: Option<u64>,
        ops: &[OrderUpdate],
    ) -> Result<WriteOutcome, AppError>;

    async fn update_runner(
        &self,
        id: Uuid,
        expected_version: Option<u64>,
        ops: &[RunnerUpdate],
    ) -> Result<WriteOutcome, AppError>;

    async fn batch_update_runners(
        &self,
        updates: Vec<(Uuid, Vec<RunnerUpdate>)>,
    ) -> Result<(), AppError>;

    async fn counts(&self) -> Result<StoreCounts, AppError>;
}
