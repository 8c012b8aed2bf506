use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDateTime, Utc};
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::DeliveryTime;
use crate::observability::metrics::Metrics;
use crate::store::{OrderUpdate, RunnerUpdate, Store, WriteOutcome};

pub struct CounterLifecycle {
    store: Arc<dyn Store>,
    metrics: Metrics,
}

impl CounterLifecycle {
    pub fn new(store: Arc<dyn Store>, metrics: Metrics) -> Self {
        Self { store, metrics }
    }

    // at-least-once event delivery: the order is marked credited under a
    // version guard, and only the handler that wins the mark touches the
    // runner's counters
    pub async fn credit_delivery(&self, order_id: Uuid) -> Result<(), AppError> {
        loop {
            let order = self
                .store
                .get_order(order_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("order {order_id}")))?;

            if order.runner_credited {
                return Ok(());
            }
            let Some(runner_id) = order.runner else {
                warn!(order_id = %order.id, "delivered without a runner; nothing to credit");
                return Ok(());
            };

            let outcome = self
                .store
                .update_order(order.id, Some(order.version), &[OrderUpdate::MarkCredited])
                .await?;

            match outcome {
                WriteOutcome::Conflict => continue,
                WriteOutcome::Applied => {
                    self.store
                        .update_runner(
                            runner_id,
                            None,
                            &[
                                RunnerUpdate::AddActive(-1),
                                RunnerUpdate::AddCompleted(1),
                                RunnerUpdate::AddTotalCompleted(1),
                            ],
                        )
                        .await?;

                    if let Some(runner) = self.store.get_runner(runner_id).await? {
                        self.metrics
                            .runner_active_orders
                            .with_label_values(&[&runner_id.to_string()])
                            .set(i64::from(runner.active_orders));
                    }

                    info!(order_id = %order.id, runner_id = %runner_id, "delivery credited");
                    return Ok(());
                }
            }
        }
    }

    pub async fn reset_daily(&self) -> Result<usize, AppError> {
        let runners = self.store.all_runners().await?;
        let count = runners.len();

        let updates = runners
            .into_iter()
            .map(|runner| (runner.id, vec![RunnerUpdate::SetCompleted(0)]))
            .collect();
        self.store.batch_update_runners(updates).await?;

        info!(runners = count, "daily completed-orders reset");
        Ok(count)
    }

    pub async fn reset_monthly(&self) -> Result<usize, AppError> {
        let runners = self.store.all_runners().await?;
        let count = runners.len();

        let updates = runners
            .into_iter()
            .map(|runner| (runner.id, vec![RunnerUpdate::SetTotalCompleted(0)]))
            .collect();
        self.store.batch_update_runners(updates).await?;

        info!(runners = count, "monthly completed-orders reset");
        Ok(count)
    }
}

pub async fn run_daily_reset(lifecycle: Arc<CounterLifecycle>, at: DeliveryTime) {
    info!(at = %at, "daily reset scheduled");
    loop {
        sleep(until_next_daily(Utc::now(), at)).await;
        if let Err(err) = lifecycle.reset_daily().await {
            error!(error = %err, "daily reset failed");
        }
    }
}

pub async fn run_monthly_reset(lifecycle: Arc<CounterLifecycle>, day_of_month: u32, at: DeliveryTime) {
    info!(day_of_month, at = %at, "monthly reset scheduled");
    loop {
        sleep(until_next_monthly(Utc::now(), day_of_month, at)).await;
        if let Err(err) = lifecycle.reset_monthly().await {
            error!(error = %err, "monthly reset failed");
        }
    }
}

fn at_time(date: chrono::NaiveDate, at: DeliveryTime) -> NaiveDateTime {
    date.and_hms_opt(u32::from(at.hour()), u32::from(at.minute()), 0)
        .expect("delivery time is validated on parse")
}

fn until_next_daily(now: DateTime<Utc>, at: DeliveryTime) -> std::time::Duration {
    let today = at_time(now.date_naive(), at);
    let next = if today > now.naive_utc() {
        today
    } else {
        today + ChronoDuration::days(1)
    };
    (next - now.naive_utc()).to_std().unwrap_or_default()
}

fn until_next_monthly(now: DateTime<Utc>, day_of_month: u32, at: DeliveryTime) -> std::time::Duration {
    // walk forward to the next matching day-of-month; config clamps the day
    // to 1..=28 so every month has it
    let mut date = now.date_naive();
    loop {
        if date.day() == day_of_month {
            let candidate = at_time(date, at);
            if candidate > now.naive_utc() {
                return (candidate - now.naive_utc()).to_std().unwrap_or_default();
            }
        }
        date = date.succ_opt().expect("date within chrono range");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use super::{until_next_daily, until_next_monthly, CounterLifecycle};
    use crate::models::order::{DeliveryTime, Order, OrderStatus};
    use crate::models::runner::Runner;
    use crate::observability::metrics::Metrics;
    use crate::store::memory::MemoryStore;
    use crate::store::{OrderUpdate, Store};

    fn time(raw: &str) -> DeliveryTime {
        raw.parse().unwrap()
    }

    async fn delivered_order(store: &MemoryStore, runner: &Runner) -> Order {
        let mut order = Order::new(3, Uuid::new_v4(), Uuid::new_v4(), None, "9999".to_string());
        order.runner = Some(runner.id);
        order.status = OrderStatus::Delivered;
        store.create_order(order.clone()).await.unwrap();
        order
    }

    #[tokio::test]
    async fn crediting_moves_all_three_counters() {
        let (store, _rx) = MemoryStore::new();
        let store = Arc::new(store);

        let mut runner = Runner::new("sena");
        runner.active_orders = 1;
        runner.completed_orders = 4;
        runner.total_completed_orders = 10;
        store.upsert_runner(runner.clone()).await.unwrap();
        let order = delivered_order(&store, &runner).await;

        let lifecycle = CounterLifecycle::new(store.clone(), Metrics::new());
        lifecycle.credit_delivery(order.id).await.unwrap();

        let updated = store.get_runner(runner.id).await.unwrap().unwrap();
        assert_eq!(updated.active_orders, 0);
        assert_eq!(updated.completed_orders, 5);
        assert_eq!(updated.total_completed_orders, 11);
    }

    #[tokio::test]
    async fn crediting_twice_applies_once() {
        let (store, _rx) = MemoryStore::new();
        let store = Arc::new(store);

        let mut runner = Runner::new("sena");
        runner.active_orders = 1;
        store.upsert_runner(runner.clone()).await.unwrap();
        let order = delivered_order(&store, &runner).await;

        let lifecycle = CounterLifecycle::new(store.clone(), Metrics::new());
        lifecycle.credit_delivery(order.id).await.unwrap();
        lifecycle.credit_delivery(order.id).await.unwrap();

        let updated = store.get_runner(runner.id).await.unwrap().unwrap();
        assert_eq!(updated.active_orders, 0);
        assert_eq!(updated.completed_orders, 1);
        assert_eq!(updated.total_completed_orders, 1);
    }

    #[tokio::test]
    async fn crediting_retries_past_interleaved_order_writes() {
        let (store, _rx) = MemoryStore::new();
        let store = Arc::new(store);

        let mut runner = Runner::new("sena");
        runner.active_orders = 1;
        store.upsert_runner(runner.clone()).await.unwrap();
        let order = delivered_order(&store, &runner).await;

        // bump the order version behind the handler's back
        store
            .update_order(order.id, None, &[OrderUpdate::SetStatus(OrderStatus::Completed)])
            .await
            .unwrap();

        let lifecycle = CounterLifecycle::new(store.clone(), Metrics::new());
        lifecycle.credit_delivery(order.id).await.unwrap();

        let updated = store.get_runner(runner.id).await.unwrap().unwrap();
        assert_eq!(updated.completed_orders, 1);
    }

    #[tokio::test]
    async fn daily_reset_zeroes_completed_and_is_idempotent() {
        let (store, _rx) = MemoryStore::new();
        let store = Arc::new(store);

        for completed in [3u32, 7] {
            let mut runner = Runner::new("runner");
            runner.completed_orders = completed;
            runner.total_completed_orders = completed + 5;
            store.upsert_runner(runner).await.unwrap();
        }

        let lifecycle = CounterLifecycle::new(store.clone(), Metrics::new());
        assert_eq!(lifecycle.reset_daily().await.unwrap(), 2);
        assert_eq!(lifecycle.reset_daily().await.unwrap(), 2);

        for runner in store.all_runners().await.unwrap() {
            assert_eq!(runner.completed_orders, 0);
            assert!(runner.total_completed_orders > 0);
        }
    }

    #[tokio::test]
    async fn monthly_reset_zeroes_totals_only() {
        let (store, _rx) = MemoryStore::new();
        let store = Arc::new(store);

        let mut runner = Runner::new("runner");
        runner.completed_orders = 2;
        runner.total_completed_orders = 40;
        store.upsert_runner(runner.clone()).await.unwrap();

        let lifecycle = CounterLifecycle::new(store.clone(), Metrics::new());
        lifecycle.reset_monthly().await.unwrap();

        let updated = store.get_runner(runner.id).await.unwrap().unwrap();
        assert_eq!(updated.total_completed_orders, 0);
        assert_eq!(updated.completed_orders, 2);
    }

    #[test]
    fn next_daily_rolls_to_tomorrow_when_time_has_passed() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();

        let later_today = until_next_daily(now, time("15:00"));
        assert_eq!(later_today.as_secs(), 3 * 3600);

        let tomorrow = until_next_daily(now, time("03:30"));
        assert_eq!(tomorrow.as_secs(), (24 - 12) * 3600 + 3 * 3600 + 30 * 60);
    }

    #[test]
    fn next_monthly_lands_on_the_configured_day() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();

        let next = until_next_monthly(now, 1, time("03:30"));
        // April 1st 03:30 is 21 days and 15.5 hours away
        assert_eq!(next.as_secs(), 21 * 24 * 3600 + 15 * 3600 + 30 * 60);
    }
}
