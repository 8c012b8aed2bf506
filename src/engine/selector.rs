use std::sync::Arc;

use futures::future::join_all;
use rand::Rng;
use tracing::warn;

use crate::engine::conflict::ConflictChecker;
use crate::error::AppError;
use crate::models::order::DeliveryTime;
use crate::models::runner::Runner;
use crate::store::Store;

pub struct RunnerSelector {
    store: Arc<dyn Store>,
    checker: ConflictChecker,
}

impl RunnerSelector {
    pub fn new(store: Arc<dyn Store>, conflict_window_minutes: u16) -> Self {
        Self {
            checker: ConflictChecker::new(store.clone(), conflict_window_minutes),
            store,
        }
    }

    pub async fn select(
        &self,
        candidate_time: Option<DeliveryTime>,
    ) -> Result<Option<Runner>, AppError> {
        let candidates = self.store.active_runners().await?;
        if candidates.is_empty() {
            return Ok(None);
        }

        let Some(time) = candidate_time else {
            // no time to check conflicts against; degrade to least-busy
            return Ok(least_busy(candidates));
        };

        let checks = candidates
            .iter()
            .map(|runner| self.checker.has_conflict(runner.id, time));
        let results = join_all(checks).await;

        let eligible: Vec<Runner> = candidates
            .into_iter()
            .zip(results)
            .filter_map(|(runner, check)| match check {
                Ok(false) => Some(runner),
                Ok(true) => None,
                Err(err) => {
                    warn!(runner_id = %runner.id, error = %err, "conflict check failed; skipping runner");
                    None
                }
            })
            .collect();

        Ok(pick_fairest(eligible))
    }
}

// ascending (active, completed); ties are broken uniformly at random so equal
// runners share the load over time
fn pick_fairest(eligible: Vec<Runner>) -> Option<Runner> {
    let best = eligible
        .iter()
        .map(|runner| (runner.active_orders, runner.completed_orders))
        .min()?;

    let mut tied: Vec<Runner> = eligible
        .into_iter()
        .filter(|runner| (runner.active_orders, runner.completed_orders) == best)
        .collect();

    if tied.len() == 1 {
        return tied.pop();
    }
    let winner = rand::rng().random_range(0..tied.len());
    Some(tied.swap_remove(winner))
}

fn least_busy(mut candidates: Vec<Runner>) -> Option<Runner> {
    candidates.sort_by_key(|runner| (runner.completed_orders, runner.active_orders));
    candidates.into_iter().next()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::RunnerSelector;
    use crate::models::order::{DeliveryTime, Order};
    use crate::models::runner::Runner;
    use crate::store::memory::MemoryStore;
    use crate::store::Store;

    fn runner(name: &str, active: u32, completed: u32) -> Runner {
        let mut runner = Runner::new(name);
        runner.active_orders = active;
        runner.completed_orders = completed;
        runner
    }

    fn time(raw: &str) -> DeliveryTime {
        raw.parse().unwrap()
    }

    async fn selector_with(runners: &[Runner]) -> (RunnerSelector, Arc<MemoryStore>) {
        let (store, _rx) = MemoryStore::new();
        let store = Arc::new(store);
        for runner in runners {
            store.upsert_runner(runner.clone()).await.unwrap();
        }
        (RunnerSelector::new(store.clone(), 60), store)
    }

    #[tokio::test]
    async fn empty_pool_selects_nobody() {
        let (selector, _store) = selector_with(&[]).await;
        let picked = selector.select(Some(time("18:00"))).await.unwrap();
        assert!(picked.is_none());
    }

    #[tokio::test]
    async fn inactive_runners_are_not_candidates() {
        let mut idle = runner("idle", 0, 0);
        idle.is_active = false;
        let (selector, _store) = selector_with(&[idle]).await;

        let picked = selector.select(Some(time("18:00"))).await.unwrap();
        assert!(picked.is_none());
    }

    #[tokio::test]
    async fn lowest_active_then_lowest_completed_wins() {
        let r1 = runner("r1", 2, 5);
        let r2 = runner("r2", 1, 9);
        let r3 = runner("r3", 1, 3);
        let (selector, _store) = selector_with(&[r1, r2, r3.clone()]).await;

        let picked = selector.select(Some(time("18:00"))).await.unwrap().unwrap();
        assert_eq!(picked.id, r3.id);
    }

    #[tokio::test]
    async fn conflicted_runner_is_excluded() {
        let busy = runner("busy", 0, 0);
        let free = runner("free", 5, 5);
        let (selector, store) = selector_with(&[busy.clone(), free.clone()]).await;

        // busy would win on load, but has a commitment 30 minutes away
        let mut order = Order::new(
            1,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Some(time("12:00")),
            "1111".to_string(),
        );
        order.runner = Some(busy.id);
        store.create_order(order).await.unwrap();

        let picked = selector.select(Some(time("12:30"))).await.unwrap().unwrap();
        assert_eq!(picked.id, free.id);
    }

    #[tokio::test]
    async fn all_runners_conflicted_selects_nobody() {
        let only = runner("only", 0, 0);
        let (selector, store) = selector_with(&[only.clone()]).await;

        let mut order = Order::new(
            1,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Some(time("12:00")),
            "1111".to_string(),
        );
        order.runner = Some(only.id);
        store.create_order(order).await.unwrap();

        let picked = selector.select(Some(time("12:30"))).await.unwrap();
        assert!(picked.is_none());
    }

    #[tokio::test]
    async fn tie_break_picks_one_of_the_tied_runners() {
        let a = runner("a", 1, 4);
        let b = runner("b", 1, 4);
        let worse = runner("worse", 2, 0);
        let (selector, _store) = selector_with(&[a.clone(), b.clone(), worse]).await;

        for _ in 0..10 {
            let picked = selector.select(Some(time("18:00"))).await.unwrap().unwrap();
            assert!(picked.id == a.id || picked.id == b.id);
        }
    }

    #[tokio::test]
    async fn without_a_delivery_time_least_busy_by_completed_wins() {
        let fresh = runner("fresh", 3, 1);
        let veteran = runner("veteran", 0, 8);
        let (selector, _store) = selector_with(&[fresh.clone(), veteran]).await;

        let picked = selector.select(None).await.unwrap().unwrap();
        assert_eq!(picked.id, fresh.id);
    }
}
