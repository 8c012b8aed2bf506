use std::sync::Arc;

use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::DeliveryTime;
use crate::store::Store;

#[derive(Clone)]
pub struct ConflictChecker {
    store: Arc<dyn Store>,
    window_minutes: u16,
}

impl ConflictChecker {
    pub fn new(store: Arc<dyn Store>, window_minutes: u16) -> Self {
        Self {
            store,
            window_minutes,
        }
    }

    // a runner conflicts when any of its undelivered orders lands within the
    // window of the candidate time; open orders without a delivery time never
    // conflict
    pub async fn has_conflict(
        &self,
        runner: Uuid,
        candidate: DeliveryTime,
    ) -> Result<bool, AppError> {
        let open = self.store.open_orders_for_runner(runner).await?;

        Ok(open.iter().any(|order| {
            order
                .delivery_time
                .is_some_and(|committed| committed.gap_minutes(candidate) < self.window_minutes)
        }))
    }
}
