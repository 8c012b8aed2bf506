use async_trait::async_trait;
use tracing::{info, warn};

use crate::models::order::Order;
use crate::models::party::{Customer, Restaurant};
use crate::models::runner::Runner;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn order_created(&self, order: &Order, restaurant: &Restaurant, customer: &Customer);
    async fn runner_assigned(&self, runner: &Runner, order: &Order);
    async fn no_runner_available(&self, order: &Order);
}

// stands in for the push/SMS dispatchers; transports live outside this service
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn order_created(&self, order: &Order, restaurant: &Restaurant, customer: &Customer) {
        info!(
            order_id = %order.id,
            order_num = order.order_num,
            restaurant = %restaurant.name,
            customer = %customer.name,
            "order created; notifying customer and restaurant"
        );
    }

    async fn runner_assigned(&self, runner: &Runner, order: &Order) {
        info!(
            order_id = %order.id,
            runner_id = %runner.id,
            push = runner.fcm_token.is_some(),
            "runner assigned; notifying runner"
        );
    }

    async fn no_runner_available(&self, order: &Order) {
        warn!(
            order_id = %order.id,
            order_num = order.order_num,
            "no runner available; alerting operators"
        );
    }
}
