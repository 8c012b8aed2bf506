use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Runner {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub active_orders: u32,
    pub completed_orders: u32,
    pub total_completed_orders: u32,
    pub fcm_token: Option<String>,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl Runner {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            is_active: true,
            active_orders: 0,
            completed_orders: 0,
            total_completed_orders: 0,
            fcm_token: None,
            version: 0,
            updated_at: Utc::now(),
        }
    }
}
