use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderStatus {
    Received,
    Ready,
    Picked,
    Delivered,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            OrderStatus::Received | OrderStatus::Ready | OrderStatus::Picked
        )
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }
}

// Minutes since midnight. Same-day arithmetic only; a 23:30 commitment and a
// 00:15 candidate are 1395 minutes apart, not 45.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeliveryTime {
    minutes: u16,
}

impl DeliveryTime {
    pub fn from_hm(hour: u16, minute: u16) -> Result<Self, AppError> {
        if hour > 23 || minute > 59 {
            return Err(AppError::MalformedTime(format!("{hour:02}:{minute:02}")));
        }
        Ok(Self {
            minutes: hour * 60 + minute,
        })
    }

    pub fn minutes_since_midnight(&self) -> u16 {
        self.minutes
    }

    pub fn gap_minutes(&self, other: DeliveryTime) -> u16 {
        self.minutes.abs_diff(other.minutes)
    }

    pub fn hour(&self) -> u16 {
        self.minutes / 60
    }

    pub fn minute(&self) -> u16 {
        self.minutes % 60
    }
}

impl FromStr for DeliveryTime {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let malformed = || AppError::MalformedTime(raw.to_string());

        let (hh, mm) = raw.split_once(':').ok_or_else(malformed)?;
        if hh.len() != 2 || mm.len() != 2 {
            return Err(malformed());
        }
        if !hh.bytes().all(|b| b.is_ascii_digit()) || !mm.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }

        let hour: u16 = hh.parse().map_err(|_| malformed())?;
        let minute: u16 = mm.parse().map_err(|_| malformed())?;
        Self::from_hm(hour, minute).map_err(|_| malformed())
    }
}

impl fmt::Display for DeliveryTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl TryFrom<String> for DeliveryTime {
    type Error = AppError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<DeliveryTime> for String {
    fn from(time: DeliveryTime) -> Self {
        time.to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_num: u64,
    pub status: OrderStatus,
    pub delivery_time: Option<DeliveryTime>,
    pub restaurant: Uuid,
    pub customer: Uuid,
    pub runner: Option<Uuid>,
    pub waiting_for_runner: bool,
    pub runner_credited: bool,
    pub pickup_code: String,
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        order_num: u64,
        restaurant: Uuid,
        customer: Uuid,
        delivery_time: Option<DeliveryTime>,
        pickup_code: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_num,
            status: OrderStatus::Received,
            delivery_time,
            restaurant,
            customer,
            runner: None,
            waiting_for_runner: false,
            runner_credited: false,
            pickup_code,
            version: 0,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DeliveryTime;
    use crate::error::AppError;

    #[test]
    fn parses_valid_times() {
        let t: DeliveryTime = "18:00".parse().unwrap();
        assert_eq!(t.minutes_since_midnight(), 1080);

        let t: DeliveryTime = "00:00".parse().unwrap();
        assert_eq!(t.minutes_since_midnight(), 0);

        let t: DeliveryTime = "23:59".parse().unwrap();
        assert_eq!(t.minutes_since_midnight(), 1439);
    }

    #[test]
    fn rejects_malformed_times() {
        let samples = [
            "", "1800", "24:00", "12:60", "7:30", "12:3", "ab:cd", "12:30:00", "-1:30",
        ];
        for raw in samples {
            let parsed = raw.parse::<DeliveryTime>();
            assert!(
                matches!(parsed, Err(AppError::MalformedTime(_))),
                "expected {raw:?} to be rejected"
            );
        }
    }

    #[test]
    fn gap_is_absolute_same_day_difference() {
        let noon: DeliveryTime = "12:00".parse().unwrap();
        let half_past: DeliveryTime = "12:30".parse().unwrap();

        assert_eq!(noon.gap_minutes(half_past), 30);
        assert_eq!(half_past.gap_minutes(noon), 30);
    }

    #[test]
    fn round_trips_through_display() {
        let t: DeliveryTime = "09:05".parse().unwrap();
        assert_eq!(t.to_string(), "09:05");
    }
}
