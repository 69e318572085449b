use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use chrono::{Duration, NaiveDate};

/// One daily observation for a pool. `(pool_id, date)` is unique in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct MetricPoint {
    pub pool_id: String,
    pub date: NaiveDate,
    pub apy: f64,
    pub tvl: f64,
    pub apy_base: Option<f64>,
    pub apy_reward: Option<f64>,
    pub il_7d: Option<f64>,
}

/// Inclusive range of calendar dates `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl HistoryWindow {
    /// `[as_of - window_days, as_of]`
    pub fn trailing(as_of: NaiveDate, window_days: u32) -> Self {
        Self {
            start: as_of - Duration::days(window_days as i64),
            end: as_of,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |date| *date <= end)
    }
}
