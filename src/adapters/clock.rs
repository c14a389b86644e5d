use crate::ports::clock::Clock;
use chrono::{NaiveDate, Utc};
use std::sync::Mutex;

/// システム時計（UTCの日付）
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// 固定日付の時計
///
/// テストで日付を進めて延滞を再現するために使う。
#[derive(Debug)]
pub struct FixedClock {
    today: Mutex<NaiveDate>,
}

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: Mutex::new(today),
        }
    }

    pub fn advance_days(&self, days: u64) {
        let mut today = self.today.lock().unwrap();
        *today = *today + chrono::Days::new(days);
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *self.today.lock().unwrap()
    }
}
