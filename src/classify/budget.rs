// src/classify/budget.rs
//! Daily oracle call budget. Counts real oracle calls only; cache hits are free.
//! The count resets when the UTC day changes.

use std::sync::Mutex;

use chrono::{NaiveDate, Utc};

#[derive(Debug)]
struct DailyCounter {
    date: NaiveDate,
    count: u32,
}

impl DailyCounter {
    fn today() -> Self {
        Self {
            date: Utc::now().date_naive(),
            count: 0,
        }
    }

    fn roll(&mut self, today: NaiveDate) {
        if self.date != today {
            self.date = today;
            self.count = 0;
        }
    }
}

#[derive(Debug)]
pub struct DailyBudget {
    limit: u32,
    counter: Mutex<DailyCounter>,
}

impl DailyBudget {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            counter: Mutex::new(DailyCounter::today()),
        }
    }

    /// Reserve one call for today. `false` when the budget is spent.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_on(Utc::now().date_naive())
    }

    fn try_acquire_on(&self, today: NaiveDate) -> bool {
        let mut g = self.counter.lock().unwrap_or_else(|p| p.into_inner());
        g.roll(today);
        if g.count >= self.limit {
            return false;
        }
        g.count += 1;
        true
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}
