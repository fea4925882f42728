//! Day-aligned per-identifier series.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series<T> {
    pub identifier: String,
    pub values: Vec<T>,
}

/// Series sharing one ascending day axis. Every `values` has `days.len()`
/// entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSet<T> {
    pub days: Vec<NaiveDate>,
    pub series: Vec<Series<T>>,
}

/// Before gap filling; `None` marks a day without observations.
pub type GappedSeriesSet = SeriesSet<Option<f64>>;
pub type FilledSeriesSet = SeriesSet<f64>;

impl<T> SeriesSet<T> {
    pub fn identifiers(&self) -> Vec<&str> {
        self.series
            .iter()
            .map(|series| series.identifier.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn day_count(&self) -> usize {
        self.days.len()
    }

    pub fn get(&self, identifier: &str) -> Option<&Series<T>> {
        self.series
            .iter()
            .find(|series| series.identifier == identifier)
    }

    pub fn day_keys(&self) -> Vec<String> {
        self.days.iter().map(|day| day_key(*day)).collect()
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        self.days.first().copied()
    }

    pub fn last_day(&self) -> Option<NaiveDate> {
        self.days.last().copied()
    }
}

pub fn day_key(day: NaiveDate) -> String {
    day.format(DAY_KEY_FORMAT).to_string()
}
