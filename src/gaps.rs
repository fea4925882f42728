//! Missing-day imputation per identifier.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::pipeline::PipelineError;
use crate::series::{FilledSeriesSet, GappedSeriesSet, Series, SeriesSet};

pub const MIN_SERIES: usize = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapFillPolicy {
    /// Neighbours are taken from observed days only, so every cell of a
    /// multi-day gap gets the same `(prev + next) / 2`.
    #[default]
    NearestObserved,
    /// Scan fills in place; a filled cell is the `prev` of the next gap cell.
    Cascading,
}

impl GapFillPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NearestObserved => "nearest_observed",
            Self::Cascading => "cascading",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "nearest_observed" | "nearest" => Some(Self::NearestObserved),
            "cascading" | "cascade" => Some(Self::Cascading),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GapFill {
    Filled(Vec<f64>),
    Dropped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapFillOutcome {
    pub series: FilledSeriesSet,
    pub dropped: Vec<String>,
    pub filled_cells: u64,
}

pub fn fill_series(values: &[Option<f64>], policy: GapFillPolicy) -> GapFill {
    if !values.iter().any(|value| is_present(*value)) {
        return GapFill::Dropped;
    }

    match policy {
        GapFillPolicy::NearestObserved => {
            let filled = (0..values.len())
                .map(|idx| match values[idx] {
                    Some(value) if value.is_finite() => value,
                    _ => neighbour_fill(values, idx),
                })
                .collect();
            GapFill::Filled(filled)
        }
        GapFillPolicy::Cascading => {
            let mut working = values.to_vec();
            for idx in 0..working.len() {
                if !is_present(working[idx]) {
                    working[idx] = Some(neighbour_fill(&working, idx));
                }
            }
            GapFill::Filled(working.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
        }
    }
}

pub fn fill_gaps(
    set: GappedSeriesSet,
    policy: GapFillPolicy,
) -> Result<GapFillOutcome, PipelineError> {
    let SeriesSet { days, series } = set;
    let mut kept = Vec::with_capacity(series.len());
    let mut dropped = Vec::new();
    let mut filled_cells = 0u64;

    for entry in series {
        let missing = entry.values.iter().filter(|v| !is_present(**v)).count() as u64;
        match fill_series(&entry.values, policy) {
            GapFill::Filled(values) => {
                filled_cells += missing;
                kept.push(Series {
                    identifier: entry.identifier,
                    values,
                });
            }
            GapFill::Dropped => {
                warn!(
                    component = "gaps",
                    event = "gaps.series_dropped",
                    identifier = %entry.identifier,
                    days = days.len()
                );
                dropped.push(entry.identifier);
            }
        }
    }

    if kept.len() < MIN_SERIES {
        return Err(PipelineError::InsufficientSeries {
            surviving: kept.len(),
            dropped: dropped.len(),
        });
    }

    info!(
        component = "gaps",
        event = "gaps.fill.finish",
        policy = policy.as_str(),
        kept = kept.len(),
        dropped = dropped.len(),
        filled_cells
    );

    Ok(GapFillOutcome {
        series: SeriesSet { days, series: kept },
        dropped,
        filled_cells,
    })
}

fn is_present(value: Option<f64>) -> bool {
    matches!(value, Some(v) if v.is_finite())
}

// Caller guarantees at least one present value, so one side always exists.
fn neighbour_fill(values: &[Option<f64>], idx: usize) -> f64 {
    let prev = values[..idx].iter().rev().copied().find(|v| is_present(*v)).flatten();
    let next = values[idx + 1..].iter().copied().find(|v| is_present(*v)).flatten();

    match (prev, next) {
        (Some(prev), Some(next)) => (prev + next) / 2.0,
        (Some(prev), None) => prev,
        (None, Some(next)) => next,
        (None, None) => f64::NAN,
    }
}
