//! Row validation and daily averaging into a dense identifier × day matrix.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::columns::ResolvedColumns;
use crate::pipeline::PipelineError;
use crate::record::{RawRecord, RawValue};
use crate::series::{day_key, GappedSeriesSet, Series, SeriesSet};

pub const MIN_IDENTIFIERS: usize = 2;

const NAIVE_DATETIME_FORMATS: [&str; 8] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationConfig {
    /// Zone whose midnight separates calendar days.
    pub day_boundary_tz: Tz,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            day_boundary_tz: chrono_tz::UTC,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowRejection {
    UnparseableTimestamp,
    EmptyIdentifier,
    InvalidMetric,
}

impl RowRejection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnparseableTimestamp => "unparseable_timestamp",
            Self::EmptyIdentifier => "empty_identifier",
            Self::InvalidMetric => "invalid_metric",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationReport {
    pub valid_rows: u64,
    pub invalid_rows: u64,
    pub unparseable_timestamps: u64,
    pub empty_identifiers: u64,
    pub invalid_metrics: u64,
}

impl AggregationReport {
    fn record_rejection(&mut self, reason: RowRejection) {
        self.invalid_rows += 1;
        match reason {
            RowRejection::UnparseableTimestamp => self.unparseable_timestamps += 1,
            RowRejection::EmptyIdentifier => self.empty_identifiers += 1,
            RowRejection::InvalidMetric => self.invalid_metrics += 1,
        }
    }
}

/// Metric observations keyed by (day, identifier).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyBuckets {
    identifiers: Vec<String>,
    identifier_index: HashMap<String, usize>,
    buckets: BTreeMap<NaiveDate, HashMap<usize, Vec<f64>>>,
    report: AggregationReport,
}

impl DailyBuckets {
    /// Identifiers in order of first appearance among valid rows.
    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    /// Distinct days, ascending.
    pub fn days(&self) -> Vec<NaiveDate> {
        self.buckets.keys().copied().collect()
    }

    pub fn bucket(&self, day: NaiveDate, identifier: &str) -> Option<&[f64]> {
        let idx = self.identifier_index.get(identifier)?;
        self.buckets.get(&day)?.get(idx).map(Vec::as_slice)
    }

    pub fn report(&self) -> &AggregationReport {
        &self.report
    }

    fn push(&mut self, day: NaiveDate, identifier: String, metric: f64) {
        let idx = match self.identifier_index.get(&identifier) {
            Some(idx) => *idx,
            None => {
                let idx = self.identifiers.len();
                self.identifier_index.insert(identifier.clone(), idx);
                self.identifiers.push(identifier);
                idx
            }
        };
        self.buckets
            .entry(day)
            .or_default()
            .entry(idx)
            .or_default()
            .push(metric);
        self.report.valid_rows += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub series: GappedSeriesSet,
    pub report: AggregationReport,
}

/// Single pass over `records`; invalid rows are counted and skipped.
pub fn bucket_records(
    records: &[RawRecord],
    columns: &ResolvedColumns,
    cfg: &AggregationConfig,
) -> DailyBuckets {
    let mut buckets = DailyBuckets::default();

    for (row_idx, record) in records.iter().enumerate() {
        match validate_row(record, columns, cfg) {
            Ok((day, identifier, metric)) => buckets.push(day, identifier, metric),
            Err(reason) => {
                debug!(
                    component = "aggregate",
                    event = "aggregate.row.rejected",
                    row = row_idx,
                    reason = reason.as_str()
                );
                buckets.report.record_rejection(reason);
            }
        }
    }

    buckets
}

pub fn aggregate(
    records: &[RawRecord],
    columns: &ResolvedColumns,
    cfg: &AggregationConfig,
) -> Result<Aggregation, PipelineError> {
    let buckets = bucket_records(records, columns, cfg);
    let report = buckets.report.clone();

    if report.valid_rows == 0 {
        return Err(PipelineError::NoValidRows {
            invalid_rows: report.invalid_rows,
        });
    }

    let days = buckets.days();
    if days.is_empty() || buckets.identifiers.len() < MIN_IDENTIFIERS {
        return Err(PipelineError::InsufficientDimensions {
            identifiers: buckets.identifiers.len(),
            days: days.len(),
        });
    }

    let mut series: Vec<Series<Option<f64>>> = buckets
        .identifiers
        .iter()
        .map(|identifier| Series {
            identifier: identifier.clone(),
            values: vec![None; days.len()],
        })
        .collect();

    for (day_idx, day_buckets) in buckets.buckets.values().enumerate() {
        for (identifier_idx, observations) in day_buckets {
            if observations.is_empty() {
                continue;
            }
            let mean = observations.iter().sum::<f64>() / observations.len() as f64;
            series[*identifier_idx].values[day_idx] = Some(mean);
        }
    }

    info!(
        component = "aggregate",
        event = "aggregate.finish",
        valid_rows = report.valid_rows,
        invalid_rows = report.invalid_rows,
        identifiers = series.len(),
        days = days.len(),
        first_day = %day_key(days[0]),
        last_day = %day_key(days[days.len() - 1])
    );

    Ok(Aggregation {
        series: SeriesSet { days, series },
        report,
    })
}

/// Calendar day of a timestamp cell in `tz`.
pub fn parse_day(value: &RawValue, tz: Tz) -> Option<NaiveDate> {
    match value {
        RawValue::Number(epoch_ms) if epoch_ms.is_finite() => Utc
            .timestamp_millis_opt(*epoch_ms as i64)
            .single()
            .map(|dt| dt.with_timezone(&tz).date_naive()),
        RawValue::Text(text) => parse_day_text(text.trim(), tz),
        RawValue::Number(_) | RawValue::Empty => None,
    }
}

fn parse_day_text(text: &str, tz: Tz) -> Option<NaiveDate> {
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&tz).date_naive());
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.date());
        }
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
}

fn validate_row(
    record: &RawRecord,
    columns: &ResolvedColumns,
    cfg: &AggregationConfig,
) -> Result<(NaiveDate, String, f64), RowRejection> {
    let day = record
        .get(&columns.timestamp)
        .and_then(|value| parse_day(value, cfg.day_boundary_tz))
        .ok_or(RowRejection::UnparseableTimestamp)?;

    let identifier = record
        .get(&columns.identifier)
        .and_then(RawValue::as_text)
        .filter(|identifier| !identifier.is_empty())
        .ok_or(RowRejection::EmptyIdentifier)?;

    let metric = record
        .get(&columns.metric)
        .and_then(RawValue::as_number)
        .filter(|metric| metric.is_finite() && *metric > 0.0)
        .ok_or(RowRejection::InvalidMetric)?;

    Ok((day, identifier, metric))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> ResolvedColumns {
        ResolvedColumns {
            timestamp: "datetime".to_string(),
            identifier: "asin".to_string(),
            metric: "rank".to_string(),
        }
    }

    fn row(ts: &str, asin: &str, rank: f64) -> RawRecord {
        RawRecord::new()
            .with("datetime", ts)
            .with("asin", asin)
            .with("rank", rank)
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn averages_observations_per_day_and_identifier() {
        let records = vec![
            row("2024-03-01 08:00:00", "A", 100.0),
            row("2024-03-01 20:00:00", "A", 200.0),
            row("2024-03-01 09:00:00", "B", 50.0),
            row("2024-03-02 09:00:00", "B", 70.0),
        ];

        let out = aggregate(&records, &columns(), &AggregationConfig::default())
            .expect("aggregation succeeds");

        assert_eq!(out.series.days, vec![day(2024, 3, 1), day(2024, 3, 2)]);
        assert_eq!(out.series.identifiers(), vec!["A", "B"]);
        assert_eq!(out.series.series[0].values, vec![Some(150.0), None]);
        assert_eq!(out.series.series[1].values, vec![Some(50.0), Some(70.0)]);
        assert_eq!(out.report.valid_rows, 4);
        assert_eq!(out.report.invalid_rows, 0);
    }

    #[test]
    fn invalid_rows_are_counted_by_reason_and_skipped() {
        let records = vec![
            row("not a date", "A", 10.0),
            row("2024-03-01", "   ", 10.0),
            row("2024-03-01", "A", 0.0),
            row("2024-03-01", "A", -3.0),
            RawRecord::new()
                .with("datetime", "2024-03-01")
                .with("asin", "B")
                .with("rank", "n/a"),
            row("2024-03-01", "A", 10.0),
            row("2024-03-01", "B", 20.0),
        ];

        let out = aggregate(&records, &columns(), &AggregationConfig::default())
            .expect("two valid identifiers remain");

        assert_eq!(out.report.valid_rows, 2);
        assert_eq!(out.report.invalid_rows, 5);
        assert_eq!(out.report.unparseable_timestamps, 1);
        assert_eq!(out.report.empty_identifiers, 1);
        assert_eq!(out.report.invalid_metrics, 3);
    }

    #[test]
    fn all_non_positive_metrics_fail_with_no_valid_rows() {
        let records = vec![
            row("2024-03-01", "A", 0.0),
            row("2024-03-01", "B", -1.0),
        ];

        let err = aggregate(&records, &columns(), &AggregationConfig::default())
            .expect_err("no valid rows");
        assert!(matches!(err, PipelineError::NoValidRows { invalid_rows: 2 }));
    }

    #[test]
    fn single_identifier_fails_with_insufficient_dimensions() {
        let records = vec![
            row("2024-03-01", "A", 1.0),
            row("2024-03-02", "A", 2.0),
        ];

        let err = aggregate(&records, &columns(), &AggregationConfig::default())
            .expect_err("one identifier is not enough");
        assert!(matches!(
            err,
            PipelineError::InsufficientDimensions {
                identifiers: 1,
                days: 2
            }
        ));
    }

    #[test]
    fn days_are_sorted_regardless_of_row_order() {
        let records = vec![
            row("2024-03-05", "A", 1.0),
            row("2024-03-01", "B", 2.0),
            row("2024-03-03", "A", 3.0),
        ];

        let buckets = bucket_records(&records, &columns(), &AggregationConfig::default());
        assert_eq!(
            buckets.days(),
            vec![day(2024, 3, 1), day(2024, 3, 3), day(2024, 3, 5)]
        );
        assert_eq!(buckets.identifiers(), &["A".to_string(), "B".to_string()]);
        assert_eq!(buckets.bucket(day(2024, 3, 3), "A"), Some(&[3.0][..]));
        assert_eq!(buckets.bucket(day(2024, 3, 3), "B"), None);
    }

    #[test]
    fn numeric_identifiers_and_text_metrics_are_accepted() {
        let records = vec![
            RawRecord::new()
                .with("datetime", "2024-03-01")
                .with("asin", 12345.0)
                .with("rank", " 17 "),
            row("2024-03-01", "B", 3.0),
        ];

        let out = aggregate(&records, &columns(), &AggregationConfig::default())
            .expect("aggregation succeeds");
        assert_eq!(out.series.identifiers(), vec!["12345", "B"]);
        assert_eq!(out.series.series[0].values, vec![Some(17.0)]);
    }

    #[test]
    fn parse_day_accepts_common_layouts() {
        let utc = chrono_tz::UTC;
        let expected = Some(day(2024, 3, 1));

        assert_eq!(parse_day(&"2024-03-01 23:59:59".into(), utc), expected);
        assert_eq!(parse_day(&"2024-03-01T10:15".into(), utc), expected);
        assert_eq!(parse_day(&"2024/03/01 10:15:00".into(), utc), expected);
        assert_eq!(parse_day(&"2024-03-01".into(), utc), expected);
        assert_eq!(parse_day(&"03/01/2024".into(), utc), expected);
        assert_eq!(parse_day(&"2024-03-01T10:00:00Z".into(), utc), expected);
        assert_eq!(parse_day(&RawValue::Number(1_709_251_200_000.0), utc), expected);
        assert_eq!(parse_day(&"".into(), utc), None);
        assert_eq!(parse_day(&RawValue::Empty, utc), None);
    }

    #[test]
    fn offset_timestamps_use_the_configured_day_boundary() {
        let shanghai: Tz = "Asia/Shanghai".parse().expect("known zone");
        let value: RawValue = "2024-03-01T18:30:00Z".into();

        assert_eq!(parse_day(&value, chrono_tz::UTC), Some(day(2024, 3, 1)));
        assert_eq!(parse_day(&value, shanghai), Some(day(2024, 3, 2)));
    }
}
