//! Sales-rank co-movement analysis.
//!
//! Pipeline stages:
//! - column role inference from headers
//! - daily per-identifier averaging onto a shared day axis
//! - gap filling, dropping identifiers without observations
//! - Pearson correlation matrix with threshold-based views

mod aggregate;
mod columns;
mod correlation;
mod dashboard;
mod gaps;
mod ingest;
mod observability;
mod pipeline;
mod record;
mod series;

pub use aggregate::{
    aggregate, bucket_records, parse_day, Aggregation, AggregationConfig, AggregationReport,
    DailyBuckets, RowRejection, MIN_IDENTIFIERS,
};
pub use columns::{
    resolve_columns, resolve_columns_with_rules, ColumnNotice, ColumnResolution, ColumnRole,
    ColumnRule, ResolvedColumns, DEFAULT_COLUMN_RULES, MIN_COLUMNS,
};
pub use correlation::{
    classify, correlate, heatmap, pearson, summarize, ClassifiedPairs, CorrelationMatrix,
    CorrelationPair, CorrelationSummary, HeatmapCell, Strength, Threshold, DEFAULT_THRESHOLD,
};
pub use dashboard::{
    analysis_router, render_dashboard_html, AnalysisError, AnalysisStore, IngestSummary,
};
pub use gaps::{fill_gaps, fill_series, GapFill, GapFillOutcome, GapFillPolicy, MIN_SERIES};
pub use ingest::{load_csv_dataset, read_csv_dataset, type_cell, IngestError};
pub use observability::{
    init_logging, log_app_bind, log_app_start, log_dataset_preload, logging_config_from_env,
    LogFormat, LoggingConfig, LoggingInitError,
};
pub use pipeline::{
    pipeline_config_from_env, run_pipeline, Analysis, AnalysisView, PipelineConfig,
    PipelineError, PipelineState,
};
pub use record::{RawDataset, RawRecord, RawValue};
pub use series::{day_key, FilledSeriesSet, GappedSeriesSet, Series, SeriesSet, DAY_KEY_FORMAT};
