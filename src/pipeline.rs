//! End-to-end run: resolve columns, aggregate, fill gaps, correlate.

use std::env;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::aggregate::{aggregate, AggregationConfig, AggregationReport};
use crate::columns::{resolve_columns, ColumnResolution};
use crate::correlation::{
    classify, correlate, heatmap, summarize, ClassifiedPairs, CorrelationMatrix,
    CorrelationSummary, HeatmapCell, Threshold,
};
use crate::gaps::{fill_gaps, GapFillPolicy};
use crate::record::RawDataset;
use crate::series::{day_key, FilledSeriesSet};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    #[error("dataset has {found} columns, at least {required} are required (timestamp, identifier, metric)")]
    InsufficientColumns { found: usize, required: usize },
    #[error("no valid rows found ({invalid_rows} rows rejected)")]
    NoValidRows { invalid_rows: u64 },
    #[error(
        "found {identifiers} identifiers and {days} days; at least 2 identifiers and 1 day are required"
    )]
    InsufficientDimensions { identifiers: usize, days: usize },
    #[error("only {surviving} identifiers have data after gap filling ({dropped} dropped); at least 2 are required")]
    InsufficientSeries { surviving: usize, dropped: usize },
    #[error("threshold must be in (0, 1], got {0}")]
    InvalidThreshold(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PipelineConfig {
    pub aggregation: AggregationConfig,
    pub gap_fill_policy: GapFillPolicy,
    pub threshold: Threshold,
}

pub fn pipeline_config_from_env() -> PipelineConfig {
    let mut config = PipelineConfig::default();

    if let Ok(raw) = env::var("RANKCORR_TIMEZONE") {
        match raw.trim().parse::<Tz>() {
            Ok(tz) => config.aggregation.day_boundary_tz = tz,
            Err(_) => warn!(
                component = "pipeline",
                event = "config.invalid",
                key = "RANKCORR_TIMEZONE",
                value = %raw
            ),
        }
    }

    if let Ok(raw) = env::var("RANKCORR_GAP_FILL") {
        if let Some(policy) = GapFillPolicy::parse(&raw) {
            config.gap_fill_policy = policy;
        }
    }

    if let Ok(raw) = env::var("RANKCORR_THRESHOLD") {
        if let Some(threshold) = raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(|value| Threshold::new(value).ok())
        {
            config.threshold = threshold;
        }
    }

    config
}

/// Threshold-independent result of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub columns: ColumnResolution,
    pub report: AggregationReport,
    pub series: FilledSeriesSet,
    pub dropped: Vec<String>,
    pub filled_cells: u64,
    pub matrix: CorrelationMatrix,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisView {
    pub threshold: Threshold,
    pub identifiers: Vec<String>,
    pub pairs: ClassifiedPairs,
    pub summary: Option<CorrelationSummary>,
    pub heatmap: Vec<Vec<HeatmapCell>>,
}

impl Analysis {
    pub fn view(&self, threshold: Threshold) -> AnalysisView {
        AnalysisView {
            threshold,
            identifiers: self.matrix.identifiers().to_vec(),
            pairs: classify(&self.matrix, threshold),
            summary: summarize(&self.matrix, threshold),
            heatmap: heatmap(&self.matrix, threshold),
        }
    }
}

pub fn run_pipeline(
    dataset: &RawDataset,
    config: &PipelineConfig,
) -> Result<Analysis, PipelineError> {
    info!(
        component = "pipeline",
        event = "pipeline.run.start",
        rows = dataset.records.len(),
        columns = dataset.columns.len(),
        day_boundary_tz = %config.aggregation.day_boundary_tz,
        gap_fill_policy = config.gap_fill_policy.as_str()
    );

    let result = run_stages(dataset, config);
    match &result {
        Ok(analysis) => info!(
            component = "pipeline",
            event = "pipeline.run.finish",
            identifiers = analysis.series.len(),
            days = analysis.series.day_count(),
            first_day = %analysis.series.first_day().map(day_key).unwrap_or_default(),
            last_day = %analysis.series.last_day().map(day_key).unwrap_or_default(),
            dropped = analysis.dropped.len()
        ),
        Err(err) => warn!(
            component = "pipeline",
            event = "pipeline.run.failed",
            error = %err
        ),
    }
    result
}

fn run_stages(dataset: &RawDataset, config: &PipelineConfig) -> Result<Analysis, PipelineError> {
    let columns = resolve_columns(&dataset.columns)?;
    let aggregation = aggregate(&dataset.records, &columns.columns, &config.aggregation)?;
    let filled = fill_gaps(aggregation.series, config.gap_fill_policy)?;
    let matrix = correlate(&filled.series);

    Ok(Analysis {
        columns,
        report: aggregation.report,
        series: filled.series,
        dropped: filled.dropped,
        filled_cells: filled.filled_cells,
        matrix,
    })
}

/// Current analysis plus the caller-controlled threshold.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    config: PipelineConfig,
    analysis: Option<Analysis>,
}

impl PipelineState {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            analysis: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn threshold(&self) -> Threshold {
        self.config.threshold
    }

    pub fn analysis(&self) -> Option<&Analysis> {
        self.analysis.as_ref()
    }

    /// Runs the pipeline. On failure the previous analysis is kept.
    pub fn ingest(&mut self, dataset: &RawDataset) -> Result<&Analysis, PipelineError> {
        let analysis = run_pipeline(dataset, &self.config)?;
        Ok(self.analysis.insert(analysis))
    }

    pub fn replace_analysis(&mut self, analysis: Analysis) {
        self.analysis = Some(analysis);
    }

    pub fn set_threshold(&mut self, threshold: Threshold) {
        info!(
            component = "pipeline",
            event = "pipeline.threshold.changed",
            from = self.config.threshold.value(),
            to = threshold.value()
        );
        self.config.threshold = threshold;
    }

    pub fn view(&self) -> Option<AnalysisView> {
        self.analysis
            .as_ref()
            .map(|analysis| analysis.view(self.config.threshold))
    }
}
