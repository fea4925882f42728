//! HTTP surface over a shared [`PipelineState`]: CSV upload, threshold
//! control, JSON views and a plain HTML dashboard.

use std::sync::{Arc, RwLock};

use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::aggregate::AggregationReport;
use crate::columns::{ColumnNotice, ResolvedColumns};
use crate::correlation::{CorrelationPair, Threshold};
use crate::ingest::{read_csv_dataset, IngestError};
use crate::pipeline::{
    run_pipeline, Analysis, AnalysisView, PipelineConfig, PipelineError, PipelineState,
};
use crate::record::RawDataset;
use crate::series::{day_key, FilledSeriesSet};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub columns: ResolvedColumns,
    pub notices: Vec<ColumnNotice>,
    pub report: AggregationReport,
    pub first_day: Option<String>,
    pub last_day: Option<String>,
    pub day_count: usize,
    pub identifiers: Vec<String>,
    pub dropped: Vec<String>,
}

impl IngestSummary {
    pub fn from_analysis(analysis: &Analysis) -> Self {
        Self {
            columns: analysis.columns.columns.clone(),
            notices: analysis.columns.notices.clone(),
            report: analysis.report.clone(),
            first_day: analysis.series.first_day().map(day_key),
            last_day: analysis.series.last_day().map(day_key),
            day_count: analysis.series.day_count(),
            identifiers: analysis.matrix.identifiers().to_vec(),
            dropped: analysis.dropped.clone(),
        }
    }
}

/// Cloneable handle to the state shared by all routes.
#[derive(Clone, Default)]
pub struct AnalysisStore {
    inner: Arc<RwLock<PipelineState>>,
}

impl AnalysisStore {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(PipelineState::new(config))),
        }
    }

    pub fn ingest_csv(&self, body: &[u8]) -> Result<IngestSummary, AnalysisError> {
        let dataset = read_csv_dataset(body)?;
        self.ingest_dataset(&dataset)
    }

    /// Runs outside the lock; the finished analysis replaces the old one.
    pub fn ingest_dataset(&self, dataset: &RawDataset) -> Result<IngestSummary, AnalysisError> {
        let config = *self.read().config();
        let analysis = run_pipeline(dataset, &config)?;
        let summary = IngestSummary::from_analysis(&analysis);
        self.write().replace_analysis(analysis);
        Ok(summary)
    }

    pub fn threshold(&self) -> Threshold {
        self.read().threshold()
    }

    pub fn set_threshold(&self, threshold: Threshold) {
        self.write().set_threshold(threshold);
    }

    pub fn view(&self, threshold: Option<Threshold>) -> Option<AnalysisView> {
        let state = self.read();
        let threshold = threshold.unwrap_or_else(|| state.threshold());
        state.analysis().map(|analysis| analysis.view(threshold))
    }

    pub fn series(&self) -> Option<FilledSeriesSet> {
        self.read()
            .analysis()
            .map(|analysis| analysis.series.clone())
    }

    pub fn render_html(&self) -> String {
        let state = self.read();
        render_dashboard_html(state.analysis(), state.threshold())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, PipelineState> {
        self.inner
            .read()
            .expect("pipeline state lock should not be poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, PipelineState> {
        self.inner
            .write()
            .expect("pipeline state lock should not be poisoned")
    }
}

pub fn analysis_router(store: AnalysisStore) -> Router {
    Router::new()
        .route("/analysis", post(post_analysis))
        .route("/analysis/view", get(get_analysis_view))
        .route("/analysis/threshold", put(put_threshold))
        .route("/analysis/series", get(get_series))
        .route("/dashboard", get(get_dashboard_html))
        .with_state(store)
}

pub fn render_dashboard_html(analysis: Option<&Analysis>, threshold: Threshold) -> String {
    let theta = threshold.value();
    let now_utc = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();

    let mut out = String::new();
    out.push_str("<!DOCTYPE html><html><head><meta charset=\"utf-8\">\n");
    out.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    out.push_str("<title>Rank Correlation</title>\n");
    out.push_str("<style>body{margin:0;font-family:\"Segoe UI\",sans-serif;background:#f4f6f8;color:#1d2730}.shell{max-width:1400px;margin:0 auto;padding:20px}.card{background:#fff;border:1px solid #d4dbe1;border-radius:12px;padding:14px;margin-top:14px;overflow:auto}table{border-collapse:collapse}th,td{padding:6px 10px;border-bottom:1px solid #e3e8ec;font-size:.85rem;white-space:nowrap}.correlation-hidden{color:#b0b8bf}.correlation-positive{background:#d7f0e4}.correlation-high-positive{background:#7fd1a8}.correlation-negative{background:#f7d9d9}.correlation-high-negative{background:#e88c8c}.stats span{margin-right:18px}</style>\n");
    out.push_str("</head><body><main class=\"shell\">\n");
    out.push_str("<h1>Rank Correlation</h1>\n");
    out.push_str(&format!(
        "<div class=\"stats\"><span>Threshold: {theta:.2}</span><span>Generated: {}</span></div>\n",
        escape_html(&now_utc)
    ));

    let Some(analysis) = analysis else {
        out.push_str("<section class=\"card\" id=\"empty\">No dataset loaded. POST a CSV to /analysis.</section>\n");
        out.push_str("</main></body></html>\n");
        return out;
    };

    let view = analysis.view(threshold);
    let series = &analysis.series;
    out.push_str(&format!(
        "<section class=\"card\" id=\"data-stats\">Range: {} to {}, {} identifiers, {} days, {} valid rows, {} skipped rows</section>\n",
        series.first_day().map(day_key).unwrap_or_default(),
        series.last_day().map(day_key).unwrap_or_default(),
        series.len(),
        series.day_count(),
        analysis.report.valid_rows,
        analysis.report.invalid_rows
    ));

    if let Some(summary) = view.summary {
        out.push_str("<section class=\"card stats\" id=\"summary\">");
        out.push_str(&format!(
            "<span>Mean r: {:.2}</span><span>Positive: {}</span><span>r &ge; {theta:.2}: {}</span><span>r &le; {:.2}: {}</span>",
            summary.mean_correlation,
            format_ratio(summary.positive_ratio),
            format_ratio(summary.strong_positive_ratio),
            -theta,
            format_ratio(summary.strong_negative_ratio)
        ));
        out.push_str("</section>\n");
    }

    push_pair_table(
        &mut out,
        "positive-pairs",
        &view.pairs.positive,
        &format!("No positive pairs with r &ge; {theta:.2}"),
    );
    push_pair_table(
        &mut out,
        "negative-pairs",
        &view.pairs.negative,
        &format!("No negative pairs with r &le; {:.2}", -theta),
    );

    out.push_str("<section class=\"card\"><table id=\"heatmap\"><thead><tr><th></th>");
    for identifier in &view.identifiers {
        out.push_str(&format!("<th>{}</th>", escape_html(identifier)));
    }
    out.push_str("</tr></thead><tbody>\n");
    for (i, row) in view.heatmap.iter().enumerate() {
        out.push_str(&format!("<tr><th>{}</th>", escape_html(&view.identifiers[i])));
        for (j, cell) in row.iter().enumerate() {
            let r = analysis.matrix.get(i, j).unwrap_or_default();
            let text = if r.abs() >= theta {
                format!("{r:.2}")
            } else {
                "-".to_string()
            };
            out.push_str(&format!(
                "<td class=\"{}\" title=\"{} / {}: {r:.2}\">{text}</td>",
                cell.css_class(),
                escape_html(&view.identifiers[i]),
                escape_html(&view.identifiers[j])
            ));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</tbody></table></section>\n");
    out.push_str("</main></body></html>\n");
    out
}

fn push_pair_table(out: &mut String, id: &str, pairs: &[CorrelationPair], empty_text: &str) {
    out.push_str(&format!("<section class=\"card\"><table id=\"{id}\">"));
    out.push_str("<thead><tr><th>Identifier 1</th><th>Identifier 2</th><th>r</th><th>Strength</th></tr></thead><tbody>\n");
    if pairs.is_empty() {
        out.push_str(&format!("<tr><td colspan=\"4\">{empty_text}</td></tr>\n"));
    }
    for pair in pairs {
        out.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{:.2}</td><td>{}</td></tr>\n",
            escape_html(&pair.first),
            escape_html(&pair.second),
            pair.correlation,
            pair.strength.label()
        ));
    }
    out.push_str("</tbody></table></section>\n");
}

fn format_ratio(ratio: f64) -> String {
    format!("{:.2}%", ratio * 100.0)
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

#[derive(Debug, Deserialize)]
struct ViewQuery {
    threshold: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ThresholdUpdate {
    threshold: f64,
}

async fn post_analysis(State(store): State<AnalysisStore>, body: Bytes) -> Response {
    match store.ingest_csv(&body) {
        Ok(summary) => {
            info!(
                component = "dashboard",
                event = "http.analysis.ingest",
                bytes = body.len(),
                identifiers = summary.identifiers.len(),
                days = summary.day_count,
                valid_rows = summary.report.valid_rows,
                invalid_rows = summary.report.invalid_rows
            );
            Json(summary).into_response()
        }
        Err(err) => {
            warn!(
                component = "dashboard",
                event = "http.analysis.ingest_failed",
                bytes = body.len(),
                error = %err
            );
            error_response(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
        }
    }
}

async fn get_analysis_view(
    State(store): State<AnalysisStore>,
    query: Result<Query<ViewQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => {
            return error_response(StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text())
        }
    };
    let threshold = match query.threshold.map(Threshold::new).transpose() {
        Ok(threshold) => threshold,
        Err(err) => return error_response(StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
    };

    info!(
        component = "dashboard",
        event = "http.analysis.view",
        threshold_override = ?query.threshold
    );

    match store.view(threshold) {
        Some(view) => Json(view).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "no dataset loaded".to_string()),
    }
}

async fn put_threshold(
    State(store): State<AnalysisStore>,
    update: Result<Json<ThresholdUpdate>, JsonRejection>,
) -> Response {
    let Json(update) = match update {
        Ok(update) => update,
        Err(rejection) => {
            return error_response(StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text())
        }
    };

    match Threshold::new(update.threshold) {
        Ok(threshold) => {
            store.set_threshold(threshold);
            Json(json!({ "threshold": store.threshold().value() })).into_response()
        }
        Err(err) => error_response(StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
    }
}

async fn get_series(State(store): State<AnalysisStore>) -> Response {
    match store.series() {
        Some(series) => Json(json!({
            "days": series.day_keys(),
            "series": series.series,
        }))
        .into_response(),
        None => error_response(StatusCode::NOT_FOUND, "no dataset loaded".to_string()),
    }
}

async fn get_dashboard_html(State(store): State<AnalysisStore>) -> impl IntoResponse {
    info!(component = "dashboard", event = "http.dashboard.request");
    Html(store.render_html())
}
