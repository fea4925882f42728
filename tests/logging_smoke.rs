use std::io;
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use rankcorr::{
    analysis_router, log_app_bind, log_app_start, log_dataset_preload, read_csv_dataset,
    run_pipeline, AnalysisStore, LoggingConfig, PipelineConfig,
};
use tower::util::ServiceExt;
use tracing::dispatcher::with_default;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriter;

const CSV: &str = "when,sku,rank\n\
    2024-06-01,A,3\n\
    2024-06-02,A,4\n\
    2024-06-01,B,9\n\
    2024-06-02,B,1\n\
    2024-06-02,B,0\n";

#[derive(Clone, Default)]
struct SharedWriter {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedWriter {
    fn output_string(&self) -> String {
        let bytes = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        String::from_utf8_lossy(&bytes).to_string()
    }
}

struct SharedWriterGuard {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        out.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_logs(max_level: Level, f: impl FnOnce()) -> String {
    let writer = SharedWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_max_level(max_level)
        .with_writer(writer.clone())
        .finish();
    let dispatch = tracing::Dispatch::new(subscriber);

    with_default(&dispatch, f);
    writer.output_string()
}

#[test]
fn pipeline_run_emits_stage_events() {
    let dataset = read_csv_dataset(CSV.as_bytes()).expect("csv should parse");

    let logs = capture_logs(Level::INFO, || {
        run_pipeline(&dataset, &PipelineConfig::default()).expect("pipeline should succeed");
    });

    for event in [
        "pipeline.run.start",
        "columns.fallback",
        "aggregate.finish",
        "gaps.fill.finish",
        "correlation.matrix.built",
        "pipeline.run.finish",
    ] {
        assert!(
            logs.contains(&format!("\"event\":\"{event}\"")),
            "missing {event} in {logs}"
        );
    }
    assert!(!logs.contains("aggregate.row.rejected"));
}

#[test]
fn rejected_rows_are_logged_only_at_debug() {
    let dataset = read_csv_dataset(CSV.as_bytes()).expect("csv should parse");

    let logs = capture_logs(Level::DEBUG, || {
        run_pipeline(&dataset, &PipelineConfig::default()).expect("pipeline should succeed");
    });

    assert!(logs.contains("\"event\":\"aggregate.row.rejected\""));
}

#[test]
fn failed_run_emits_failure_event() {
    let dataset = read_csv_dataset("date,asin\n2024-06-01,A\n".as_bytes()).expect("csv parses");

    let logs = capture_logs(Level::INFO, || {
        run_pipeline(&dataset, &PipelineConfig::default()).expect_err("two columns only");
    });

    assert!(logs.contains("\"event\":\"pipeline.run.failed\""));
    assert!(!logs.contains("\"event\":\"pipeline.run.finish\""));
}

#[test]
fn server_lifecycle_helpers_emit_baseline_events() {
    let logs = capture_logs(Level::INFO, || {
        log_app_start(&LoggingConfig::default(), &PipelineConfig::default());
        log_app_bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080));
        log_dataset_preload(Path::new("ranks.csv"), Ok(4));
        log_dataset_preload(Path::new("missing.csv"), Err("No such file"));
    });

    assert!(logs.contains("\"event\":\"app.start\""));
    assert!(logs.contains("\"event\":\"app.bind\""));
    assert!(logs.contains("\"event\":\"dataset.preloaded\""));
    assert!(logs.contains("\"event\":\"dataset.preload_failed\""));
}

#[test]
fn dashboard_route_emits_request_event() {
    let logs = capture_logs(Level::INFO, || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("single-thread runtime should build");

        rt.block_on(async {
            let app = analysis_router(AnalysisStore::default());

            let response = app
                .oneshot(
                    Request::builder()
                        .uri("/dashboard")
                        .body(Body::empty())
                        .expect("request should build"),
                )
                .await
                .expect("dashboard request should succeed");

            assert_eq!(response.status(), StatusCode::OK);
        });
    });

    assert!(logs.contains("\"event\":\"http.dashboard.request\""));
}
