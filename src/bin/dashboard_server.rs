use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use rankcorr::{
    analysis_router, init_logging, load_csv_dataset, log_app_bind, log_app_start,
    log_dataset_preload, logging_config_from_env, pipeline_config_from_env, AnalysisStore,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    let pipeline_cfg = pipeline_config_from_env();
    log_app_start(&logging_cfg, &pipeline_cfg);

    let addr: SocketAddr = std::env::var("RANKCORR_DASHBOARD_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
        .parse()?;

    let store = AnalysisStore::new(pipeline_cfg);
    if let Ok(raw) = std::env::var("RANKCORR_DATASET") {
        let path = PathBuf::from(raw.trim());
        preload(&store, &path);
    }

    let app = analysis_router(store);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    log_app_bind(bound_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// A broken preload file leaves the server running with an empty state.
fn preload(store: &AnalysisStore, path: &Path) {
    let outcome = load_csv_dataset(path)
        .map_err(|err| err.to_string())
        .and_then(|dataset| {
            store
                .ingest_dataset(&dataset)
                .map_err(|err| err.to_string())
        });

    match outcome {
        Ok(summary) => log_dataset_preload(path, Ok(summary.identifiers.len())),
        Err(reason) => log_dataset_preload(path, Err(&reason)),
    }
}
