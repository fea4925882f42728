use std::path::PathBuf;

use rankcorr::{
    day_key, init_logging, load_csv_dataset, logging_config_from_env, pipeline_config_from_env,
    run_pipeline, CorrelationPair, Threshold,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let Some(path) = args.next().map(PathBuf::from) else {
        return Err("usage: rank_correlation_report <dataset.csv> [threshold]".into());
    };

    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;

    let mut cfg = pipeline_config_from_env();
    if let Some(raw) = args.next() {
        cfg.threshold = Threshold::new(raw.parse::<f64>()?)?;
    }
    let theta = cfg.threshold.value();

    let dataset = load_csv_dataset(&path)?;
    let analysis = run_pipeline(&dataset, &cfg)?;

    for notice in &analysis.columns.notices {
        println!(
            "Using column {} \"{}\" as the {} column",
            notice.position + 1,
            notice.column,
            notice.role.as_str()
        );
    }

    let series = &analysis.series;
    println!(
        "Processed {} rows, skipped {} invalid rows",
        analysis.report.valid_rows, analysis.report.invalid_rows
    );
    println!(
        "Range {} to {}: {} identifiers, {} days",
        series.first_day().map(day_key).unwrap_or_default(),
        series.last_day().map(day_key).unwrap_or_default(),
        series.len(),
        series.day_count()
    );
    if !analysis.dropped.is_empty() {
        println!("Dropped without data: {}", analysis.dropped.join(", "));
    }

    let view = analysis.view(cfg.threshold);

    println!("\nPositive pairs (r >= {theta:.2})");
    print_pairs(&view.pairs.positive);
    println!("\nNegative pairs (r <= {:.2})", -theta);
    print_pairs(&view.pairs.negative);

    if let Some(summary) = view.summary {
        println!("\nSummary over {} pairs", summary.pair_count);
        println!("  mean r:             {:.2}", summary.mean_correlation);
        println!("  positive:           {:.2}%", summary.positive_ratio * 100.0);
        println!(
            "  r >= {theta:.2}:          {:.2}%",
            summary.strong_positive_ratio * 100.0
        );
        println!(
            "  r <= {:.2}:         {:.2}%",
            -theta,
            summary.strong_negative_ratio * 100.0
        );
    }

    Ok(())
}

fn print_pairs(pairs: &[CorrelationPair]) {
    if pairs.is_empty() {
        println!("  none");
        return;
    }
    for pair in pairs {
        println!(
            "  {} | {} | {:+.2} | {}",
            pair.first,
            pair.second,
            pair.correlation,
            pair.strength.label()
        );
    }
}
