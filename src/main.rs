use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use parasite_detect_rs::{
    model::load_detector, Config, Dashboard, ImageOutcome, ObjectDetector, SourceResolver,
    TerminalHost,
};

fn main() -> Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_max_level(config.log_level())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // the session is read before the model loads so bad flags fail fast
    let session = config.session()?;

    let detector = load_detector(&config.detector_config()).with_context(|| {
        format!(
            "Failed to load detection model: {}",
            config.model_path.display()
        )
    })?;
    let dashboard = Dashboard::new(detector, SourceResolver::new(config.fetcher()));
    info!(
        input_size = dashboard.detector().input_size(),
        classes = dashboard.detector().names().len(),
        "detector loaded"
    );

    let mut host = TerminalHost::new(&config.output_dir)?;
    let results = dashboard.run(&session, &mut host);

    let detections: usize = results.iter().map(|r| r.detections().len()).sum();
    let failed = results
        .iter()
        .filter(|r| matches!(r.outcome, ImageOutcome::Failed(_)))
        .count();
    info!(
        images = results.len(),
        detections,
        failed,
        output = %host.output_dir().display(),
        "run finished"
    );

    Ok(())
}
