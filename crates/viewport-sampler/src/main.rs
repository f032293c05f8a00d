mod dataset;
mod error;
mod logging;
mod output;
mod settings;

use error::AppError;
use settings::Settings;
use viewport_sampler_lib::{CachedBounds, ViewportSampler};

fn main() -> Result<(), AppError> {
    let settings = Settings::from_cli();
    logging::setup_logging(settings.verbose);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(AppError::Runtime)?;

    rt.block_on(run(settings))
}

async fn run(settings: Settings) -> Result<(), AppError> {
    let config = settings.config();
    let store = dataset::load_store(&settings)?;
    tracing::info!(stations = store.len(), "dataset loaded");

    let bounds = CachedBounds::with_ttl(store.clone(), config.bounds_ttl);
    let sampler = ViewportSampler::new(config)?;
    let request = settings.request();
    let sample = sampler.sample(&store, &bounds, &request).await?;
    tracing::info!(
        level = ?sample.resolution.level(),
        stations = sample.stations.len(),
        "viewport sampled"
    );

    let rendered = output::render(&sample, request.fields.as_deref());
    println!("{}", serde_json::to_string_pretty(&rendered)?);
    Ok(())
}
