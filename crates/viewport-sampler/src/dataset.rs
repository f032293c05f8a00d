use crate::error::AppError;
use crate::settings::{Settings, unix_now};
use std::io::BufReader;
use std::path::Path;
use viewport_sampler_lib::synthetic::SyntheticGrid;
use viewport_sampler_lib::{MemoryStationStore, Station};

/// Build the store once at startup, from a JSON file or a synthetic grid
pub fn load_store(settings: &Settings) -> Result<MemoryStationStore, AppError> {
    let stations = match settings.dataset_path() {
        Some(path) => read_stations(&path)?,
        None => {
            tracing::info!(depth = settings.synthetic_depth, "no dataset given, using synthetic grid");
            SyntheticGrid {
                depth: settings.synthetic_depth,
                last_measure: unix_now(),
                ..Default::default()
            }
            .generate()
        }
    };
    Ok(MemoryStationStore::new(stations))
}

fn read_stations(path: &Path) -> Result<Vec<Station>, AppError> {
    let file = std::fs::File::open(path).map_err(|source| AppError::Dataset {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "reading dataset");
    Ok(serde_json::from_reader(BufReader::new(file))?)
}
