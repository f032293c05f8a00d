use serde_json::{Value, json};
use viewport_sampler_lib::{BoxPolygon, Station, StationField, ViewportSample};

/// `{ "level": ..., "geometry": ..., "stations": [...] }`
///
/// `level` is null when no level filter was applied, `geometry` is null for an empty
/// viewport. With `fields` set, each station only carries its id and those keys.
pub fn render(sample: &ViewportSample, fields: Option<&[StationField]>) -> Value {
    let stations: Vec<Value> = sample
        .stations
        .iter()
        .map(|station| render_station(station, fields))
        .collect();
    json!({
        "level": sample.resolution.level(),
        "geometry": sample.geometry.as_ref().map(BoxPolygon::to_geojson),
        "stations": stations,
    })
}

fn render_station(station: &Station, fields: Option<&[StationField]>) -> Value {
    let mut value = json!(station);
    if let (Some(fields), Value::Object(map)) = (fields, &mut value) {
        map.retain(|key, _| {
            key == StationField::Id.as_str() || fields.iter().any(|field| field.as_str() == key)
        });
    }
    value
}
