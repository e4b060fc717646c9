// src/weather/mod.rs

pub mod split;

use crate::dates;
use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use csv::Writer;
use reqwest::Client;
use serde::Deserialize;
use std::{collections::BTreeMap, fs, path::Path, time::Duration};
use tracing::{info, warn};

/// Open-Meteo historical archive, addressed by coordinates.
const ARCHIVE_URL: &str = "https://archive-api.open-meteo.com/v1/archive";
const HOURLY_FIELDS: &str =
    "temperature_2m,dew_point_2m,relative_humidity_2m,precipitation,wind_speed_10m,surface_pressure";
const ZONE_PAUSE: Duration = Duration::from_millis(150);

/// Hourly weather observation for a zone. Field names mirror the columns of
/// the combined weather CSV.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherRecord {
    pub timestamp: NaiveDateTime,
    pub zone: String,
    pub temp: Option<f64>,
    pub dwpt: Option<f64>,
    pub rhum: Option<f64>,
    pub prcp: Option<f64>,
    pub wspd: Option<f64>,
    pub pres: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ArchiveResponse {
    hourly: Option<HourlySeries>,
}

#[derive(Debug, Default, Deserialize)]
struct HourlySeries {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    dew_point_2m: Vec<Option<f64>>,
    #[serde(default)]
    relative_humidity_2m: Vec<Option<f64>>,
    #[serde(default)]
    precipitation: Vec<Option<f64>>,
    #[serde(default)]
    wind_speed_10m: Vec<Option<f64>>,
    #[serde(default)]
    surface_pressure: Vec<Option<f64>>,
}

impl HourlySeries {
    fn records(self, zone: &str) -> Vec<WeatherRecord> {
        fn at(series: &[Option<f64>], i: usize) -> Option<f64> {
            series.get(i).copied().flatten()
        }
        self.time
            .iter()
            .enumerate()
            .filter_map(|(i, t)| {
                let timestamp = dates::parse_timestamp(t)?;
                Some(WeatherRecord {
                    timestamp,
                    zone: zone.to_string(),
                    temp: at(&self.temperature_2m, i),
                    dwpt: at(&self.dew_point_2m, i),
                    rhum: at(&self.relative_humidity_2m, i),
                    prcp: at(&self.precipitation, i),
                    wspd: at(&self.wind_speed_10m, i),
                    pres: at(&self.surface_pressure, i),
                })
            })
            .collect()
    }
}

/// Zone → (lat, lon), from a JSON object of two-element arrays, e.g.
/// `{"AE": [39.37, -74.42], "PS": [40.73, -74.17]}`.
pub fn load_zone_coords<P: AsRef<Path>>(path: P) -> Result<BTreeMap<String, (f64, f64)>> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let parsed: BTreeMap<String, Vec<f64>> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing zone coords from {}", path.display()))?;

    let mut coords = BTreeMap::new();
    for (zone, c) in parsed {
        if c.len() != 2 {
            bail!("zone {} must have [lat, lon], got {} values", zone, c.len());
        }
        coords.insert(zone, (c[0], c[1]));
    }
    if coords.is_empty() {
        bail!("no zones in {}", path.display());
    }
    Ok(coords)
}

async fn fetch_zone(
    client: &Client,
    zone: &str,
    lat: f64,
    lon: f64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<WeatherRecord>> {
    let resp: ArchiveResponse = client
        .get(ARCHIVE_URL)
        .query(&[
            ("latitude", lat.to_string()),
            ("longitude", lon.to_string()),
            ("start_date", start.format("%Y-%m-%d").to_string()),
            ("end_date", end.format("%Y-%m-%d").to_string()),
            ("hourly", HOURLY_FIELDS.to_string()),
        ])
        .send()
        .await
        .with_context(|| format!("GET weather for {}", zone))?
        .error_for_status()?
        .json()
        .await
        .with_context(|| format!("decoding weather response for {}", zone))?;

    Ok(resp.hourly.unwrap_or_default().records(zone))
}

/// Download hourly weather for every configured zone over [start, end]
/// (inclusive dates) and write one combined CSV. A zone that fails or comes
/// back empty is skipped; all zones failing is an error.
pub async fn download(
    client: &Client,
    coords: &BTreeMap<String, (f64, f64)>,
    start: NaiveDate,
    end: NaiveDate,
    out: &Path,
) -> Result<()> {
    info!(zones = coords.len(), %start, %end, "downloading hourly weather");

    let mut records: Vec<WeatherRecord> = Vec::new();
    for (zone, &(lat, lon)) in coords {
        match fetch_zone(client, zone, lat, lon, start, end).await {
            Ok(rows) if rows.is_empty() => warn!(zone = %zone, "no weather data"),
            Ok(rows) => {
                info!(zone = %zone, rows = rows.len(), "fetched weather");
                records.extend(rows);
            }
            Err(e) => warn!(zone = %zone, "weather fetch failed: {:#}", e),
        }
        tokio::time::sleep(ZONE_PAUSE).await;
    }

    if records.is_empty() {
        bail!("no weather retrieved; check coords and date range");
    }
    records.sort_by(|a, b| (a.zone.as_str(), a.timestamp).cmp(&(b.zone.as_str(), b.timestamp)));
    write_weather_csv(&records, out)
}

pub fn write_weather_csv<P: AsRef<Path>>(records: &[WeatherRecord], path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
    }

    fn field(v: Option<f64>) -> String {
        v.map(|x| x.to_string()).unwrap_or_default()
    }

    let mut wtr =
        Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    wtr.write_record(["timestamp", "zone", "temp", "dwpt", "rhum", "prcp", "wspd", "pres"])
        .context("writing weather header")?;
    for r in records {
        wtr.write_record([
            r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            r.zone.clone(),
            field(r.temp),
            field(r.dwpt),
            field(r.rhum),
            field(r.prcp),
            field(r.wspd),
            field(r.pres),
        ])
        .context("writing weather row")?;
    }
    wtr.flush().context("flushing weather CSV")?;

    info!(rows = records.len(), path = %path.display(), "wrote weather CSV");
    Ok(())
}
