// src/model/predict.rs

use super::BaselineModel;
use anyhow::{bail, Context, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use csv::Writer;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use tracing::info;

/// A single forecast slot: one zone, one hour of the target date.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub date: NaiveDate,
    pub zone: String,
    pub timestamp: NaiveDateTime,
    pub pred_load_mw: i64,
}

/// Predict all 24 hour slots of `date` for each zone.
///
/// Lookup per (zone, hour) is a strictly ordered three-tier fallback:
/// 1. exact (zone, day-of-week, hour) group mean,
/// 2. mean of the zone's means for that hour across all days-of-week,
/// 3. mean of all means for that hour across every zone and day.
///
/// No blending across tiers; the first tier that has data wins. Values are
/// rounded to the nearest integer MW. `zones` defaults to every zone in the
/// model, sorted. An hour with no data at any tier (the model holds no
/// entry for that hour anywhere) is an error, as is an empty model.
pub fn predict_day(
    model: &BaselineModel,
    date: NaiveDate,
    zones: Option<&[String]>,
) -> Result<Vec<Prediction>> {
    if model.is_empty() {
        bail!("baseline model is empty; nothing to predict from");
    }

    // Fallback means, computed once per call from the group means (means of
    // means, matching the tier definitions above).
    let mut zone_hour: BTreeMap<(&str, u32), (f64, u64)> = BTreeMap::new();
    let mut by_hour: BTreeMap<u32, (f64, u64)> = BTreeMap::new();
    for (zone, _dow, hour, mean) in model.iter() {
        let cell = zone_hour.entry((zone, hour)).or_insert((0.0, 0));
        cell.0 += mean;
        cell.1 += 1;
        let cell = by_hour.entry(hour).or_insert((0.0, 0));
        cell.0 += mean;
        cell.1 += 1;
    }

    let all_zones: Vec<String>;
    let zones: Vec<&str> = match zones {
        Some(zs) if !zs.is_empty() => zs.iter().map(|z| z.as_str()).collect(),
        _ => {
            all_zones = model.zones();
            all_zones.iter().map(|z| z.as_str()).collect()
        }
    };

    let dow = date.weekday().num_days_from_monday();
    let mut predictions = Vec::with_capacity(zones.len() * 24);
    for &zone in &zones {
        for hour in 0..24u32 {
            let pred = if let Some(mean) = model.get(zone, dow, hour) {
                mean
            } else if let Some(&(sum, n)) = zone_hour.get(&(zone, hour)) {
                sum / n as f64
            } else if let Some(&(sum, n)) = by_hour.get(&hour) {
                sum / n as f64
            } else {
                bail!("model has no entries for hour {} in any zone", hour);
            };

            let timestamp = date
                .and_hms_opt(hour, 0, 0)
                .context("building slot timestamp")?;
            predictions.push(Prediction {
                date,
                zone: zone.to_string(),
                timestamp,
                pred_load_mw: pred.round() as i64,
            });
        }
    }

    Ok(predictions)
}

/// Default predictions path: `predictions/MM-DD.csv`.
pub fn default_out_path(date: NaiveDate) -> PathBuf {
    PathBuf::from("predictions").join(format!("{}.csv", date.format("%m-%d")))
}

pub fn write_predictions_csv<P: AsRef<Path>>(predictions: &[Prediction], path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
    }

    let mut wtr =
        Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    wtr.write_record(["date", "zone", "timestamp", "pred_load_mw"])
        .context("writing predictions header")?;
    for p in predictions {
        wtr.write_record([
            p.date.format("%Y-%m-%d").to_string(),
            p.zone.clone(),
            p.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            p.pred_load_mw.to_string(),
        ])
        .context("writing prediction row")?;
    }
    wtr.flush().context("flushing predictions CSV")?;

    info!(rows = predictions.len(), path = %path.display(), "wrote predictions");
    Ok(())
}
