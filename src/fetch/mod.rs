// src/fetch/mod.rs

use crate::dates;
use crate::ingest::TrainingRecord;
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use csv::Writer;
use reqwest::Client;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info};

/// PJM DataMiner2 hourly metered load feed.
const FEED_URL: &str = "https://dataminer2.pjm.com/feed/hrl_load_metered";
const PAGE_SIZE: usize = 50_000;
const PAGE_PAUSE: Duration = Duration::from_millis(300);

#[derive(Debug, Deserialize)]
struct FeedRow {
    datetime_beginning_ept: Option<String>,
    zone: Option<String>,
    mw: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct FeedPage {
    #[serde(default)]
    data: Vec<FeedRow>,
}

/// First day of the month and the exclusive upper bound (first day of the
/// following month).
pub fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)
        .with_context(|| format!("invalid month {}-{:02}", year, month))?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .context("computing end of month")?;
    Ok((start, end))
}

fn rows_to_records(rows: Vec<FeedRow>) -> Vec<TrainingRecord> {
    rows.into_iter()
        .filter_map(|row| {
            let timestamp = row
                .datetime_beginning_ept
                .as_deref()
                .and_then(dates::parse_timestamp)?;
            let zone = row.zone?.trim().to_uppercase();
            if zone.is_empty() {
                return None;
            }
            Some(TrainingRecord {
                zone,
                timestamp,
                load_mw: row.mw?,
            })
        })
        .collect()
}

/// Download one month of hourly load rows, paging through the feed with
/// startRow/endRow windows until a short page ends the loop. Rows with
/// missing fields are dropped; no rows at all is an error.
pub async fn fetch_month(client: &Client, year: i32, month: u32) -> Result<Vec<TrainingRecord>> {
    let (start, end) = month_bounds(year, month)?;
    let gte = format!("{}T00:00:00", start.format("%Y-%m-%d"));
    let lt = format!("{}T00:00:00", end.format("%Y-%m-%d"));
    info!(%gte, %lt, "downloading PJM load feed");

    let mut records = Vec::new();
    let mut start_row = 1usize;
    loop {
        let end_row = start_row + PAGE_SIZE - 1;
        let page: FeedPage = client
            .get(FEED_URL)
            .query(&[
                ("startRow", start_row.to_string()),
                ("endRow", end_row.to_string()),
                ("fields", "datetime_beginning_ept,zone,mw".to_string()),
                ("datetime_beginning_ept__gte", gte.clone()),
                ("datetime_beginning_ept__lt", lt.clone()),
            ])
            .send()
            .await
            .with_context(|| format!("GET {} rows {}-{}", FEED_URL, start_row, end_row))?
            .error_for_status()?
            .json()
            .await
            .context("decoding feed page")?;

        let fetched = page.data.len();
        if fetched == 0 {
            break;
        }
        let parsed = rows_to_records(page.data);
        if parsed.len() < fetched {
            debug!(
                dropped = fetched - parsed.len(),
                start_row, "dropped feed rows with missing fields"
            );
        }
        records.extend(parsed);
        debug!(rows = fetched, start_row, "fetched feed page");

        if fetched < PAGE_SIZE {
            break;
        }
        start_row += PAGE_SIZE;
        tokio::time::sleep(PAGE_PAUSE).await;
    }

    if records.is_empty() {
        bail!("no load rows downloaded for {}-{:02}", year, month);
    }
    records.sort_by(|a, b| (a.zone.as_str(), a.timestamp).cmp(&(b.zone.as_str(), b.timestamp)));
    info!(rows = records.len(), "downloaded load feed");
    Ok(records)
}

/// Default feed output path: `data/raw/pjm_<year>_<mon>.csv`.
pub fn default_out_path(year: i32, month: u32) -> Result<PathBuf> {
    Ok(PathBuf::from("data/raw").join(format!("pjm_{}_{}.csv", year, dates::month_abbr(month)?)))
}

/// Write records as a standardized load CSV, readable back by the ingest
/// column sniffer.
pub fn write_load_csv<P: AsRef<Path>>(records: &[TrainingRecord], path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
    }

    let mut wtr =
        Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    wtr.write_record(["timestamp", "zone", "load_mw"])
        .context("writing load header")?;
    for r in records {
        wtr.write_record([
            r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            r.zone.clone(),
            r.load_mw.to_string(),
        ])
        .context("writing load row")?;
    }
    wtr.flush().context("flushing load CSV")?;

    info!(rows = records.len(), path = %path.display(), "wrote load CSV");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_bounds_are_half_open() {
        let (start, end) = month_bounds(2025, 11).unwrap();
        assert_eq!(start.to_string(), "2025-11-01");
        assert_eq!(end.to_string(), "2025-12-01");

        let (start, end) = month_bounds(2025, 12).unwrap();
        assert_eq!(start.to_string(), "2025-12-01");
        assert_eq!(end.to_string(), "2026-01-01");

        assert!(month_bounds(2025, 13).is_err());
    }

    #[test]
    fn feed_page_rows_convert_and_filter() {
        let page: FeedPage = serde_json::from_str(
            r#"{
                "data": [
                    {"datetime_beginning_ept": "2025-11-01T00:00:00", "zone": "ae", "mw": 1234.5},
                    {"datetime_beginning_ept": "2025-11-01T01:00:00", "zone": "AE", "mw": null},
                    {"datetime_beginning_ept": null, "zone": "AE", "mw": 1.0},
                    {"datetime_beginning_ept": "2025-11-01T02:00:00", "zone": " ps ", "mw": 99.0}
                ]
            }"#,
        )
        .unwrap();

        let records = rows_to_records(page.data);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].zone, "AE");
        assert_eq!(records[0].load_mw, 1234.5);
        assert_eq!(records[1].zone, "PS");
        assert_eq!(records[1].timestamp.to_string(), "2025-11-01 02:00:00");
    }

    #[test]
    fn feed_page_tolerates_missing_data_key() {
        let page: FeedPage = serde_json::from_str(r#"{"totalRows": 0}"#).unwrap();
        assert!(page.data.is_empty());
    }

    #[test]
    fn default_path_uses_month_abbreviation() {
        assert_eq!(
            default_out_path(2025, 11).unwrap(),
            PathBuf::from("data/raw/pjm_2025_nov.csv")
        );
    }

    #[test]
    fn load_csv_round_trips_through_ingest() {
        use chrono::NaiveDate;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pjm.csv");
        let records = vec![TrainingRecord {
            zone: "PS".to_string(),
            timestamp: NaiveDate::from_ymd_opt(2025, 11, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            load_mw: 5000.4,
        }];
        write_load_csv(&records, &path).unwrap();

        let back = crate::ingest::read_load_csv(&path).unwrap();
        assert_eq!(back, records);
    }
}
