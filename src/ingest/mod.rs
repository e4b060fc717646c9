// src/ingest/mod.rs

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use csv::ReaderBuilder;
use glob::glob;
use std::{
    collections::HashSet,
    fs::File,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// One hourly metered-load observation for a zone.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRecord {
    pub zone: String,
    pub timestamp: NaiveDateTime,
    pub load_mw: f64,
}

/// Header aliases accepted in load CSVs, in priority order. PJM exports
/// rename these columns depending on the download surface.
const TIMESTAMP_ALIASES: &[&str] = &[
    "timestamp",
    "datetime",
    "datetime_beginning_ept",
    "datetime_beginning_utc",
    "datetime_beginning_gmt",
    "datetime_beginning",
];
const ZONE_ALIASES: &[&str] = &["zone", "zone_name", "area", "area_name"];
const LOAD_ALIASES: &[&str] = &["mw", "load_mw", "hrl_load", "load", "value"];

fn find_column(headers: &[String], aliases: &[&str]) -> Option<usize> {
    aliases
        .iter()
        .find_map(|alias| headers.iter().position(|h| h == alias))
}

/// Read one load CSV into standardized records. The three required columns
/// are located by alias; a file missing any of them is a hard error. Rows
/// whose timestamp, zone or load fail to parse are dropped.
pub fn read_load_csv<P: AsRef<Path>>(path: P) -> Result<Vec<TrainingRecord>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(file);

    let headers: Vec<String> = rdr
        .headers()
        .with_context(|| format!("reading header of {}", path.display()))?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let ts_idx = find_column(&headers, TIMESTAMP_ALIASES)
        .with_context(|| format!("no timestamp column in {}", path.display()))?;
    let zone_idx = find_column(&headers, ZONE_ALIASES)
        .with_context(|| format!("no zone column in {}", path.display()))?;
    let load_idx = find_column(&headers, LOAD_ALIASES)
        .with_context(|| format!("no load column in {}", path.display()))?;

    let mut records = Vec::new();
    let mut dropped = 0usize;
    for (idx, result) in rdr.records().enumerate() {
        let record = result
            .with_context(|| format!("CSV parse error in {} at record {}", path.display(), idx))?;

        let timestamp = record.get(ts_idx).and_then(crate::dates::parse_timestamp);
        let zone = record
            .get(zone_idx)
            .map(|z| z.trim().to_uppercase())
            .filter(|z| !z.is_empty());
        let load_mw = record
            .get(load_idx)
            .and_then(|v| v.trim().replace(',', "").parse::<f64>().ok());

        match (timestamp, zone, load_mw) {
            (Some(timestamp), Some(zone), Some(load_mw)) => records.push(TrainingRecord {
                zone,
                timestamp,
                load_mw,
            }),
            _ => dropped += 1,
        }
    }

    if dropped > 0 {
        debug!(path = %path.display(), dropped, "dropped unparseable rows");
    }
    Ok(records)
}

fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in glob(pattern).with_context(|| format!("invalid glob pattern: {}", pattern))? {
        match entry {
            Ok(p) if p.is_file() => files.push(p),
            Ok(_) => {}
            Err(e) => warn!("cannot read glob entry: {:?}", e),
        }
    }
    files.sort();
    Ok(files)
}

/// Load every CSV matched by `pattern`, deduplicate by (zone, timestamp)
/// keeping the first occurrence, and sort by (zone, timestamp).
pub fn load_glob(pattern: &str) -> Result<Vec<TrainingRecord>> {
    let files = expand_glob(pattern)?;
    if files.is_empty() {
        bail!("no load files matched pattern: {}", pattern);
    }
    info!(files = files.len(), pattern, "reading load CSVs");

    let mut records = Vec::new();
    for path in &files {
        let mut rows = read_load_csv(path)?;
        records.append(&mut rows);
    }

    let mut seen = HashSet::new();
    records.retain(|r| seen.insert((r.zone.clone(), r.timestamp)));
    records.sort_by(|a, b| (a.zone.as_str(), a.timestamp).cmp(&(b.zone.as_str(), b.timestamp)));

    info!(rows = records.len(), "ingested load history");
    Ok(records)
}

/// Min/max dates across the timestamp column of every file in the glob.
/// Used to size the weather download window to the load history.
pub fn load_span(pattern: &str) -> Result<(NaiveDate, NaiveDate)> {
    let files = expand_glob(pattern)?;
    if files.is_empty() {
        bail!("no load files matched pattern: {}", pattern);
    }

    let mut min: Option<NaiveDateTime> = None;
    let mut max: Option<NaiveDateTime> = None;
    for path in &files {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let mut rdr = ReaderBuilder::new().flexible(true).from_reader(file);
        let headers: Vec<String> = rdr
            .headers()
            .with_context(|| format!("reading header of {}", path.display()))?
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();
        let ts_idx = find_column(&headers, TIMESTAMP_ALIASES)
            .with_context(|| format!("no timestamp column in {}", path.display()))?;

        for result in rdr.records() {
            let record = result
                .with_context(|| format!("CSV parse error in {}", path.display()))?;
            if let Some(ts) = record.get(ts_idx).and_then(crate::dates::parse_timestamp) {
                min = Some(min.map_or(ts, |m| m.min(ts)));
                max = Some(max.map_or(ts, |m| m.max(ts)));
            }
        }
    }

    match (min, max) {
        (Some(lo), Some(hi)) => Ok((lo.date(), hi.date())),
        _ => bail!("no timestamps found across load files"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut tmp = NamedTempFile::new().expect("temp file");
        tmp.write_all(content.as_bytes()).expect("write");
        tmp
    }

    #[test]
    fn sniffs_pjm_feed_aliases() {
        let tmp = write_csv(
            "datetime_beginning_ept,zone_name,mw\n\
             11/1/2025 12:00:00 AM,ae,1234.5\n\
             11/1/2025 1:00:00 AM, ae ,1300.0\n",
        );
        let records = read_load_csv(tmp.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].zone, "AE");
        assert_eq!(records[0].timestamp.to_string(), "2025-11-01 00:00:00");
        assert_eq!(records[0].load_mw, 1234.5);
        assert_eq!(records[1].zone, "AE");
    }

    #[test]
    fn sniffs_standardized_header() {
        let tmp = write_csv(
            "timestamp,zone,load_mw\n\
             2025-11-01 00:00:00,PS,5000.4\n",
        );
        let records = read_load_csv(tmp.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].zone, "PS");
    }

    #[test]
    fn missing_zone_column_is_fatal() {
        let tmp = write_csv("timestamp,mw\n2025-11-01 00:00:00,5000\n");
        let err = read_load_csv(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("no zone column"));
    }

    #[test]
    fn missing_load_column_is_fatal() {
        let tmp = write_csv("timestamp,zone\n2025-11-01 00:00:00,PS\n");
        let err = read_load_csv(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("no load column"));
    }

    #[test]
    fn dirty_rows_are_dropped_not_fatal() {
        let tmp = write_csv(
            "timestamp,zone,mw\n\
             2025-11-01 00:00:00,PS,5000\n\
             garbage,PS,5000\n\
             2025-11-01 02:00:00,,5000\n\
             2025-11-01 03:00:00,PS,not-a-number\n",
        );
        let records = read_load_csv(tmp.path()).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn glob_dedups_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.csv"),
            "timestamp,zone,mw\n\
             2025-11-01 01:00:00,PS,100\n\
             2025-11-01 00:00:00,AE,50\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("b.csv"),
            "timestamp,zone,mw\n\
             2025-11-01 01:00:00,PS,999\n\
             2025-11-01 02:00:00,PS,200\n",
        )
        .unwrap();

        let pattern = format!("{}/*.csv", dir.path().display());
        let records = load_glob(&pattern).unwrap();
        assert_eq!(records.len(), 3);
        // sorted by (zone, timestamp)
        assert_eq!(records[0].zone, "AE");
        assert_eq!(records[1].zone, "PS");
        // duplicate (PS, 01:00) kept the first file's value
        assert_eq!(records[1].load_mw, 100.0);
        assert_eq!(records[2].timestamp.to_string(), "2025-11-01 02:00:00");
    }

    #[test]
    fn empty_glob_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = format!("{}/*.csv", dir.path().display());
        assert!(load_glob(&pattern).is_err());
    }

    #[test]
    fn span_covers_all_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.csv"),
            "timestamp,zone,mw\n2024-06-15 05:00:00,PS,1\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("b.csv"),
            "timestamp,zone,mw\n2025-11-30 23:00:00,PS,1\n",
        )
        .unwrap();

        let pattern = format!("{}/*.csv", dir.path().display());
        let (start, end) = load_span(&pattern).unwrap();
        assert_eq!(start.to_string(), "2024-06-15");
        assert_eq!(end.to_string(), "2025-11-30");
    }
}
