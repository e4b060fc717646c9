// src/weather/split.rs

use crate::dates;
use anyhow::{bail, Context, Result};
use chrono::Datelike;
use csv::{ReaderBuilder, Writer};
use std::{
    collections::{btree_map::Entry, BTreeMap},
    fs,
    fs::File,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

/// Split a combined weather CSV into per-year files plus two pivot-year
/// files, streaming row by row:
/// - `weather_<year>.csv` for every year before the pivot year,
/// - `weather_<py>_jan_<mon-1>.csv` for pivot-year months before the pivot,
/// - `weather_<py>_<mon>.csv` for the pivot month itself.
/// Rows past the pivot month are dropped with a warning. Headers are
/// written lazily on the first row routed to each file.
pub fn split_weather(
    input: &Path,
    outdir: &Path,
    pivot_year: i32,
    pivot_month: u32,
    overwrite: bool,
) -> Result<()> {
    if !(2..=12).contains(&pivot_month) {
        bail!("pivot month must be in 2..=12, got {}", pivot_month);
    }
    fs::create_dir_all(outdir).with_context(|| format!("creating {}", outdir.display()))?;

    if overwrite {
        for entry in
            fs::read_dir(outdir).with_context(|| format!("listing {}", outdir.display()))?
        {
            let path = entry?.path();
            let is_split_file = path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with("weather_") && n.ends_with(".csv"));
            if is_split_file {
                fs::remove_file(&path)
                    .with_context(|| format!("removing {}", path.display()))?;
            }
        }
    }

    let file = File::open(input).with_context(|| format!("opening {}", input.display()))?;
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(file);
    let headers = rdr
        .headers()
        .with_context(|| format!("reading header of {}", input.display()))?
        .clone();
    let ts_idx = headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case("timestamp"))
        .or_else(|| headers.iter().position(|h| h.to_lowercase().contains("time")))
        .context("cannot find a timestamp column in weather CSV")?;

    let head_abbr = dates::month_abbr(pivot_month - 1)?;
    let pivot_abbr = dates::month_abbr(pivot_month)?;

    let mut writers: BTreeMap<PathBuf, Writer<File>> = BTreeMap::new();
    let mut counts: BTreeMap<PathBuf, usize> = BTreeMap::new();
    let mut dropped_bad = 0usize;
    let mut dropped_late = 0usize;

    for (idx, result) in rdr.records().enumerate() {
        let record = result
            .with_context(|| format!("CSV parse error in {} at record {}", input.display(), idx))?;
        let ts = match record.get(ts_idx).and_then(dates::parse_timestamp) {
            Some(ts) => ts,
            None => {
                dropped_bad += 1;
                continue;
            }
        };

        let (year, month) = (ts.year(), ts.month());
        let name = if year < pivot_year {
            format!("weather_{}.csv", year)
        } else if year == pivot_year && month < pivot_month {
            format!("weather_{}_jan_{}.csv", year, head_abbr)
        } else if year == pivot_year && month == pivot_month {
            format!("weather_{}_{}.csv", year, pivot_abbr)
        } else {
            dropped_late += 1;
            continue;
        };

        let path = outdir.join(name);
        let wtr = match writers.entry(path.clone()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let file = File::create(e.key())
                    .with_context(|| format!("creating {}", e.key().display()))?;
                let mut wtr = Writer::from_writer(file);
                wtr.write_record(&headers).context("writing split header")?;
                e.insert(wtr)
            }
        };
        wtr.write_record(&record).context("writing split row")?;
        *counts.entry(path).or_insert(0) += 1;
    }

    for wtr in writers.values_mut() {
        wtr.flush().context("flushing split file")?;
    }

    if dropped_bad > 0 {
        warn!(rows = dropped_bad, "dropped rows with unparseable timestamps");
    }
    if dropped_late > 0 {
        warn!(
            rows = dropped_late,
            "dropped rows after {}-{:02}", pivot_year, pivot_month
        );
    }
    if counts.is_empty() {
        bail!("no rows in range; nothing written to {}", outdir.display());
    }
    for (path, rows) in &counts {
        info!(path = %path.display(), rows, "wrote split file");
    }
    Ok(())
}
