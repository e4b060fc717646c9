// src/model/mod.rs

pub mod predict;

use crate::ingest::TrainingRecord;
use anyhow::{Context, Result};
use arrow::array::{Array, Float64Array, Int32Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, Timelike};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::{collections::BTreeMap, fs, fs::File, path::Path, sync::Arc};
use tracing::info;

pub const DEFAULT_MODEL_PATH: &str = "models/baseline_hist_avg.parquet";

/// Mean historical load per (zone, day-of-week, hour-of-day) group.
/// `day_of_week` is 0–6 with Monday = 0; `hour` is 0–23. Keyed zone-first
/// so zone enumeration and per-zone lookups stay ordered and cheap.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BaselineModel {
    means: BTreeMap<String, BTreeMap<(u32, u32), f64>>,
}

impl BaselineModel {
    /// Group records by (zone, day-of-week, hour) and take the arithmetic
    /// mean of each group. Empty input yields an empty model.
    pub fn train(records: &[TrainingRecord]) -> Self {
        let mut acc: BTreeMap<String, BTreeMap<(u32, u32), (f64, u64)>> = BTreeMap::new();
        for r in records {
            let slot = (
                r.timestamp.weekday().num_days_from_monday(),
                r.timestamp.hour(),
            );
            let cell = acc
                .entry(r.zone.clone())
                .or_default()
                .entry(slot)
                .or_insert((0.0, 0));
            cell.0 += r.load_mw;
            cell.1 += 1;
        }

        let means = acc
            .into_iter()
            .map(|(zone, slots)| {
                let slots = slots
                    .into_iter()
                    .map(|(slot, (sum, n))| (slot, sum / n as f64))
                    .collect();
                (zone, slots)
            })
            .collect();
        Self { means }
    }

    pub fn insert(&mut self, zone: String, day_of_week: u32, hour: u32, load_mean: f64) {
        self.means
            .entry(zone)
            .or_default()
            .insert((day_of_week, hour), load_mean);
    }

    pub fn is_empty(&self) -> bool {
        self.means.is_empty()
    }

    /// Number of (zone, day-of-week, hour) groups.
    pub fn len(&self) -> usize {
        self.means.values().map(|m| m.len()).sum()
    }

    pub fn get(&self, zone: &str, day_of_week: u32, hour: u32) -> Option<f64> {
        self.means
            .get(zone)
            .and_then(|m| m.get(&(day_of_week, hour)))
            .copied()
    }

    /// All zones in the model, sorted.
    pub fn zones(&self) -> Vec<String> {
        self.means.keys().cloned().collect()
    }

    /// Iterate every group as (zone, day_of_week, hour, load_mean), in
    /// (zone, day_of_week, hour) order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32, u32, f64)> + '_ {
        self.means.iter().flat_map(|(zone, slots)| {
            slots
                .iter()
                .map(move |(&(dow, hour), &mean)| (zone.as_str(), dow, hour, mean))
        })
    }

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("zone", DataType::Utf8, false),
            Field::new("day_of_week", DataType::Int32, false),
            Field::new("hour", DataType::Int32, false),
            Field::new("load_mean", DataType::Float64, false),
        ]))
    }

    /// Persist the model as a Parquet table (zone, day_of_week, hour,
    /// load_mean). Writes to a `.tmp` sibling and renames into place.
    pub fn write_parquet<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }

        let mut zones = Vec::with_capacity(self.len());
        let mut dows = Vec::with_capacity(self.len());
        let mut hours = Vec::with_capacity(self.len());
        let mut means = Vec::with_capacity(self.len());
        for (zone, dow, hour, mean) in self.iter() {
            zones.push(zone.to_string());
            dows.push(dow as i32);
            hours.push(hour as i32);
            means.push(mean);
        }

        let schema = Self::schema();
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(zones)),
                Arc::new(Int32Array::from(dows)),
                Arc::new(Int32Array::from(hours)),
                Arc::new(Float64Array::from(means)),
            ],
        )
        .context("building model record batch")?;

        let tmp_path = path.with_extension("parquet.tmp");
        let file = File::create(&tmp_path)
            .with_context(|| format!("creating {}", tmp_path.display()))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(file, schema, Some(props))
            .context("creating Arrow writer for model")?;
        writer.write(&batch).context("writing model batch")?;
        writer.close().context("closing model writer")?;

        fs::rename(&tmp_path, path).with_context(|| {
            format!("renaming {} to {}", tmp_path.display(), path.display())
        })?;

        info!(rows = self.len(), path = %path.display(), "wrote baseline means");
        Ok(())
    }

    /// Load a model previously written by [`write_parquet`].
    ///
    /// [`write_parquet`]: BaselineModel::write_parquet
    pub fn read_parquet<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("opening model {}", path.display()))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .with_context(|| format!("reading Parquet metadata of {}", path.display()))?
            .with_batch_size(8192)
            .build()
            .with_context(|| format!("building Parquet reader for {}", path.display()))?;

        let mut model = BaselineModel::default();
        for batch in reader {
            let batch = batch.context("reading model record batch")?;
            let schema = batch.schema();
            let zones = batch
                .column(schema.index_of("zone")?)
                .as_any()
                .downcast_ref::<StringArray>()
                .context("zone column should be Utf8")?;
            let dows = batch
                .column(schema.index_of("day_of_week")?)
                .as_any()
                .downcast_ref::<Int32Array>()
                .context("day_of_week column should be Int32")?;
            let hours = batch
                .column(schema.index_of("hour")?)
                .as_any()
                .downcast_ref::<Int32Array>()
                .context("hour column should be Int32")?;
            let means = batch
                .column(schema.index_of("load_mean")?)
                .as_any()
                .downcast_ref::<Float64Array>()
                .context("load_mean column should be Float64")?;

            for row in 0..batch.num_rows() {
                model.insert(
                    zones.value(row).to_string(),
                    dows.value(row) as u32,
                    hours.value(row) as u32,
                    means.value(row),
                );
            }
        }

        info!(rows = model.len(), path = %path.display(), "loaded baseline model");
        Ok(model)
    }
}
