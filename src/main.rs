use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use loadcast::{
    fetch, ingest,
    model::{self, predict, BaselineModel},
    weather,
};
use reqwest::Client;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "loadcast",
    about = "Historical-average load forecasting for PJM grid zones"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train the historical-average baseline from load CSVs.
    Train {
        /// Glob for load CSVs, e.g. "data/raw/pjm/hrl_load_metered_*.csv"
        #[arg(long)]
        pjm_glob: String,
        /// Output model Parquet
        #[arg(long, default_value = model::DEFAULT_MODEL_PATH)]
        out: PathBuf,
    },
    /// Predict a day of zonal load from a trained baseline model.
    Predict {
        /// Target date YYYY-MM-DD
        #[arg(long)]
        date: NaiveDate,
        /// Model Parquet path
        #[arg(long, default_value = model::DEFAULT_MODEL_PATH)]
        model: PathBuf,
        /// Comma-separated zone list (default: all zones in the model)
        #[arg(long)]
        zones: Option<String>,
        /// Output CSV (default: predictions/MM-DD.csv)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Download one month of hourly load from the PJM DataMiner2 feed.
    FetchLoad {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        month: u32,
        /// Output CSV (default: data/raw/pjm_<year>_<mon>.csv)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Auxiliary weather data operations.
    Weather {
        #[command(subcommand)]
        command: WeatherCommand,
    },
}

#[derive(Subcommand, Debug)]
enum WeatherCommand {
    /// Download hourly weather for every configured zone.
    Download {
        /// Zone coordinates JSON, {"ZONE": [lat, lon], ...}
        #[arg(long)]
        zones_json: PathBuf,
        /// Glob for load CSVs; their timestamp span sets the window
        #[arg(long)]
        pjm_glob: String,
        /// Override window start YYYY-MM-DD
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Override window end YYYY-MM-DD
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long, default_value = "data/raw/noaa_hourly.csv")]
        out: PathBuf,
    },
    /// Split a combined weather CSV into per-year and pivot-month files.
    Split {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        outdir: PathBuf,
        #[arg(long, default_value_t = 2025)]
        pivot_year: i32,
        #[arg(long, default_value_t = 11)]
        pivot_month: u32,
        /// Remove previous split files first
        #[arg(long)]
        overwrite: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    match Cli::parse().command {
        Command::Train { pjm_glob, out } => {
            let records = ingest::load_glob(&pjm_glob)?;
            let model = BaselineModel::train(&records);
            model.write_parquet(&out)?;
        }

        Command::Predict {
            date,
            model,
            zones,
            out,
        } => {
            let model = BaselineModel::read_parquet(&model)?;
            let zones: Option<Vec<String>> = zones.map(|z| {
                z.split(',')
                    .map(|s| s.trim().to_uppercase())
                    .filter(|s| !s.is_empty())
                    .collect()
            });
            let predictions = predict::predict_day(&model, date, zones.as_deref())?;
            let out = out.unwrap_or_else(|| predict::default_out_path(date));
            predict::write_predictions_csv(&predictions, &out)?;
        }

        Command::FetchLoad { year, month, out } => {
            let client = Client::new();
            let records = fetch::fetch_month(&client, year, month).await?;
            let out = match out {
                Some(out) => out,
                None => fetch::default_out_path(year, month)?,
            };
            fetch::write_load_csv(&records, &out)?;
        }

        Command::Weather { command } => match command {
            WeatherCommand::Download {
                zones_json,
                pjm_glob,
                start,
                end,
                out,
            } => {
                let coords = weather::load_zone_coords(&zones_json)?;
                let (mut window_start, mut window_end) = match (start, end) {
                    (Some(s), Some(e)) => (s, e),
                    _ => ingest::load_span(&pjm_glob)?,
                };
                if let Some(s) = start {
                    window_start = s;
                }
                if let Some(e) = end {
                    window_end = e;
                }
                let client = Client::new();
                weather::download(&client, &coords, window_start, window_end, &out).await?;
            }
            WeatherCommand::Split {
                input,
                outdir,
                pivot_year,
                pivot_month,
                overwrite,
            } => {
                weather::split::split_weather(&input, &outdir, pivot_year, pivot_month, overwrite)?;
            }
        },
    }

    Ok(())
}
