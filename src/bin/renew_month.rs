// src/bin/renew_month.rs
//
// Refresh a single month of PJM load + weather data (default: Nov 2025):
//   renew_month --zones-json config/zone_coords.json
//   renew_month --zones-json config/zone_coords.json --year 2025 --month 11
//
// Writes data/raw/pjm_<year>_<mon>.csv and data/raw/weather_<year>_<mon>.csv.

use anyhow::{Context, Result};
use clap::Parser;
use loadcast::{dates, fetch, weather};
use reqwest::Client;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "renew_month", about = "Renew one month of PJM load + weather data")]
struct Args {
    /// Zone coordinates JSON, {"ZONE": [lat, lon], ...}
    #[arg(long)]
    zones_json: PathBuf,
    #[arg(long, default_value_t = 2025)]
    year: i32,
    #[arg(long, default_value_t = 11)]
    month: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let args = Args::parse();
    let mon = dates::month_abbr(args.month)?;
    let pjm_out = PathBuf::from("data/raw").join(format!("pjm_{}_{}.csv", args.year, mon));
    let weather_out = PathBuf::from("data/raw").join(format!("weather_{}_{}.csv", args.year, mon));

    let client = Client::new();

    let records = fetch::fetch_month(&client, args.year, args.month).await?;
    fetch::write_load_csv(&records, &pjm_out)?;

    let coords = weather::load_zone_coords(&args.zones_json)?;
    let (start, end_excl) = fetch::month_bounds(args.year, args.month)?;
    let end = end_excl.pred_opt().context("computing last day of month")?;
    weather::download(&client, &coords, start, end, &weather_out).await?;

    info!(
        pjm = %pjm_out.display(),
        weather = %weather_out.display(),
        "renewed month"
    );
    Ok(())
}
