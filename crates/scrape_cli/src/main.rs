//! CLI entry point for the three crawl flows: parks, campsites, and
//! reservation availability.

use clap::{Parser, Subcommand};
use gmaps::DistanceClient;
use park_scrape::spiders::{CampSiteSpider, ParkSpider, ReservationSpider, SpiderConfig};
use postgres::database::*;
use settings::Settings;

/// Scrape the park portal and reservation site into the database.
#[derive(Debug, Parser)]
#[command(name = "scrape_cli")]
struct Args {
    /// Path to the settings file.
    #[arg(short, long, default_value = "config.toml")]
    config: std::path::PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Crawl the park portal: parks, activities, facilities, operating dates.
    Parks,
    /// Crawl the reservation viewer for campsites, details, and photos.
    Campsites,
    /// Crawl availability for every park and remaining season date.
    Reservations,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let args = Args::parse();
    let settings = Settings::from_file(&args.config)?;

    let pool = create_connection_pool(&settings.db, 1).await?;
    test_connection(&pool).await?;
    run_migrations(&pool).await?;

    let config = SpiderConfig::from_settings(&settings.scrape);

    let stats = match args.command {
        Command::Parks => {
            let distance = DistanceClient::new(settings.gmaps.apikey.clone())?;
            ParkSpider::new(pool, distance, config)?.run().await?
        }
        Command::Campsites => CampSiteSpider::new(pool, config)?.run().await?,
        Command::Reservations => ReservationSpider::new(pool, config)?.run().await?,
    };

    log::info!(
        "Crawl finished. Items: {}. Skipped: {}. Failed: {}.",
        stats.items,
        stats.skipped,
        stats.failed
    );

    Ok(())
}
