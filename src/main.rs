mod config;
mod error;
mod models;
mod scrapers;
mod store;

use anyhow::Context;
use crate::config::{LoggingConfig, Settings};
use scrapers::{ensure_app_ready, AlertsScraper, AppiumDriver, UiDriver};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));

    if logging.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    init_logging(&settings.logging);

    info!("🚗 Auction Scout - Live Alerts Scraper");
    info!("=======================================");
    info!("");

    let driver = AppiumDriver::connect(&settings.appium, &settings.feed).await?;
    let scraper = AlertsScraper::new(driver, &settings)?;

    let result = run(&scraper, &settings).await;

    // Always leave the device clean, whatever happened above
    info!("🧹 Closing app and session...");
    if let Err(e) = scraper.driver().terminate_app().await {
        warn!("⚠️ Could not close app: {}", e);
    }
    if let Err(e) = scraper.driver().quit().await {
        warn!("⚠️ Could not close Appium session: {}", e);
    }

    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("❌ Run failed: {:#}", e);
            Err(e)
        }
    }
}

async fn run(scraper: &AlertsScraper<AppiumDriver>, settings: &Settings) -> anyhow::Result<()> {
    ensure_app_ready(
        scraper.driver(),
        scraper.feed(),
        Duration::from_secs(settings.appium.launch_timeout_secs),
    )
    .await?;

    let summary = scraper.run().await.context("Scraping aborted")?;

    info!("\n✅ Scraped {} listings\n", summary.total_scraped());
    for (i, listing) in summary.listings().iter().enumerate() {
        println!(
            "{}. {} ({})",
            i + 1,
            listing.title.as_deref().unwrap_or("<untitled>"),
            listing.current_bid.as_deref().unwrap_or("no bid")
        );
        if let Some(location) = listing.location {
            println!("   Location: {}", location);
        }
        if let Some(mileage) = &listing.mileage {
            println!("   Mileage: {}", mileage);
        }
        println!("   Status: {:?}", listing.auction_status);
        if let Some(key) = &listing.cache_key {
            println!("   Key: {}", key);
        }
        println!();
    }

    Ok(())
}
