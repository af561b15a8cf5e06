use anyhow::Context;
use catalog_scraper::{CatalogScraper, ScrapingContext};
use clap::Parser;
use dotenv::dotenv;
use log::LevelFilter;

extern crate env_logger;
extern crate log;

/// Scrape course records for the given subjects from the university catalog.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Term label the results are scraped for.
    #[arg(long, default_value = "current")]
    term: String,

    /// Subject codes (e.g. CSE AMS). Defaults to the required subjects.
    subjects: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let context = ScrapingContext::new().context("failed to set up scraping context")?;
    let scraper = CatalogScraper::new(context);
    let results = scraper
        .run(&cli.term, &cli.subjects)
        .await
        .context("catalog scrape failed")?;

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
