use std::error::Error;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::{info, warn, LevelFilter};

use petstore_scraper::config::Config;
use petstore_scraper::runner::{self, RunResult};
use petstore_scraper::{logger, scrapers};

#[derive(Parser)]
#[command(
    name = "petstore-scraper",
    about = "Store locator scraper for pet food retailer websites"
)]
struct Cli {
    /// Run the scraper for one website only
    #[arg(short, long)]
    website: Option<String>,

    /// List all available scrapers
    #[arg(short, long)]
    list: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to the configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    // Configuration problems are fatal: without the website table there is
    // nothing to scrape.
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(2);
        }
    };

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        config.logging.level.parse().unwrap_or(LevelFilter::Info)
    };
    logger::init(level);

    if cli.list {
        list_scrapers(&config);
        return;
    }

    let results = match &cli.website {
        Some(key) => match run_single(key, &config) {
            Ok(result) => vec![result],
            Err(e) => {
                eprintln!("Configuration error: {}", e);
                process::exit(2);
            }
        },
        None => run_all(&config),
    };

    print_summary(&results);

    // Nonzero exit if any scraper failed, so batch callers notice.
    if results.iter().any(|r| !r.success) {
        process::exit(1);
    }
}

fn run_single(key: &str, config: &Config) -> Result<RunResult, Box<dyn Error>> {
    let website = config.website(key)?;

    let Some(mut scraper) = scrapers::make_scraper(key) else {
        warn!("Scraper for '{}' not implemented yet", key);
        return Ok(RunResult::failure(
            &website.name,
            format!("Scraper for '{}' not implemented yet", key),
        ));
    };
    if !website.enabled {
        warn!("Scraper for '{}' is disabled in configuration", key);
        return Ok(RunResult::failure(
            &website.name,
            format!("Scraper for '{}' is disabled in configuration", key),
        ));
    }

    info!("Starting scraper for {}", key);
    Ok(runner::run(scraper.as_mut(), website, config))
}

fn run_all(config: &Config) -> Vec<RunResult> {
    info!("Starting all enabled scrapers");

    let mut results = Vec::new();
    for (key, website) in config.enabled_websites() {
        match scrapers::make_scraper(key) {
            Some(mut scraper) => {
                info!("Starting scraper for {}", key);
                results.push(runner::run(scraper.as_mut(), website, config));
            }
            None => {
                warn!("Scraper for '{}' not implemented yet", key);
                results.push(RunResult::failure(&website.name, "Scraper not implemented"));
            }
        }
    }
    results
}

/// Every configured website plus any registry entry the configuration does
/// not know about, each with its status.
fn scraper_listing(config: &Config) -> Vec<(String, &'static str, String)> {
    let mut rows = Vec::new();
    for (key, site) in &config.websites {
        let status = if !scrapers::AVAILABLE.contains(&key.as_str()) {
            "not implemented"
        } else if site.enabled {
            "enabled"
        } else {
            "disabled"
        };
        rows.push((key.clone(), status, site.name.clone()));
    }
    for key in scrapers::AVAILABLE {
        if !config.websites.contains_key(*key) {
            rows.push((key.to_string(), "not configured", String::new()));
        }
    }
    rows
}

fn list_scrapers(config: &Config) {
    println!("Available scrapers:");
    println!("{}", "-".repeat(40));
    for (key, status, name) in scraper_listing(config) {
        println!("{:<15} {:<15} {}", key, status, name);
    }
}


fn print_summary(results: &[RunResult]) {
    println!();
    println!("{}", "=".repeat(60));
    println!("SCRAPING SUMMARY");
    println!("{}", "=".repeat(60));

    let mut total_stores = 0;
    let mut successful = 0;
    let mut failed = 0;

    for result in results {
        let status = if result.success { "SUCCESS" } else { "FAILED" };
        println!(
            "{:<20} {:<10} Stores: {}",
            result.website, status, result.stores_found
        );
        if result.success {
            successful += 1;
            total_stores += result.stores_found;
            if let Some(path) = &result.output_file {
                println!("{:>20} Output: {}", "", path.display());
            }
        } else {
            failed += 1;
            println!(
                "{:>20} Error: {}",
                "",
                result.error.as_deref().unwrap_or("Unknown error")
            );
        }
        println!();
    }

    println!("{}", "-".repeat(60));
    println!("Total stores found: {}", total_stores);
    println!("Successful scrapers: {}", successful);
    println!("Failed scrapers: {}", failed);
    println!("{}", "=".repeat(60));
}
