use std::error::Error;
use std::path::PathBuf;

use log::{error, info};
use serde::Serialize;

use crate::config::{Config, WebsiteConfig};
use crate::http::HttpSession;
use crate::record::StoreRecord;
use crate::session::ScrapeSession;
use crate::writer;

/// Vendor-specific behavior behind the shared lifecycle. Each store-locator
/// website gets one implementation; the runner never looks past this trait.
pub trait StoreScraper {
    /// Key identifying the website in configuration and output filenames.
    fn website_key(&self) -> &str;

    /// Retrieve the full current set of raw, vendor-shaped store records
    /// from the target site. Per-request and per-record problems should be
    /// logged into the session and skipped; an `Err` aborts this vendor's
    /// run (and only this vendor's).
    fn fetch_stores(
        &mut self,
        http: &HttpSession,
        session: &mut ScrapeSession,
    ) -> Result<Vec<StoreRecord>, Box<dyn Error>>;

    /// Map one raw record into the vendor's standardized shape. The default
    /// passes records through untouched.
    fn standardize(&self, raw: StoreRecord) -> StoreRecord {
        raw
    }
}

/// Outcome of one vendor run, returned to the orchestrator.
#[derive(Debug, Serialize)]
pub struct RunResult {
    pub website: String,
    pub success: bool,
    pub stores_found: usize,
    pub errors_count: usize,
    pub output_file: Option<PathBuf>,
    pub error: Option<String>,
    pub duration_secs: f64,
}

impl RunResult {
    /// A failure produced before a session even started (unknown scraper,
    /// disabled website).
    pub fn failure(website: &str, error: impl Into<String>) -> Self {
        RunResult {
            website: website.to_string(),
            success: false,
            stores_found: 0,
            errors_count: 0,
            output_file: None,
            error: Some(error.into()),
            duration_secs: 0.0,
        }
    }
}

/// Run one vendor scraper end to end: open a session, fetch, standardize,
/// augment, save, report. Any error escaping the vendor's fetch or
/// standardize step is caught here and folded into a `success=false`
/// result, so one broken website never takes down a batch over the others.
pub fn run(scraper: &mut dyn StoreScraper, website: &WebsiteConfig, config: &Config) -> RunResult {
    info!("Starting scraping session for {}", website.name);
    let mut session = ScrapeSession::new(&website.name, &website.url);

    let outcome = run_session(scraper, &mut session, config);
    let duration = session.finish();

    match outcome {
        Ok(output_file) => {
            info!(
                "Scraping completed for {}: {} stores, {} errors, {:.1}s",
                website.name,
                session.records().len(),
                session.errors().len(),
                duration.as_secs_f64()
            );
            RunResult {
                website: website.name.clone(),
                success: true,
                stores_found: session.records().len(),
                errors_count: session.errors().len(),
                output_file,
                error: None,
                duration_secs: duration.as_secs_f64(),
            }
        }
        Err(e) => {
            error!("Scraping failed for {}: {}", website.name, e);
            RunResult {
                website: website.name.clone(),
                success: false,
                stores_found: session.records().len(),
                errors_count: session.errors().len(),
                output_file: None,
                error: Some(e.to_string()),
                duration_secs: duration.as_secs_f64(),
            }
        }
    }
}

fn run_session(
    scraper: &mut dyn StoreScraper,
    session: &mut ScrapeSession,
    config: &Config,
) -> Result<Option<PathBuf>, Box<dyn Error>> {
    // The HTTP session lives for exactly this scope; it is dropped on every
    // exit path, error or not.
    let http = HttpSession::new(&config.scraping)?;

    let raw_stores = scraper.fetch_stores(&http, session)?;
    for raw in raw_stores {
        session.add_record(scraper.standardize(raw));
    }

    writer::save_records(
        session.records(),
        &config.output.directory,
        scraper.website_key(),
        None,
    )
}
