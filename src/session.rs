use std::time::{Duration, Instant};

use chrono::Local;
use log::error;

use crate::record::{ErrorRecord, StoreRecord, SCRAPED_AT, SOURCE_URL, SOURCE_WEBSITE};

/// Mutable state of one `run()` invocation: the records collected so far,
/// the errors hit along the way, and the elapsed time. Owned exclusively by
/// the runner; never shared across runs.
pub struct ScrapeSession {
    website_name: String,
    website_url: String,
    records: Vec<StoreRecord>,
    errors: Vec<ErrorRecord>,
    started: Instant,
    duration: Option<Duration>,
}

impl ScrapeSession {
    pub fn new(website_name: &str, website_url: &str) -> Self {
        ScrapeSession {
            website_name: website_name.to_string(),
            website_url: website_url.to_string(),
            records: Vec::new(),
            errors: Vec::new(),
            started: Instant::now(),
            duration: None,
        }
    }

    pub fn website_name(&self) -> &str {
        &self.website_name
    }

    pub fn website_url(&self) -> &str {
        &self.website_url
    }

    /// Accept a record into the session, stamping it with `scraped_at`,
    /// `source_website` and `source_url`. A vendor field that happens to use
    /// one of those names is overwritten.
    pub fn add_record(&mut self, mut store: StoreRecord) {
        store.insert(SCRAPED_AT.to_string(), Local::now().to_rfc3339());
        store.insert(SOURCE_WEBSITE.to_string(), self.website_name.clone());
        store.insert(SOURCE_URL.to_string(), self.website_url.clone());
        self.records.push(store);
    }

    /// Record a non-fatal error. Scraping continues regardless.
    pub fn log_error(&mut self, message: impl Into<String>, store: Option<StoreRecord>) {
        let message = message.into();
        error!("{}: {}", self.website_name, message);
        self.errors.push(ErrorRecord {
            timestamp: Local::now().to_rfc3339(),
            website: self.website_name.clone(),
            error: message,
            store,
        });
    }

    pub fn records(&self) -> &[StoreRecord] {
        &self.records
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    /// Freeze the session duration. Subsequent calls return the frozen value.
    pub fn finish(&mut self) -> Duration {
        if self.duration.is_none() {
            self.duration = Some(self.started.elapsed());
        }
        self.duration.unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> StoreRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn add_record_stamps_metadata() {
        let mut session = ScrapeSession::new("Bozita", "https://bozita.com/de/fachhandler-suchen/");
        session.add_record(record(&[("name", "Store1")]));

        let stored = &session.records()[0];
        assert_eq!(stored.get("name").unwrap(), "Store1");
        assert!(!stored.get(SCRAPED_AT).unwrap().is_empty());
        assert_eq!(stored.get(SOURCE_WEBSITE).unwrap(), "Bozita");
        assert_eq!(
            stored.get(SOURCE_URL).unwrap(),
            "https://bozita.com/de/fachhandler-suchen/"
        );
    }

    #[test]
    fn add_record_overwrites_colliding_vendor_fields() {
        let mut session = ScrapeSession::new("Josera", "https://fachhandel.josera.de/");
        session.add_record(record(&[("source_website", "bogus"), ("name", "A")]));

        let stored = &session.records()[0];
        assert_eq!(stored.get(SOURCE_WEBSITE).unwrap(), "Josera");
    }

    #[test]
    fn log_error_does_not_touch_records() {
        let mut session = ScrapeSession::new("Bosch", "https://www.bosch-tiernahrung.de/");
        session.log_error("endpoint structure changed", Some(record(&[("name", "X")])));

        assert_eq!(session.records().len(), 0);
        assert_eq!(session.errors().len(), 1);
        assert_eq!(session.errors()[0].website, "Bosch");
        assert!(!session.errors()[0].timestamp.is_empty());
    }

    #[test]
    fn finish_freezes_duration() {
        let mut session = ScrapeSession::new("Mera", "https://www.mera-petfood.com/");
        let first = session.finish();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(first, session.finish());
    }
}
