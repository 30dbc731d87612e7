//! End-to-end lifecycle tests driving fake vendor scrapers through the
//! shared run/save/report sequence.

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use petstore_scraper::config::Config;
use petstore_scraper::http::HttpSession;
use petstore_scraper::runner::{self, StoreScraper};
use petstore_scraper::{ScrapeSession, StoreRecord};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("petstore_e2e_{}_{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

fn test_config(output_dir: &Path) -> Config {
    serde_json::from_value(serde_json::json!({
        "websites": {
            "alpha": {
                "name": "Alpha Pet Food",
                "url": "https://alpha.example/stores/",
                "enabled": true
            },
            "beta": {
                "name": "Beta Pet Food",
                "url": "https://beta.example/haendler/",
                "enabled": true
            }
        },
        "output": { "directory": output_dir }
    }))
    .unwrap()
}

fn record(pairs: &[(&str, &str)]) -> StoreRecord {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

struct StubScraper {
    key: &'static str,
    stores: Vec<StoreRecord>,
    fail_with: Option<&'static str>,
}

impl StoreScraper for StubScraper {
    fn website_key(&self) -> &str {
        self.key
    }

    fn fetch_stores(
        &mut self,
        _http: &HttpSession,
        _session: &mut ScrapeSession,
    ) -> Result<Vec<StoreRecord>, Box<dyn Error>> {
        match self.fail_with {
            Some(message) => Err(message.into()),
            None => Ok(self.stores.clone()),
        }
    }
}

#[test]
fn one_vendor_failure_does_not_affect_the_other() {
    let dir = scratch_dir("isolation");
    let config = test_config(&dir);

    let mut failing = StubScraper {
        key: "alpha",
        stores: Vec::new(),
        fail_with: Some("locator endpoint moved"),
    };
    let mut working = StubScraper {
        key: "beta",
        stores: vec![
            record(&[("name", "Store A"), ("city", "Berlin")]),
            record(&[("name", "Store B"), ("zip", "10115")]),
        ],
        fail_with: None,
    };

    let result_a = runner::run(&mut failing, config.website("alpha").unwrap(), &config);
    let result_b = runner::run(&mut working, config.website("beta").unwrap(), &config);

    assert!(!result_a.success);
    assert_eq!(result_a.error.as_deref(), Some("locator endpoint moved"));
    assert_eq!(result_a.stores_found, 0);
    assert!(result_a.output_file.is_none());

    assert!(result_b.success);
    assert_eq!(result_b.stores_found, 2);
    assert!(result_b.output_file.is_some());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn saved_file_carries_union_columns_and_metadata() {
    let dir = scratch_dir("columns");
    let config = test_config(&dir);

    let mut scraper = StubScraper {
        key: "beta",
        stores: vec![
            record(&[("name", "A"), ("city", "Berlin")]),
            record(&[("name", "B"), ("zip", "10115")]),
        ],
        fail_with: None,
    };

    let result = runner::run(&mut scraper, config.website("beta").unwrap(), &config);
    assert!(result.success);

    let path = result.output_file.unwrap();
    let mut rdr = csv::Reader::from_path(&path).unwrap();
    let headers: Vec<String> = rdr.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(
        headers,
        vec!["city", "name", "scraped_at", "source_url", "source_website", "zip"]
    );

    let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 2);
    // Row 1 has city but no zip, row 2 the other way around.
    assert_eq!(&rows[0][0], "Berlin");
    assert_eq!(&rows[0][5], "");
    assert_eq!(&rows[1][0], "");
    assert_eq!(&rows[1][5], "10115");
    // Metadata stamped by the session, not the vendor.
    assert_eq!(&rows[0][3], "https://beta.example/haendler/");
    assert_eq!(&rows[0][4], "Beta Pet Food");
    assert!(!rows[0][2].is_empty());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn empty_fetch_is_success_without_output_file() {
    let dir = scratch_dir("empty");
    let config = test_config(&dir);

    let mut scraper = StubScraper {
        key: "alpha",
        stores: Vec::new(),
        fail_with: None,
    };

    let result = runner::run(&mut scraper, config.website("alpha").unwrap(), &config);
    assert!(result.success);
    assert_eq!(result.stores_found, 0);
    assert!(result.output_file.is_none());
    assert!(!dir.exists());
}

#[test]
fn output_filename_follows_vendor_key_convention() {
    let dir = scratch_dir("naming");
    let config = test_config(&dir);

    let mut scraper = StubScraper {
        key: "alpha",
        stores: vec![record(&[("name", "Store1")])],
        fail_with: None,
    };

    let result = runner::run(&mut scraper, config.website("alpha").unwrap(), &config);
    let path = result.output_file.unwrap();
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("alpha_"));
    assert!(name.ends_with(".csv"));
    // alpha_YYYYMMDD_HHMMSS.csv
    assert_eq!(name.len(), "alpha_".len() + 15 + ".csv".len());

    let _ = fs::remove_dir_all(&dir);
}
