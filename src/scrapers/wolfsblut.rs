//! Wolfsblut dealer list. The site serves its whole dealer table as one CSV
//! file; the only guesswork is the delimiter and the header names.

use std::error::Error;

use log::{debug, info, warn};
use regex::Regex;

use crate::http::HttpSession;
use crate::record::{put, StoreRecord};
use crate::runner::StoreScraper;
use crate::session::ScrapeSession;

const CSV_URL: &str = "https://www.wolfsblut.com/media/sb8pnsb5-q9rw-ehwz-dcxk-uk6s62nhjncq-wb.csv";

const DELIMITERS: &[u8] = &[b';', b',', b'\t', b'|'];

/// Header-name candidates per standardized field, matched case-insensitively
/// by exact name or substring.
const FIELD_MAPPINGS: &[(&str, &[&str])] = &[
    ("id", &["fid", "id", "store_id", "dealer_id"]),
    ("name", &["name", "store_name", "dealer_name", "company"]),
    ("address", &["address", "street", "full_address", "location"]),
    ("latitude", &["latitude", "lat", "y", "coord_lat"]),
    ("longitude", &["longitude", "lng", "lon", "x", "coord_lng"]),
    ("phone", &["phone", "telephone", "tel"]),
    ("email", &["email", "mail"]),
    ("website", &["website", "url", "web"]),
    ("city", &["city", "town", "place"]),
    ("postal_code", &["postal_code", "zip", "plz"]),
    ("country", &["country", "land"]),
];

pub struct WolfsblutScraper {
    postal_regex: Regex,
}

impl WolfsblutScraper {
    pub fn new() -> Self {
        WolfsblutScraper {
            postal_regex: Regex::new(r"^(\d{4,5})\s+(.+)").unwrap(),
        }
    }

    /// Parse the downloaded CSV, trying each delimiter until one produces a
    /// plausible store table.
    fn parse_csv(content: &str) -> Vec<StoreRecord> {
        for &delimiter in DELIMITERS {
            let mut rdr = csv::ReaderBuilder::new()
                .delimiter(delimiter)
                .flexible(true)
                .trim(csv::Trim::All)
                .from_reader(content.as_bytes());

            let headers = match rdr.headers() {
                Ok(headers) => headers.clone(),
                Err(e) => {
                    debug!("Failed to read headers with delimiter '{}': {}", delimiter as char, e);
                    continue;
                }
            };
            if !headers.iter().any(|h| h.trim().len() > 1) {
                continue;
            }

            let mut stores = Vec::new();
            for row in rdr.records() {
                let row = match row {
                    Ok(row) => row,
                    Err(e) => {
                        debug!("Skipping malformed CSV row: {}", e);
                        continue;
                    }
                };
                let mut store = StoreRecord::new();
                for (header, field) in headers.iter().zip(row.iter()) {
                    if header.trim().is_empty() {
                        continue;
                    }
                    put(&mut store, header.trim(), field);
                }
                if !store.is_empty() {
                    stores.push(store);
                }
            }

            // At least some stores, otherwise it was the wrong delimiter.
            if stores.len() > 5 {
                info!(
                    "Successfully parsed CSV with delimiter '{}' - found {} stores",
                    delimiter as char,
                    stores.len()
                );
                return stores;
            }
        }
        Vec::new()
    }
}

impl StoreScraper for WolfsblutScraper {
    fn website_key(&self) -> &str {
        "wolfsblut"
    }

    fn fetch_stores(
        &mut self,
        http: &HttpSession,
        session: &mut ScrapeSession,
    ) -> Result<Vec<StoreRecord>, Box<dyn Error>> {
        info!("Starting Wolfsblut store scraping via CSV download");

        if let Err(e) = http.get_text(session.website_url()) {
            warn!("Failed to initialize session: {}", e);
        }
        http.polite_delay();

        info!("Downloading CSV from: {}", CSV_URL);
        let content = match http.get_text(CSV_URL) {
            Ok(content) => content,
            Err(e) => {
                session.log_error(format!("Error downloading CSV: {}", e), None);
                return Ok(Vec::new());
            }
        };
        info!("Downloaded CSV content length: {} characters", content.len());

        let stores = Self::parse_csv(&content);
        if stores.is_empty() {
            session.log_error("Failed to parse CSV with any delimiter", None);
        }

        info!("Total stores found: {}", stores.len());
        Ok(stores)
    }

    fn standardize(&self, raw: StoreRecord) -> StoreRecord {
        let mut store = raw.clone();

        for (standard_field, candidates) in FIELD_MAPPINGS {
            'candidates: for candidate in *candidates {
                for (key, value) in &raw {
                    let key_lower = key.to_lowercase();
                    if key_lower == *candidate || key_lower.contains(candidate) {
                        store.insert(format!("std_{}", standard_field), value.clone());
                        break 'candidates;
                    }
                }
            }
        }

        // A combined "Street 1, 12345 City" address splits into parts.
        let address = store
            .get("std_address")
            .or_else(|| store.get("address"))
            .cloned()
            .unwrap_or_default();
        if address.contains(',') {
            let parts: Vec<&str> = address.split(',').map(str::trim).collect();
            if parts.len() >= 2 {
                let last = parts[parts.len() - 1];
                if let Some(caps) = self.postal_regex.captures(last) {
                    put(&mut store, "parsed_postal_code", caps.get(1).map_or("", |m| m.as_str()));
                    put(&mut store, "parsed_city", caps.get(2).map_or("", |m| m.as_str()));
                } else if !last.is_empty() {
                    put(&mut store, "parsed_city", last);
                }
                put(&mut store, "parsed_street", &parts[..parts.len() - 1].join(", "));
            }
        }

        put(
            &mut store,
            "original_csv_data",
            &serde_json::to_string(&raw).unwrap_or_default(),
        );
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semicolon_csv_is_sniffed_and_parsed() {
        let mut content = String::from("Name;Strasse;PLZ;Ort\n");
        for i in 0..8 {
            content.push_str(&format!("Laden {i};Weg {i};5066{i};Koeln\n"));
        }

        let stores = WolfsblutScraper::parse_csv(&content);
        assert_eq!(stores.len(), 8);
        assert_eq!(stores[0].get("Name").unwrap(), "Laden 0");
        assert_eq!(stores[0].get("PLZ").unwrap(), "50660");
    }

    #[test]
    fn too_few_rows_reject_the_delimiter() {
        let content = "Name;Ort\nA;B\n";
        assert!(WolfsblutScraper::parse_csv(content).is_empty());
    }

    #[test]
    fn standardize_maps_headers_and_splits_address() {
        let scraper = WolfsblutScraper::new();
        let raw: StoreRecord = [
            ("Dealer_Name", "Hundefutter Huber"),
            ("Full_Address", "Marktplatz 2, 80331 Muenchen"),
            ("Tel", "089 123456"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let store = scraper.standardize(raw);
        assert_eq!(store.get("std_name").unwrap(), "Hundefutter Huber");
        assert_eq!(store.get("std_phone").unwrap(), "089 123456");
        assert_eq!(store.get("parsed_postal_code").unwrap(), "80331");
        assert_eq!(store.get("parsed_city").unwrap(), "Muenchen");
        assert_eq!(store.get("parsed_street").unwrap(), "Marktplatz 2");
    }
}
