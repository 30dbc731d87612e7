//! Bozita store finder. The map widget on the locator page is fed by a
//! WordPress admin-ajax action that returns either JSON or a rendered HTML
//! fragment, depending on the day.

use std::error::Error;

use log::{debug, info, warn};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use crate::http::HttpSession;
use crate::record::{put, StoreRecord};
use crate::runner::StoreScraper;
use crate::session::ScrapeSession;

use super::records_from_list;

const AJAX_URL: &str = "https://bozita.com/de/wp-admin/admin-ajax.php";

/// Keys the store list has been observed under when the endpoint answers
/// with a keyed object instead of a bare array.
const STORE_LIST_KEYS: &[&str] = &["stores", "stockists", "dealers", "data", "results", "items"];

const STANDARD_FIELDS: &[&str] = &[
    "name",
    "address",
    "city",
    "postal_code",
    "phone",
    "email",
    "website",
];

pub struct BozitaScraper {
    plz_regex: Regex,
}

impl BozitaScraper {
    pub fn new() -> Self {
        BozitaScraper {
            plz_regex: Regex::new(r"\b(\d{5})\s+([[:alpha:]].*)").unwrap(),
        }
    }

    fn stores_from_json(data: &Value) -> Vec<StoreRecord> {
        if let Some(list) = data.as_array() {
            info!("Found {} stores in list response", list.len());
            return records_from_list(list);
        }
        if let Some(map) = data.as_object() {
            for key in STORE_LIST_KEYS {
                if let Some(list) = map.get(*key).and_then(Value::as_array) {
                    info!("Found {} stores in data.{}", list.len(), key);
                    return records_from_list(list);
                }
            }
            warn!("No stores found in expected keys of AJAX response");
        }
        Vec::new()
    }

    fn stores_from_html(&self, html: &str) -> Vec<StoreRecord> {
        let document = Html::parse_document(html);
        let candidates = Selector::parse("div, li").unwrap();

        let mut stores = Vec::new();
        for container in document.select(&candidates) {
            let class_attr = container.value().attr("class").unwrap_or("");
            if !class_attr.contains("store-") && !class_attr.contains("stock-listing") {
                continue;
            }
            match self.extract_html_store(&container) {
                Some(store) if store.get("name").map_or(false, |n| !n.is_empty()) => {
                    stores.push(store);
                }
                _ => debug!("Skipping store container without a usable name"),
            }
        }
        info!("Successfully extracted {} stores from HTML", stores.len());
        stores
    }

    fn extract_html_store(&self, container: &ElementRef) -> Option<StoreRecord> {
        let text = container.text().collect::<Vec<_>>().join("\n");
        let lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        if lines.is_empty() {
            return None;
        }

        let mut store = StoreRecord::new();
        put(&mut store, "name", lines[0]);
        if lines.len() > 1 {
            put(&mut store, "address", &lines[1..].join(", "));
        }
        for line in &lines[1..] {
            if let Some(caps) = self.plz_regex.captures(line) {
                put(&mut store, "postal_code", caps.get(1).map_or("", |m| m.as_str()));
                put(&mut store, "city", caps.get(2).map_or("", |m| m.as_str()));
                break;
            }
        }
        Some(store)
    }
}

impl StoreScraper for BozitaScraper {
    fn website_key(&self) -> &str {
        "bozita"
    }

    fn fetch_stores(
        &mut self,
        http: &HttpSession,
        session: &mut ScrapeSession,
    ) -> Result<Vec<StoreRecord>, Box<dyn Error>> {
        info!("Starting Bozita store scraping via AJAX API");

        // Visit the locator page first so the AJAX call carries its cookies.
        if let Err(e) = http.get_text(session.website_url()) {
            warn!("Failed to initialize session: {}", e);
        }
        http.polite_delay();

        let body = match http.post_form(
            AJAX_URL,
            &[
                ("action", "find_a_stockist"),
                ("userLoc", ""),
                ("searchedLoc", ""),
                ("pageId", "7104"),
            ],
        ) {
            Ok(body) => body,
            Err(e) => {
                session.log_error(format!("Error fetching from AJAX endpoint: {}", e), None);
                return Ok(Vec::new());
            }
        };
        info!("Response content length: {} characters", body.len());

        let stores = match serde_json::from_str::<Value>(&body) {
            Ok(data) => Self::stores_from_json(&data),
            Err(_) => {
                info!("Response is HTML, parsing for store data...");
                self.stores_from_html(&body)
            }
        };

        info!("Total stores found: {}", stores.len());
        Ok(stores)
    }

    /// Make sure every record carries the same baseline field set, whatever
    /// shape the endpoint happened to answer in.
    fn standardize(&self, raw: StoreRecord) -> StoreRecord {
        let mut store = StoreRecord::new();
        for field in STANDARD_FIELDS {
            store.insert(field.to_string(), String::new());
        }
        for (key, value) in raw {
            store.insert(key, value);
        }
        store
    }
}
