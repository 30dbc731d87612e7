//! Belcando stores come from the Bewital storefinder search API. The
//! endpoint answers JSON whose `branches` entries each carry a rendered
//! `markerHtml` blob with the human-readable store details.

use std::error::Error;

use log::{debug, info, warn};
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

use crate::http::HttpSession;
use crate::record::{put, StoreRecord};
use crate::runner::StoreScraper;
use crate::session::ScrapeSession;

use super::records_from_list;

const API_URL: &str = "https://www.bewital-petfood.de/storefinder/search";

/// Query taken verbatim from the site's own map widget.
const SEARCH_QUERY: &[(&str, &str)] = &[("q", "0:0:0::0:2:Belcando"), ("iframe", "1")];

pub struct BelcandoScraper {
    embedded_json_regex: Regex,
    plz_regex: Regex,
    phone_regex: Regex,
}

impl BelcandoScraper {
    pub fn new() -> Self {
        BelcandoScraper {
            embedded_json_regex: Regex::new(r"(?s)(\[.*\])").unwrap(),
            plz_regex: Regex::new(r"\b(\d{5})\s+([[:alpha:]].*)").unwrap(),
            phone_regex: Regex::new(r"\+?\d[\d\s/().-]{5,}\d").unwrap(),
        }
    }

    fn branches_from_json(data: &Value) -> Vec<StoreRecord> {
        let list = if let Some(branches) = data.get("branches").and_then(Value::as_array) {
            branches
        } else if let Some(list) = data.as_array() {
            list
        } else {
            warn!("Unexpected API response format");
            return Vec::new();
        };

        let with_marker: Vec<Value> = list
            .iter()
            .filter(|item| item.get("markerHtml").is_some())
            .cloned()
            .collect();
        info!("Found {} stores in API response", with_marker.len());
        records_from_list(&with_marker)
    }

    /// Fallback for the occasional HTML answer: fish an embedded JSON array
    /// out of the body.
    fn stores_from_embedded_json(&self, body: &str) -> Vec<StoreRecord> {
        let Some(caps) = self.embedded_json_regex.captures(body) else {
            return Vec::new();
        };
        match serde_json::from_str::<Value>(&caps[1]) {
            Ok(Value::Array(list)) => records_from_list(&list),
            Ok(_) => Vec::new(),
            Err(e) => {
                debug!("Failed to parse embedded JSON: {}", e);
                Vec::new()
            }
        }
    }

    fn parse_marker_html(&self, html: &str) -> StoreRecord {
        let fragment = Html::parse_fragment(html);
        let mut store = StoreRecord::new();

        let name_selector = Selector::parse("strong, b, h3, h4").unwrap();
        if let Some(name) = fragment.select(&name_selector).next() {
            put(&mut store, "name", &name.text().collect::<Vec<_>>().join(" "));
        }

        let link_selector = Selector::parse("a[href]").unwrap();
        for link in fragment.select(&link_selector) {
            let href = link.value().attr("href").unwrap_or("");
            if href.starts_with("http") {
                put(&mut store, "website", href);
                break;
            }
        }

        let text = fragment.root_element().text().collect::<Vec<_>>().join("\n");
        let mut address_lines: Vec<&str> = Vec::new();
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if store.get("name").map_or(false, |name| name == line) {
                continue;
            }
            if let Some(caps) = self.plz_regex.captures(line) {
                put(&mut store, "postal_code", caps.get(1).map_or("", |m| m.as_str()));
                put(&mut store, "city", caps.get(2).map_or("", |m| m.as_str()));
                address_lines.push(line);
                continue;
            }
            let lower = line.to_lowercase();
            if lower.contains("tel") {
                if let Some(phone) = self.phone_regex.find(line) {
                    put(&mut store, "phone", phone.as_str());
                }
                continue;
            }
            address_lines.push(line);
        }
        if !address_lines.is_empty() {
            put(&mut store, "address", &address_lines.join(", "));
        }

        store
    }
}

impl StoreScraper for BelcandoScraper {
    fn website_key(&self) -> &str {
        "belcando"
    }

    fn fetch_stores(
        &mut self,
        http: &HttpSession,
        session: &mut ScrapeSession,
    ) -> Result<Vec<StoreRecord>, Box<dyn Error>> {
        info!("Starting Belcando store scraping via Bewital API");

        if let Err(e) = http.get_text(session.website_url()) {
            warn!("Failed to initialize session: {}", e);
        }
        http.polite_delay();

        info!("Fetching stores from Bewital API: {}", API_URL);
        let body = match http.get_text_with_query(API_URL, SEARCH_QUERY) {
            Ok(body) => body,
            Err(e) => {
                session.log_error(format!("Error fetching from Bewital API: {}", e), None);
                return Ok(Vec::new());
            }
        };

        let stores = match serde_json::from_str::<Value>(&body) {
            Ok(data) => Self::branches_from_json(&data),
            Err(e) => {
                debug!("Failed to parse JSON response: {}", e);
                self.stores_from_embedded_json(&body)
            }
        };

        info!("Total stores found: {}", stores.len());
        Ok(stores)
    }

    fn standardize(&self, raw: StoreRecord) -> StoreRecord {
        let get = |key: &str| raw.get(key).cloned().unwrap_or_default();

        let mut store = StoreRecord::new();
        put(&mut store, "store_id", &get("id"));
        put(&mut store, "latitude", &get("latitude"));
        put(&mut store, "longitude", &get("longitude"));
        put(&mut store, "source", "bewital_storefinder_api");

        if let Some(marker_html) = raw.get("markerHtml") {
            for (key, value) in self.parse_marker_html(marker_html) {
                store.insert(key, value);
            }
        }
        if store.get("name").map_or(true, String::is_empty) {
            put(&mut store, "name", &get("name"));
        }
        if store.get("address").map_or(true, String::is_empty) {
            put(&mut store, "address", &get("address"));
        }

        let mut full_address: Vec<String> = Vec::new();
        for key in ["address", "postal_code", "city"] {
            let value = store.get(key).cloned().unwrap_or_default();
            if !value.is_empty() && !full_address.contains(&value) {
                full_address.push(value);
            }
        }
        put(&mut store, "full_address", &full_address.join(", "));
        put(
            &mut store,
            "raw_data",
            &serde_json::to_string(&raw).unwrap_or_default(),
        );
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn branches_without_marker_html_are_dropped() {
        let data = json!({
            "branches": [
                { "id": 1, "markerHtml": "<div><strong>A</strong></div>" },
                { "id": 2 }
            ]
        });
        let stores = BelcandoScraper::branches_from_json(&data);
        assert_eq!(stores.len(), 1);
        assert_eq!(stores[0].get("id").unwrap(), "1");
    }

    #[test]
    fn marker_html_parsing_extracts_contact_details() {
        let scraper = BelcandoScraper::new();
        let html = r#"
            <div>
                <strong>Landhandel Schulte</strong><br/>
                Dorfstr. 8<br/>
                48720 Rosendahl<br/>
                Tel. 02547 9331<br/>
                <a href="https://landhandel-schulte.de">Webseite</a>
            </div>
        "#;
        let store = scraper.parse_marker_html(html);
        assert_eq!(store.get("name").unwrap(), "Landhandel Schulte");
        assert_eq!(store.get("postal_code").unwrap(), "48720");
        assert_eq!(store.get("city").unwrap(), "Rosendahl");
        assert_eq!(store.get("phone").unwrap(), "02547 9331");
        assert_eq!(store.get("website").unwrap(), "https://landhandel-schulte.de");
    }

    #[test]
    fn embedded_json_fallback_parses_array() {
        let scraper = BelcandoScraper::new();
        let body = r#"<script>var data = [{"name": "X", "latitude": 51.9}];</script>"#;
        let stores = scraper.stores_from_embedded_json(body);
        assert_eq!(stores.len(), 1);
        assert_eq!(stores[0].get("latitude").unwrap(), "51.9");
    }
}
