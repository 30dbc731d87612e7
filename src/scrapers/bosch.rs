//! bosch Tiernahrung dealer map, an Amasty store locator. The AJAX endpoint
//! returns coordinates plus a rendered HTML popup per store; everything
//! beyond lat/lng has to be dug out of that popup.

use std::error::Error;

use log::{info, warn};
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

use crate::http::HttpSession;
use crate::record::{put, StoreRecord};
use crate::runner::StoreScraper;
use crate::session::ScrapeSession;

use super::{json_text, records_from_list};

const API_URL: &str = "https://www.bosch-tiernahrung.de/bosch_de_de/amlocator/index/ajax/";

pub struct BoschScraper {
    plz_regex: Regex,
    phone_regex: Regex,
    email_regex: Regex,
}

impl BoschScraper {
    pub fn new() -> Self {
        BoschScraper {
            plz_regex: Regex::new(r"\b(\d{5})\s+([[:alpha:]].*)").unwrap(),
            phone_regex: Regex::new(r"\+?\d[\d\s/().-]{5,}\d").unwrap(),
            email_regex: Regex::new(r"(?i)[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}").unwrap(),
        }
    }

    /// Pull name, address and contact details out of the popup HTML.
    fn parse_popup_html(&self, html: &str) -> StoreRecord {
        let fragment = Html::parse_fragment(html);
        let mut store = StoreRecord::new();

        let title_selector = Selector::parse(".amlocator-title").unwrap();
        if let Some(title) = fragment.select(&title_selector).next() {
            put(&mut store, "name", &title.text().collect::<Vec<_>>().join(" "));
        }

        let text = fragment.root_element().text().collect::<Vec<_>>().join("\n");
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if store.get("name").map_or(false, |name| name == line) {
                continue;
            }
            if let Some(caps) = self.plz_regex.captures(line) {
                put(&mut store, "postal_code", caps.get(1).map_or("", |m| m.as_str()));
                put(&mut store, "city", caps.get(2).map_or("", |m| m.as_str()));
                continue;
            }
            if let Some(email) = self.email_regex.find(line) {
                put(&mut store, "email", email.as_str());
                continue;
            }
            let lower = line.to_lowercase();
            if lower.contains("tel") || lower.contains("phone") {
                if let Some(phone) = self.phone_regex.find(line) {
                    put(&mut store, "phone", phone.as_str());
                    continue;
                }
            }
            // First remaining line with a house number is taken as the street.
            if !store.contains_key("street")
                && line.chars().any(|c| c.is_ascii_digit())
                && line.chars().any(|c| c.is_alphabetic())
            {
                put(&mut store, "street", line);
            }
        }

        store
    }

    fn format_full_address(store: &StoreRecord) -> String {
        let get = |key: &str| store.get(key).cloned().unwrap_or_default();

        let mut parts: Vec<String> = Vec::new();
        if !get("street").is_empty() {
            parts.push(get("street"));
        }
        match (get("postal_code").is_empty(), get("city").is_empty()) {
            (false, false) => parts.push(format!("{} {}", get("postal_code"), get("city"))),
            (true, false) => parts.push(get("city")),
            _ => {}
        }
        parts.join(", ")
    }
}

impl StoreScraper for BoschScraper {
    fn website_key(&self) -> &str {
        "bosch"
    }

    fn fetch_stores(
        &mut self,
        http: &HttpSession,
        session: &mut ScrapeSession,
    ) -> Result<Vec<StoreRecord>, Box<dyn Error>> {
        info!("Starting Bosch store scraping via Amasty locator API");

        if let Err(e) = http.get_text(session.website_url()) {
            warn!("Failed to initialize session: {}", e);
        }
        http.polite_delay();

        info!("Fetching stores from Amasty API: {}", API_URL);
        let data = match http.get_json(API_URL) {
            Ok(data) => data,
            Err(e) => {
                session.log_error(format!("Error fetching from Amasty API: {}", e), None);
                return Ok(Vec::new());
            }
        };

        let items = match data.get("items").and_then(Value::as_array) {
            Some(items) => items,
            None => {
                session.log_error("Unexpected API response structure", None);
                return Ok(Vec::new());
            }
        };
        let total = data
            .get("totalRecords")
            .map(json_text)
            .unwrap_or_else(|| items.len().to_string());
        info!("Found {} stores (totalRecords: {})", items.len(), total);

        Ok(records_from_list(items))
    }

    fn standardize(&self, raw: StoreRecord) -> StoreRecord {
        let get = |key: &str| raw.get(key).cloned().unwrap_or_default();

        let mut store = StoreRecord::new();
        put(&mut store, "store_id", &get("id"));
        put(&mut store, "latitude", &get("lat"));
        put(&mut store, "longitude", &get("lng"));
        put(&mut store, "source", "bosch_amasty_api");

        if let Some(popup_html) = raw.get("popup_html") {
            for (key, value) in self.parse_popup_html(popup_html) {
                store.insert(key, value);
            }
        }

        let full_address = Self::format_full_address(&store);
        put(&mut store, "full_address", &full_address);
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

    #[test]
    fn popup_html_yields_name_address_and_contact() {
        let scraper = BoschScraper::new();
        let html = r#"
            <div class="amlocator-info-popup">
                <div class="amlocator-title">Zoo &amp; Co. Harms</div>
                <div>Lange Str. 12</div>
                <div>27232 Sulingen</div>
                <div>Tel: 04271 2318</div>
                <div>info@zoo-harms.de</div>
            </div>
        "#;
        let store = scraper.parse_popup_html(html);
        assert_eq!(store.get("name").unwrap(), "Zoo & Co. Harms");
        assert_eq!(store.get("street").unwrap(), "Lange Str. 12");
        assert_eq!(store.get("postal_code").unwrap(), "27232");
        assert_eq!(store.get("city").unwrap(), "Sulingen");
        assert_eq!(store.get("phone").unwrap(), "04271 2318");
        assert_eq!(store.get("email").unwrap(), "info@zoo-harms.de");
    }

    #[test]
    fn standardize_keeps_coordinates_and_formats_address() {
        let scraper = BoschScraper::new();
        let raw: StoreRecord = [
            ("id", "17"),
            ("lat", "52.6"),
            ("lng", "8.8"),
            (
                "popup_html",
                "<div><div class=\"amlocator-title\">Futterkiste</div><div>Am Markt 1</div><div>27232 Sulingen</div></div>",
            ),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let store = scraper.standardize(raw);
        assert_eq!(store.get("store_id").unwrap(), "17");
        assert_eq!(store.get("latitude").unwrap(), "52.6");
        assert_eq!(store.get("name").unwrap(), "Futterkiste");
        assert_eq!(store.get("full_address").unwrap(), "Am Markt 1, 27232 Sulingen");
        assert_eq!(store.get("source").unwrap(), "bosch_amasty_api");
    }
}
