//! Josera dealer search. The site is a Next.js app; its build-data JSON
//! endpoint carries the full dealer list. The build hash in the URL changes
//! with each deployment, so a discovery pass over the page's `/api/` links
//! serves as fallback.

use std::collections::BTreeSet;
use std::error::Error;

use log::{debug, info, warn};
use regex::Regex;
use serde_json::Value;
use url::Url;

use crate::http::HttpSession;
use crate::record::{put, StoreRecord};
use crate::runner::StoreScraper;
use crate::session::ScrapeSession;

use super::records_from_list;

const DATA_URL: &str = "https://fachhandel.josera.de/_next/data/tC2WS-5m6zxCBNQ4qR1HB/index.json";

const PAGE_PROPS_KEYS: &[&str] = &[
    "shops",
    "stores",
    "dealers",
    "partners",
    "locations",
    "data",
    "storeData",
    "dealerData",
    "partnerData",
    "mapData",
    "initialData",
    "props",
    "content",
];

const NESTED_KEYS: &[&str] = &["stores", "data", "items", "results"];

pub struct JoseraScraper {
    api_link_regex: Regex,
}

impl JoseraScraper {
    pub fn new() -> Self {
        JoseraScraper {
            api_link_regex: Regex::new(r#""(/api/[^"]*)""#).unwrap(),
        }
    }

    fn stores_from_page_props(data: &Value) -> Vec<StoreRecord> {
        let page_props = match data.get("pageProps").and_then(Value::as_object) {
            Some(props) => props,
            None => {
                warn!("No pageProps in Next.js data response");
                return Vec::new();
            }
        };

        for key in PAGE_PROPS_KEYS {
            match page_props.get(*key) {
                Some(Value::Array(list)) if !list.is_empty() => {
                    info!("Found {} stores in pageProps.{}", list.len(), key);
                    return records_from_list(list);
                }
                Some(Value::Object(nested)) => {
                    for sub_key in NESTED_KEYS {
                        if let Some(list) = nested.get(*sub_key).and_then(Value::as_array) {
                            info!("Found {} stores in pageProps.{}.{}", list.len(), key, sub_key);
                            return records_from_list(list);
                        }
                    }
                }
                _ => {}
            }
        }

        warn!("No stores found in expected pageProps keys");
        Vec::new()
    }

    /// Scan the locator page for `/api/` routes and probe each for a store
    /// list. Best effort only.
    fn discover_api_endpoint(
        &self,
        http: &HttpSession,
        session: &mut ScrapeSession,
    ) -> Vec<StoreRecord> {
        let html = match http.get_text(session.website_url()) {
            Ok(html) => html,
            Err(e) => {
                session.log_error(format!("Error loading page for API discovery: {}", e), None);
                return Vec::new();
            }
        };
        let base = match Url::parse(session.website_url()) {
            Ok(url) => url,
            Err(e) => {
                session.log_error(format!("Invalid website URL: {}", e), None);
                return Vec::new();
            }
        };

        let mut probed: BTreeSet<String> = BTreeSet::new();
        for caps in self.api_link_regex.captures_iter(&html) {
            let path = caps.get(1).map_or("", |m| m.as_str());
            if !probed.insert(path.to_string()) {
                continue;
            }
            if probed.len() > 5 {
                break;
            }
            let full_url = match base.join(path) {
                Ok(url) => url,
                Err(_) => continue,
            };

            http.polite_delay();
            debug!("Probing discovered endpoint: {}", full_url);
            match http.get_json(full_url.as_str()) {
                Ok(Value::Array(list)) if !list.is_empty() => {
                    info!("Discovered store data at {}", full_url);
                    return records_from_list(&list);
                }
                Ok(_) => {}
                Err(e) => debug!("Probe failed for {}: {}", full_url, e),
            }
        }

        Vec::new()
    }
}

impl StoreScraper for JoseraScraper {
    fn website_key(&self) -> &str {
        "josera"
    }

    fn fetch_stores(
        &mut self,
        http: &HttpSession,
        session: &mut ScrapeSession,
    ) -> Result<Vec<StoreRecord>, Box<dyn Error>> {
        info!("Starting Josera store scraping via JSON API");

        if let Err(e) = http.get_text(session.website_url()) {
            warn!("Failed to initialize session: {}", e);
        }
        http.polite_delay();

        info!("Fetching data from Next.js API: {}", DATA_URL);
        let stores = match http.get_json(DATA_URL) {
            Ok(data) => Self::stores_from_page_props(&data),
            Err(e) => {
                session.log_error(format!("Error fetching from Next.js API: {}", e), None);
                Vec::new()
            }
        };

        if stores.is_empty() {
            info!("No stores from build-data endpoint, trying API discovery...");
            return Ok(self.discover_api_endpoint(http, session));
        }

        info!("Successfully fetched {} stores from Next.js API", stores.len());
        Ok(stores)
    }

    fn standardize(&self, raw: StoreRecord) -> StoreRecord {
        let get = |key: &str| raw.get(key).cloned().unwrap_or_default();

        let mut store = StoreRecord::new();
        put(&mut store, "name", &get("name"));
        put(&mut store, "address_street", &get("addressStreet"));
        put(&mut store, "address_city", &get("addressCity"));
        put(&mut store, "address_postcode", &get("addressPostcode"));
        put(&mut store, "address_region", &get("addressRegion"));
        put(&mut store, "address_country", &get("addressCountry"));
        put(&mut store, "latitude", &get("latitude"));
        put(&mut store, "longitude", &get("longitude"));
        put(&mut store, "contact_phone", &get("contactPhone"));
        put(&mut store, "contact_mobile", &get("contactMobile"));
        put(&mut store, "contact_email", &get("contactEmail"));
        put(&mut store, "website_main", &get("websiteMain"));
        put(&mut store, "website_ecommerce", &get("websiteEcommerce"));
        put(&mut store, "is_partner", &get("partner"));
        put(&mut store, "has_delivery", &get("delivery"));

        let openings = [
            ("Mo", "openingMon"),
            ("Di", "openingTue"),
            ("Mi", "openingWed"),
            ("Do", "openingThu"),
            ("Fr", "openingFri"),
            ("Sa", "openingSat"),
            ("So", "openingSun"),
        ];
        let summary: Vec<String> = openings
            .iter()
            .filter_map(|(day, key)| {
                let hours = get(key);
                if hours.is_empty() || hours == "null" {
                    None
                } else {
                    Some(format!("{}: {}", day, hours))
                }
            })
            .collect();
        put(&mut store, "opening_hours_summary", &summary.join("; "));

        let mut address_parts: Vec<String> = Vec::new();
        if !get("addressStreet").is_empty() {
            address_parts.push(get("addressStreet"));
        }
        let city_part: Vec<String> = [get("addressPostcode"), get("addressCity")]
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect();
        if !city_part.is_empty() {
            address_parts.push(city_part.join(" "));
        }
        if !get("addressCountry").is_empty() {
            address_parts.push(get("addressCountry"));
        }
        put(&mut store, "full_address", &address_parts.join(", "));

        put(
            &mut store,
            "raw_data",
            &serde_json::to_string(&raw).unwrap_or_default(),
        );
        store
    }
}
