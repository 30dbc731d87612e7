//! Finnern retailer search, a TYPO3 form endpoint. One search only covers a
//! radius around a postal code, and the backend caches the result per
//! session, so the whole country is swept with a fixed grid of postal codes
//! and the session state is reset via the homepage between searches.

use std::collections::BTreeSet;
use std::error::Error;

use log::{info, warn};
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

use crate::http::HttpSession;
use crate::record::{put, StoreRecord};
use crate::runner::StoreScraper;
use crate::session::ScrapeSession;

const HOME_URL: &str = "https://www.finnern.de/";
const SEARCH_URL: &str = "https://www.finnern.de/haendlersuche";

const SEARCH_PARAMS: &[(&str, &str)] = &[
    ("tx_auwfinnern_retailersearchresult[action]", "searchResult"),
    ("tx_auwfinnern_retailersearchresult[controller]", "Retailer"),
    ("cHash", "61673a04e20cae0f07d5831ec420c580"),
];

/// One postal code per German postal region 0-9, plus second probes for
/// Berlin and Munich, each with its search radius in km.
const POSTAL_CODE_SEARCHES: &[(&str, &str)] = &[
    ("10119", "20"),
    ("10963", "20"),
    ("20095", "20"),
    ("80333", "20"),
    ("80794", "5"),
    ("50667", "20"),
    ("60311", "20"),
    ("01067", "20"),
    ("30159", "20"),
    ("40210", "20"),
    ("70173", "20"),
    ("90403", "20"),
];

/// Hidden TYPO3 form tokens captured from the site's own search box.
fn search_form<'a>(postal_code: &'a str, radius: &'a str) -> Vec<(&'static str, &'a str)> {
    vec![
        (
            "tx_auwfinnern_retailersearchresult[__referrer][@extension]",
            "AuwFinnern",
        ),
        (
            "tx_auwfinnern_retailersearchresult[__referrer][@controller]",
            "Retailer",
        ),
        (
            "tx_auwfinnern_retailersearchresult[__referrer][@action]",
            "searchBox",
        ),
        (
            "tx_auwfinnern_retailersearchresult[__referrer][arguments]",
            "YTowOnt9358e279a80a07b0ceae3147a3f1318177c99b416",
        ),
        (
            "tx_auwfinnern_retailersearchresult[__referrer][@request]",
            "{\"@extension\":\"AuwFinnern\",\"@controller\":\"Retailer\",\"@action\":\"searchBox\"}2a40683d551441c9a9231e9a006bf6930ae45f20",
        ),
        (
            "tx_auwfinnern_retailersearchresult[__trustedProperties]",
            "{\"plz\":1,\"radius\":1,\"country\":1}9b0e44876f2e28160d846ded4f7fb1f2a559a20a",
        ),
        ("tx_auwfinnern_retailersearchresult[plz]", postal_code),
        ("tx_auwfinnern_retailersearchresult[radius]", radius),
        ("tx_auwfinnern_retailersearchresult[country]", "D"),
    ]
}

pub struct FinnernScraper {
    phone_regex: Regex,
    address_regex: Regex,
}

impl FinnernScraper {
    pub fn new() -> Self {
        FinnernScraper {
            phone_regex: Regex::new(r"\+49\s*\([^)]+\)\s*[\d\s]+").unwrap(),
            // "12169 Berlin / Steglitzer Damm 29"
            address_regex: Regex::new(r"^(\d{5})\s+([^/]+)\s*/\s*(.+)").unwrap(),
        }
    }

    fn search_with_session_reset(
        &self,
        http: &HttpSession,
        postal_code: &str,
        radius: &str,
    ) -> Result<String, reqwest::Error> {
        // Visiting the homepage clears the backend's cached search result,
        // otherwise every search after the first answers with the first.
        http.get_text(HOME_URL)?;
        http.polite_delay();
        http.get_text(SEARCH_URL)?;
        http.polite_delay();
        http.post_form_with_query(SEARCH_URL, SEARCH_PARAMS, &search_form(postal_code, radius))
    }

    fn stores_from_search_page(&self, html: &str) -> Vec<StoreRecord> {
        let document = Html::parse_document(html);
        let rows = Selector::parse("tr.initial").unwrap();
        document
            .select(&rows)
            .filter_map(|row| self.extract_store_row(&row))
            .collect()
    }

    fn extract_store_row(&self, row: &ElementRef) -> Option<StoreRecord> {
        let cell_selector = Selector::parse("td").unwrap();
        let mut cells = row.select(&cell_selector);
        let first_cell = cells.next()?;

        let mut store = StoreRecord::new();

        let name_selector = Selector::parse("div.color-prim").unwrap();
        if let Some(name) = first_cell.select(&name_selector).next() {
            put(&mut store, "name", &name.text().collect::<Vec<_>>().join(" "));
        }

        let details_selector = Selector::parse("div.details").unwrap();
        if let Some(details) = first_cell.select(&details_selector).next() {
            let company_selector = Selector::parse("span.small").unwrap();
            if let Some(company) = details.select(&company_selector).next() {
                put(
                    &mut store,
                    "company",
                    &company.text().collect::<Vec<_>>().join(" "),
                );
            }

            let text = details.text().collect::<Vec<_>>().join("\n");
            let numbers: Vec<&str> = self.phone_regex.find_iter(&text).map(|m| m.as_str()).collect();
            if let Some(phone) = numbers.first() {
                put(&mut store, "phone", phone);
            }
            if text.to_lowercase().contains("fax") && numbers.len() > 1 {
                put(&mut store, "fax", numbers[1]);
            }
        }

        // Second cell is the address, up to the routing link.
        if let Some(second_cell) = cells.next() {
            let mut address = String::new();
            for child in second_cell.children() {
                match child.value() {
                    Node::Element(el) if el.name() == "a" => break,
                    Node::Text(text) => address.push_str(text.trim()),
                    _ => {}
                }
            }
            if !address.is_empty() {
                put(&mut store, "address", &address);
                if let Some(caps) = self.address_regex.captures(address.trim()) {
                    put(&mut store, "postal_code", caps.get(1).map_or("", |m| m.as_str()));
                    put(&mut store, "city", caps.get(2).map_or("", |m| m.as_str()));
                    put(&mut store, "street", caps.get(3).map_or("", |m| m.as_str()));
                }
            }
        }

        if store.get("name").map_or(false, |n| !n.is_empty()) {
            Some(store)
        } else {
            None
        }
    }

    /// Append stores not seen under an earlier postal code. Searches overlap
    /// at their radius edges, so the same store shows up more than once.
    fn merge_new_stores(
        all_stores: &mut Vec<StoreRecord>,
        seen: &mut BTreeSet<String>,
        found: Vec<StoreRecord>,
    ) -> usize {
        let mut added = 0;
        for store in found {
            let key = format!(
                "{}-{}",
                store.get("name").map(String::as_str).unwrap_or(""),
                store.get("address").map(String::as_str).unwrap_or("")
            );
            if seen.insert(key) {
                all_stores.push(store);
                added += 1;
            }
        }
        added
    }
}

impl StoreScraper for FinnernScraper {
    fn website_key(&self) -> &str {
        "finnern"
    }

    fn fetch_stores(
        &mut self,
        http: &HttpSession,
        session: &mut ScrapeSession,
    ) -> Result<Vec<StoreRecord>, Box<dyn Error>> {
        info!("Starting Finnern store scraping via retailer search API");

        if let Err(e) = http.get_text(session.website_url()) {
            warn!("Failed to initialize session: {}", e);
        }
        http.polite_delay();

        info!(
            "Sweeping {} postal codes across all German postal regions",
            POSTAL_CODE_SEARCHES.len()
        );

        let mut all_stores = Vec::new();
        let mut seen: BTreeSet<String> = BTreeSet::new();
        for (i, (postal_code, radius)) in POSTAL_CODE_SEARCHES.iter().enumerate() {
            info!(
                "Searching postal code {} with {}km radius ({}/{})",
                postal_code,
                radius,
                i + 1,
                POSTAL_CODE_SEARCHES.len()
            );

            let page = match self.search_with_session_reset(http, postal_code, radius) {
                Ok(page) => page,
                Err(e) => {
                    session.log_error(
                        format!("Search for postal code {} failed: {}", postal_code, e),
                        None,
                    );
                    continue;
                }
            };

            let found = self.stores_from_search_page(&page);
            let added = Self::merge_new_stores(&mut all_stores, &mut seen, found);
            info!(
                "PLZ {}: {} new unique stores (total: {})",
                postal_code,
                added,
                all_stores.len()
            );

            if i + 1 < POSTAL_CODE_SEARCHES.len() {
                http.polite_delay();
            }
        }

        info!("Total unique stores found: {}", all_stores.len());
        Ok(all_stores)
    }

    fn standardize(&self, raw: StoreRecord) -> StoreRecord {
        let get = |key: &str| raw.get(key).cloned().unwrap_or_default();

        let mut store: StoreRecord = raw
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| (key.clone(), value.trim().to_string()))
            .collect();

        put(&mut store, "std_name", &get("name"));
        put(&mut store, "std_company", &get("company"));
        put(&mut store, "std_phone", &get("phone"));
        put(&mut store, "std_fax", &get("fax"));
        put(&mut store, "std_street", &get("street"));
        put(&mut store, "std_city", &get("city"));
        put(&mut store, "std_postal_code", &get("postal_code"));
        put(&mut store, "std_country", "Germany");
        put(&mut store, "std_full_address", &get("address"));
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULT_PAGE: &str = r##"
        <table><tbody>
            <tr class="initial">
                <td>
                    <div class="color-prim">Zoo Quelle</div>
                    <div class="details">
                        <span class="small">Zoo Quelle GmbH</span>
                        Tel: +49 (30) 123 456
                        Fax: +49 (30) 123 457
                    </div>
                </td>
                <td>12169 Berlin / Steglitzer Damm 29<a href="#">Route</a></td>
            </tr>
            <tr class="initial">
                <td><div class="details">kein Name</div></td>
            </tr>
        </tbody></table>
    "##;

    #[test]
    fn result_rows_yield_name_contact_and_split_address() {
        let scraper = FinnernScraper::new();
        let stores = scraper.stores_from_search_page(RESULT_PAGE);

        assert_eq!(stores.len(), 1);
        let store = &stores[0];
        assert_eq!(store.get("name").unwrap(), "Zoo Quelle");
        assert_eq!(store.get("company").unwrap(), "Zoo Quelle GmbH");
        assert_eq!(store.get("phone").unwrap(), "+49 (30) 123 456");
        assert_eq!(store.get("fax").unwrap(), "+49 (30) 123 457");
        assert_eq!(store.get("address").unwrap(), "12169 Berlin / Steglitzer Damm 29");
        assert_eq!(store.get("postal_code").unwrap(), "12169");
        assert_eq!(store.get("city").unwrap(), "Berlin");
        assert_eq!(store.get("street").unwrap(), "Steglitzer Damm 29");
    }

    #[test]
    fn overlapping_searches_do_not_duplicate_stores() {
        let record = |name: &str, address: &str| {
            let mut store = StoreRecord::new();
            put(&mut store, "name", name);
            put(&mut store, "address", address);
            store
        };

        let mut all_stores = Vec::new();
        let mut seen = BTreeSet::new();

        let first = vec![
            record("Zoo Quelle", "12169 Berlin / Steglitzer Damm 29"),
            record("Futterboden", "10115 Berlin / Invalidenstr. 3"),
        ];
        assert_eq!(
            FinnernScraper::merge_new_stores(&mut all_stores, &mut seen, first),
            2
        );

        let second = vec![
            record("Zoo Quelle", "12169 Berlin / Steglitzer Damm 29"),
            record("Zoo Sued", "81541 Muenchen / Tegernseer Landstr. 2"),
        ];
        assert_eq!(
            FinnernScraper::merge_new_stores(&mut all_stores, &mut seen, second),
            1
        );
        assert_eq!(all_stores.len(), 3);
    }

    #[test]
    fn standardize_adds_std_fields_and_fixed_country() {
        let scraper = FinnernScraper::new();
        let raw: StoreRecord = [
            ("name", "Zoo Quelle"),
            ("address", "12169 Berlin / Steglitzer Damm 29"),
            ("street", "Steglitzer Damm 29"),
            ("city", "Berlin"),
            ("postal_code", "12169"),
            ("fax", ""),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let store = scraper.standardize(raw);
        assert_eq!(store.get("std_name").unwrap(), "Zoo Quelle");
        assert_eq!(store.get("std_country").unwrap(), "Germany");
        assert_eq!(store.get("std_full_address").unwrap(), "12169 Berlin / Steglitzer Damm 29");
        assert_eq!(store.get("std_city").unwrap(), "Berlin");
        // Empty raw fields are dropped, but every std_ column stays.
        assert!(!store.contains_key("fax"));
        assert_eq!(store.get("std_fax").unwrap(), "");
    }
}
