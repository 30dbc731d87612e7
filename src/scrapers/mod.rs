//! One module per vendor website. Each is a one-off reverse-engineering
//! exercise against that site's retrieval surface; nothing here is meant to
//! generalize beyond its own vendor.

mod belcando;
mod bosch;
mod bozita;
mod finnern;
mod josera;
mod wolfsblut;

pub use belcando::BelcandoScraper;
pub use bosch::BoschScraper;
pub use bozita::BozitaScraper;
pub use finnern::FinnernScraper;
pub use josera::JoseraScraper;
pub use wolfsblut::WolfsblutScraper;

use serde_json::Value;

use crate::record::StoreRecord;
use crate::runner::StoreScraper;

/// Vendor keys with an implemented scraper, in registry order.
pub const AVAILABLE: &[&str] = &["belcando", "bosch", "bozita", "finnern", "josera", "wolfsblut"];

pub fn make_scraper(key: &str) -> Option<Box<dyn StoreScraper>> {
    match key {
        "belcando" => Some(Box::new(BelcandoScraper::new())),
        "bosch" => Some(Box::new(BoschScraper::new())),
        "bozita" => Some(Box::new(BozitaScraper::new())),
        "finnern" => Some(Box::new(FinnernScraper::new())),
        "josera" => Some(Box::new(JoseraScraper::new())),
        "wolfsblut" => Some(Box::new(WolfsblutScraper::new())),
        _ => None,
    }
}

/// Render a JSON value the way it should land in a CSV cell.
pub(crate) fn json_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Flatten one JSON object into a raw store record.
pub(crate) fn record_from_object(obj: &serde_json::Map<String, Value>) -> StoreRecord {
    let mut record = StoreRecord::new();
    for (key, value) in obj {
        if key.is_empty() {
            continue;
        }
        record.insert(key.clone(), json_text(value));
    }
    record
}

pub(crate) fn records_from_list(list: &[Value]) -> Vec<StoreRecord> {
    list.iter()
        .filter_map(Value::as_object)
        .map(record_from_object)
        .collect()
}
