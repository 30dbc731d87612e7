use std::collections::BTreeMap;

use serde::Serialize;

/// One located store. Field sets vary by vendor and even between records
/// from the same vendor, so this is an ordered name -> value mapping rather
/// than a fixed struct.
pub type StoreRecord = BTreeMap<String, String>;

/// Metadata fields stamped onto every record when it enters a session.
pub const SCRAPED_AT: &str = "scraped_at";
pub const SOURCE_WEBSITE: &str = "source_website";
pub const SOURCE_URL: &str = "source_url";

/// Diagnostic entry for a problem hit while scraping. Appending one never
/// aborts the session by itself.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub timestamp: String,
    pub website: String,
    pub error: String,
    pub store: Option<StoreRecord>,
}

/// Insert a trimmed value under `key`.
pub fn put(record: &mut StoreRecord, key: &str, value: &str) {
    record.insert(key.to_string(), value.trim().to_string());
}
