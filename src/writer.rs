use std::collections::BTreeSet;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::{info, warn};

use crate::record::StoreRecord;

/// Write the session's records to one CSV file under `output_dir`.
///
/// The column set is the union of every key present in any record, sorted
/// lexicographically, so vendors with disjoint field sets land in one
/// rectangular table. Missing fields become empty cells. An empty record
/// list is a normal outcome: nothing is written and `None` is returned.
pub fn save_records(
    records: &[StoreRecord],
    output_dir: &Path,
    website_key: &str,
    filename: Option<&str>,
) -> Result<Option<PathBuf>, Box<dyn Error>> {
    if records.is_empty() {
        warn!("No data to save");
        return Ok(None);
    }

    fs::create_dir_all(output_dir)?;

    let filename = match filename {
        Some(name) => name.to_string(),
        None => format!(
            "{}_{}.csv",
            website_key,
            Local::now().format("%Y%m%d_%H%M%S")
        ),
    };
    let filepath = output_dir.join(filename);

    let mut columns: BTreeSet<&str> = BTreeSet::new();
    for record in records {
        for key in record.keys() {
            columns.insert(key.as_str());
        }
    }

    let mut wtr = csv::Writer::from_path(&filepath)?;
    wtr.write_record(&columns)?;
    for record in records {
        wtr.write_record(
            columns
                .iter()
                .map(|col| record.get(*col).map(String::as_str).unwrap_or("")),
        )?;
    }
    wtr.flush()?;

    info!("Saved {} records to {}", records.len(), filepath.display());
    Ok(Some(filepath))
}
