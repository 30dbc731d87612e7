pub mod config;
pub mod delay;
pub mod http;
pub mod logger;
pub mod record;
pub mod runner;
pub mod scrapers;
pub mod session;
pub mod writer;

// Exporting types for convenience
pub use config::{Config, WebsiteConfig};
pub use record::{ErrorRecord, StoreRecord};
pub use runner::{run, RunResult, StoreScraper};
pub use session::ScrapeSession;
