use std::thread;
use std::time::Duration;

use log::debug;
use rand::Rng;

/// Polite pause between requests to the same site: the configured base
/// delay plus up to a second of jitter. Rate limiting only, not
/// synchronization.
pub fn between_requests(base_secs: u64) {
    let mut rng = rand::thread_rng();
    let jitter_ms: u64 = rng.gen_range(0..=1000);
    let wait = Duration::from_millis(base_secs * 1000 + jitter_ms);
    debug!("Waiting {:?} between requests...", wait);
    thread::sleep(wait);
}
