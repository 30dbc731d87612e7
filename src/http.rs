use std::error::Error;
use std::fmt::Display;
use std::thread;
use std::time::Duration;

use log::warn;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, USER_AGENT};

use crate::config::ScrapingSettings;

/// Attempts per outbound request, including the first.
const MAX_ATTEMPTS: u32 = 3;

/// One vendor's HTTP session: a cookie-carrying blocking client, created at
/// the start of `run()` and released when it goes out of scope on any exit
/// path. Every request is retried with exponential backoff before its
/// failure surfaces to the caller.
pub struct HttpSession {
    client: Client,
    delay_secs: u64,
}

impl HttpSession {
    pub fn new(settings: &ScrapingSettings) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("de-DE,de;q=0.9,en;q=0.8"),
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .default_headers(headers)
            .cookie_store(true)
            .build()?;

        Ok(HttpSession {
            client,
            delay_secs: settings.delay_between_requests_secs,
        })
    }

    /// Sleep the configured polite delay before the next request.
    pub fn polite_delay(&self) {
        crate::delay::between_requests(self.delay_secs);
    }

    fn random_user_agent() -> &'static str {
        let uas = [
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
            "Mozilla/5.0 (Linux; Android 6.0; Nexus 5 Build/MRA58N) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Mobile Safari/537.36",
        ];
        use rand::Rng;
        let mut rng = rand::thread_rng();
        uas[rng.gen_range(0..uas.len())]
    }

    pub fn get_text(&self, url: &str) -> Result<String, reqwest::Error> {
        with_retry(url, thread::sleep, || {
            let resp = self
                .client
                .get(url)
                .header(USER_AGENT, Self::random_user_agent())
                .send()?;
            resp.error_for_status()?.text()
        })
    }

    pub fn get_text_with_query(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<String, reqwest::Error> {
        with_retry(url, thread::sleep, || {
            let resp = self
                .client
                .get(url)
                .query(params)
                .header(USER_AGENT, Self::random_user_agent())
                .send()?;
            resp.error_for_status()?.text()
        })
    }

    pub fn get_json(&self, url: &str) -> Result<serde_json::Value, Box<dyn Error>> {
        let body = self.get_text(url)?;
        Ok(serde_json::from_str(&body)?)
    }

    pub fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<String, reqwest::Error> {
        with_retry(url, thread::sleep, || {
            let resp = self
                .client
                .post(url)
                .form(form)
                .header(USER_AGENT, Self::random_user_agent())
                .send()?;
            resp.error_for_status()?.text()
        })
    }

    pub fn post_form_with_query(
        &self,
        url: &str,
        params: &[(&str, &str)],
        form: &[(&str, &str)],
    ) -> Result<String, reqwest::Error> {
        with_retry(url, thread::sleep, || {
            let resp = self
                .client
                .post(url)
                .query(params)
                .form(form)
                .header(USER_AGENT, Self::random_user_agent())
                .send()?;
            resp.error_for_status()?.text()
        })
    }
}

/// Run `op` up to `MAX_ATTEMPTS` times, sleeping between failures. The last
/// error is returned as-is; callers decide whether it aborts their step.
pub(crate) fn with_retry<T, E, F>(label: &str, sleep: impl Fn(Duration), mut op: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Result<T, E>,
{
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if attempt < MAX_ATTEMPTS => {
                let wait = backoff_delay(attempt);
                warn!(
                    "Request failed for {} (attempt {}/{}): {}. Retrying in {}s...",
                    label,
                    attempt,
                    MAX_ATTEMPTS,
                    e,
                    wait.as_secs()
                );
                sleep(wait);
                attempt += 1;
            }
            Err(e) => {
                warn!("Request failed for {} after {} attempts: {}", label, MAX_ATTEMPTS, e);
                return Err(e);
            }
        }
    }
}

/// Exponential backoff after the n-th failed attempt: 4s, then 8s, capped
/// at 10s.
fn backoff_delay(failed_attempts: u32) -> Duration {
    Duration::from_secs((1u64 << (failed_attempts + 1)).clamp(4, 10))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn failing_request_is_attempted_exactly_three_times() {
        let calls = Cell::new(0u32);
        let result: Result<(), String> = with_retry(
            "http://example.invalid",
            |_| {},
            || {
                calls.set(calls.get() + 1);
                Err("timed out".to_string())
            },
        );
        assert!(result.is_err());
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn success_on_second_attempt_stops_retrying() {
        let calls = Cell::new(0u32);
        let result: Result<u32, String> = with_retry(
            "http://example.invalid",
            |_| {},
            || {
                calls.set(calls.get() + 1);
                if calls.get() < 2 {
                    Err("reset by peer".to_string())
                } else {
                    Ok(7)
                }
            },
        );
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn backoff_starts_at_four_seconds_and_caps_at_ten() {
        assert_eq!(backoff_delay(1), Duration::from_secs(4));
        assert_eq!(backoff_delay(2), Duration::from_secs(8));
        assert_eq!(backoff_delay(3), Duration::from_secs(10));
        assert_eq!(backoff_delay(6), Duration::from_secs(10));
    }
}
