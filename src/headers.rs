//! Per-request browser-like header sets.
//!
//! Each call draws a fresh combination, so requests within a burst do not
//! all carry the same signature.

use rand::Rng;
use rand::seq::IndexedRandom;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

const ACCEPT_LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9",
    "en-GB,en;q=0.9,en-US;q=0.8",
    "en-US,en;q=0.9,es;q=0.8",
];

const PLATFORMS: &[&str] = &["\"Windows\"", "\"macOS\"", "\"Linux\""];

/// Build one randomized header set for a request to `origin`.
pub fn random_headers<R: Rng + ?Sized>(rng: &mut R, origin: &str) -> HeaderMap {
    let user_agent = USER_AGENTS.choose(rng).copied().unwrap_or(USER_AGENTS[0]);
    let language = ACCEPT_LANGUAGES
        .choose(rng)
        .copied()
        .unwrap_or(ACCEPT_LANGUAGES[0]);
    let platform = PLATFORMS.choose(rng).copied().unwrap_or(PLATFORMS[0]);
    let chromium = rng.random_range(118..=122);
    let referer = format!("{}/", origin.trim_end_matches('/'));

    let mut headers = HeaderMap::new();
    let mut put = |name: &'static str, value: &str| {
        // Values come from the static pools or the validated origin URL.
        if let Ok(v) = HeaderValue::from_str(value) {
            headers.insert(HeaderName::from_static(name), v);
        }
    };
    put("accept", "*/*");
    put("accept-language", language);
    put("cache-control", "no-cache");
    put("pragma", "no-cache");
    put("origin", origin.trim_end_matches('/'));
    put("referer", &referer);
    put("user-agent", user_agent);
    put(
        "sec-ch-ua",
        &format!("\"Chromium\";v=\"{chromium}\", \"Not_A Brand\";v=\"8\""),
    );
    put("sec-ch-ua-mobile", "?0");
    put("sec-ch-ua-platform", platform);
    put("sec-fetch-dest", "empty");
    put("sec-fetch-mode", "cors");
    put("sec-fetch-site", "same-origin");
    headers
}
