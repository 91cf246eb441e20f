//! Shared HTTP Client Module
//!
//! A single lazily built client for renamer calls, so connections and TLS sessions
//! are reused across files.

use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

/// Global HTTP client for Anthropic API calls
///
/// Rename requests are short; a 15s timeout keeps a stuck call from holding a worker.
pub static ANTHROPIC_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(15))
        .connect_timeout(Duration::from_secs(5))
        .pool_max_idle_per_host(8)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_nodelay(true)
        .build()
        .expect("Failed to create Anthropic HTTP client")
});

/// Get the global Anthropic HTTP client
#[inline]
pub fn anthropic_client() -> &'static Client {
    &ANTHROPIC_CLIENT
}
