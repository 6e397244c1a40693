use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub origin: OriginConfig,

    #[serde(default)]
    pub locator: LocatorConfig,

    #[serde(default)]
    pub reader: ReaderConfig,

    #[serde(default)]
    pub intercept: InterceptConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OriginConfig {
    /// Origin that proxied requests are forwarded to, e.g.
    /// `https://s3.us-west-004.backblazeb2.com/my-bucket`
    #[serde(default)]
    pub base_url: Option<String>,

    /// Request header that enables live reads on the origin
    #[serde(default = "default_capability_header")]
    pub capability_header: String,

    /// Response header carrying the part size of a live object
    #[serde(default = "default_part_size_header")]
    pub part_size_header: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_capability_header() -> String {
    "x-backblaze-live-read-enabled".to_string()
}
fn default_part_size_header() -> String {
    "x-backblaze-live-read-part-size".to_string()
}
fn default_request_timeout() -> u64 {
    30
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            capability_header: default_capability_header(),
            part_size_header: default_part_size_header(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl OriginConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocatorConfig {
    /// Largest object size the part search will consider (default: 5 GiB)
    #[serde(default = "default_upper_bound")]
    pub upper_bound_bytes: u64,

    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

fn default_upper_bound() -> u64 {
    5 * 1024 * 1024 * 1024
}
fn default_cache_max_entries() -> usize {
    100
}
fn default_cache_ttl() -> u64 {
    3600
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            upper_bound_bytes: default_upper_bound(),
            cache_max_entries: default_cache_max_entries(),
            cache_ttl_secs: default_cache_ttl(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReaderConfig {
    /// Delay between attempts to fetch a part that is not there yet
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Give up after this many attempts per part (default: never)
    #[serde(default)]
    pub max_fetch_attempts: Option<u32>,

    /// How many parts behind the last discovered part a live stream starts
    #[serde(default = "default_safety_margin")]
    pub safety_margin_parts: u64,
}

fn default_retry_delay() -> u64 {
    1000
}
fn default_safety_margin() -> u64 {
    1
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: default_retry_delay(),
            max_fetch_attempts: None,
            safety_margin_parts: default_safety_margin(),
        }
    }
}

impl ReaderConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InterceptConfig {
    /// Path extensions treated as live video in addition to
    /// `Sec-Fetch-Dest: video` requests
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

fn default_extensions() -> Vec<String> {
    vec!["mp4".to_string(), "m4v".to_string()]
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
        }
    }
}
