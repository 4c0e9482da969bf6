use crate::error::{AppError, Result};

pub const STOREFRONT_SEARCH_URL: &str = "https://www.tcgplayer.com/search/magic/";
pub const STOREFRONT_REFERER: &str = "https://www.tcgplayer.com/";
pub const PRICE_HISTORY_API_URL: &str = "https://infinite-api.tcgplayer.com";

/// Container the storefront renders once search results have loaded.
pub const RESULTS_SELECTOR: &str = ".search-results";

/// Aggregate bound for navigation plus the results wait.
pub const LISTING_TIMEOUT_MS: u64 = 15_000;

/// How often the results container is checked while waiting.
pub const SELECTOR_POLL_INTERVAL_MS: u64 = 250;

/// Upper bound on a single price-history call.
pub const PRICE_HISTORY_TIMEOUT_SECS: u64 = 10;

/// Characters of page text logged when the results never appear.
pub const DIAGNOSTIC_SNIPPET_CHARS: usize = 200;

/// Extra time allowed to read the diagnostic snippet once the deadline has passed.
pub const DIAGNOSTIC_TIMEOUT_MS: u64 = 1_000;

/// How long a closed browser gets to exit before its process is killed.
pub const BROWSER_EXIT_TIMEOUT_MS: u64 = 5_000;

pub const DEFAULT_API_PORT: u16 = 3000;

/// Fixed query parameters selecting sealed Magic products on the search page.
pub const SEARCH_QUERY_PARAMS: &[(&str, &str)] = &[
    ("productLineName", "magic"),
    ("page", "1"),
    ("view", "grid"),
    ("ProductTypeName", "Sealed Products"),
];

/// Desktop browser identity presented to the storefront and the price API.
pub mod identity {
    pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

    pub const NAVIGATION_HEADERS: &[(&str, &str)] = &[
        ("Accept-Language", "en-US,en;q=0.9"),
        ("Accept-Encoding", "gzip, deflate, br"),
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
        ("Upgrade-Insecure-Requests", "1"),
        ("Sec-Fetch-Dest", "document"),
        ("Sec-Fetch-Mode", "navigate"),
        ("Sec-Fetch-Site", "none"),
        ("Sec-Fetch-User", "?1"),
    ];

    pub const VIEWPORT_WIDTH: u32 = 1920;
    pub const VIEWPORT_HEIGHT: u32 = 1080;

    pub const LAUNCH_ARGS: &[&str] = &[
        "--disable-setuid-sandbox",
        "--disable-dev-shm-usage",
    ];
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub api_port: u16,
    pub storefront_search_url: String,
    pub price_history_api_url: String,
    /// Browser binary (CHROME_EXECUTABLE). Auto-detected when unset.
    pub chrome_executable: Option<String>,
    /// Navigation + results wait bound in ms (LISTING_TIMEOUT_MS)
    pub listing_timeout_ms: u64,
    /// Price-history request bound in seconds (PRICE_HISTORY_TIMEOUT_SECS)
    pub price_history_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| DEFAULT_API_PORT.to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            storefront_search_url: std::env::var("STOREFRONT_SEARCH_URL")
                .unwrap_or_else(|_| STOREFRONT_SEARCH_URL.to_string()),
            price_history_api_url: std::env::var("PRICE_HISTORY_API_URL")
                .unwrap_or_else(|_| PRICE_HISTORY_API_URL.to_string()),
            chrome_executable: std::env::var("CHROME_EXECUTABLE")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            listing_timeout_ms: std::env::var("LISTING_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(LISTING_TIMEOUT_MS),
            price_history_timeout_secs: std::env::var("PRICE_HISTORY_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(PRICE_HISTORY_TIMEOUT_SECS),
        })
    }
}
