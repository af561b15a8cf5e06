use std::{collections::HashSet, path::PathBuf, time::Duration};

use anyhow::Context;
use serde::{Deserialize, de::DeserializeOwned};
use url::Url;

use crate::{limiter::DEFAULT_CONCURRENCY, retry::DEFAULT_MAX_RETRIES};

pub const DEFAULT_CATALOG_BASE_URL: &str = "https://catalog.stonybrook.edu";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 60_000;
/// Subjects scraped when the caller doesn't name any. Requisites are only
/// trusted for these.
pub const REQUIRED_SUBJECTS: [&str; 6] = ["CSE", "AMS", "MAT", "ISE", "PHY", "WRT"];

/// Marker every course-detail href on an index page carries.
pub const COURSE_PREVIEW_MARKER: &str = "preview_course_nopop.php";

/// The env config env vars needed for scraping.
#[derive(Debug, Deserialize)]
pub struct ScrapingEnv {
    #[serde(default = "default_base_url")]
    catalog_base_url: String,
    #[serde(default = "default_catalog_oid")]
    catalog_oid: u32,
    #[serde(default = "default_catalog_navoid")]
    catalog_navoid: u32,
    #[serde(default = "default_concurrency")]
    scrape_concurrency: usize,
    #[serde(default = "default_request_timeout_ms")]
    scrape_request_timeout_ms: u64,
    #[serde(default = "default_navigation_timeout_ms")]
    scrape_navigation_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    scrape_max_retries: u32,
    chrome_executable: Option<PathBuf>,
    #[serde(default = "default_headless")]
    browser_headless: bool,
}

fn default_base_url() -> String {
    DEFAULT_CATALOG_BASE_URL.to_string()
}
fn default_catalog_oid() -> u32 {
    7
}
fn default_catalog_navoid() -> u32 {
    220
}
fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}
fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}
fn default_navigation_timeout_ms() -> u64 {
    DEFAULT_NAVIGATION_TIMEOUT_MS
}
fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_headless() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub executable: Option<PathBuf>,
    pub headless: bool,
}

#[derive(Debug, Clone)]
pub struct ScrapingConfig {
    pub catalog_base_url: Url,
    pub catalog_oid: u32,
    pub catalog_navoid: u32,
    pub concurrency: usize,
    pub request_timeout: Duration,
    pub navigation_timeout: Duration,
    pub max_retries: u32,
    pub required_subjects: Vec<String>,
    pub browser: BrowserConfig,
}

impl ScrapingConfig {
    pub fn new() -> anyhow::Result<Self> {
        let scraping_env = ScrapingEnv::load_from_env()?;
        Self::from_env(scraping_env)
    }

    fn from_env(env: ScrapingEnv) -> anyhow::Result<Self> {
        let catalog_base_url = Url::parse(&env.catalog_base_url)
            .with_context(|| format!("invalid CATALOG_BASE_URL: {}", env.catalog_base_url))?;
        Ok(Self {
            catalog_oid: env.catalog_oid,
            catalog_navoid: env.catalog_navoid,
            concurrency: env.scrape_concurrency.max(1),
            request_timeout: Duration::from_millis(env.scrape_request_timeout_ms),
            navigation_timeout: Duration::from_millis(env.scrape_navigation_timeout_ms),
            max_retries: env.scrape_max_retries,
            browser: BrowserConfig {
                executable: env.chrome_executable,
                headless: env.browser_headless,
            },
            ..Self::for_catalog(catalog_base_url)
        })
    }

    /// Default settings pointed at `catalog_base_url`.
    pub fn for_catalog(catalog_base_url: Url) -> Self {
        Self {
            catalog_base_url,
            catalog_oid: default_catalog_oid(),
            catalog_navoid: default_catalog_navoid(),
            concurrency: DEFAULT_CONCURRENCY,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            navigation_timeout: Duration::from_millis(DEFAULT_NAVIGATION_TIMEOUT_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            required_subjects: REQUIRED_SUBJECTS.iter().map(|s| s.to_string()).collect(),
            browser: BrowserConfig {
                executable: None,
                headless: true,
            },
        }
    }

    /// The course-filter index page listing every course of `subject`.
    pub fn get_index_url_for_subject(&self, subject: &str) -> String {
        let mut url = self.catalog_base_url.clone();
        url.set_path("/content.php");
        url.query_pairs_mut()
            .clear()
            .append_pair("filter[27]", subject)
            .append_pair("filter[29]", "")
            .append_pair("filter[course_type]", "-1")
            .append_pair("filter[keyword]", "")
            .append_pair("filter[32]", "1")
            .append_pair("filter[cpage]", "1")
            .append_pair("cur_cat_oid", &self.catalog_oid.to_string())
            .append_pair("expand", "")
            .append_pair("navoid", &self.catalog_navoid.to_string())
            .append_pair("search_database", "Filter");
        url.set_fragment(Some("acalog_template_course_filter"));
        url.to_string()
    }

    pub fn supported_subjects(&self) -> HashSet<String> {
        self.required_subjects.iter().cloned().collect()
    }
}

// Extension trait.
pub trait LoadFromEnv: DeserializeOwned {
    fn load_from_env() -> anyhow::Result<Self> {
        // Don't throw an error if .env file doesn't exist.
        let _ = dotenv::dotenv();
        let config =
            envy::from_env::<Self>().context("failed to load env variables into config struct")?;
        Ok(config)
    }
}

impl<T: DeserializeOwned> LoadFromEnv for T {}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_config() -> ScrapingConfig {
        let env: ScrapingEnv = serde_json::from_str("{}").unwrap();
        ScrapingConfig::from_env(env).unwrap()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = default_config();
        assert_eq!(config.concurrency, 30);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.navigation_timeout, Duration::from_secs(60));
        assert_eq!(config.required_subjects.len(), 6);
        assert!(config.browser.headless);
    }

    #[test]
    fn index_url_embeds_subject() {
        let config = default_config();
        let url = config.get_index_url_for_subject("CSE");
        assert!(url.starts_with("https://catalog.stonybrook.edu/content.php?"));
        assert!(url.contains("filter%5B27%5D=CSE"));
        assert!(url.ends_with("#acalog_template_course_filter"));
    }

    #[test]
    fn rejects_bad_base_url() {
        let env: ScrapingEnv =
            serde_json::from_str(r#"{"catalog_base_url": "not a url"}"#).unwrap();
        assert!(ScrapingConfig::from_env(env).is_err());
    }
}
