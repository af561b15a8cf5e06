use std::sync::Arc;

use crate::{
    browser::{BrowserLauncher, ChromiumLauncher},
    config::ScrapingConfig,
    requests::{PageFetcher, RequestClient},
};

pub struct ScrapingContext {
    pub scraping_config: ScrapingConfig,
    pub browser_launcher: Arc<dyn BrowserLauncher>,
    pub page_fetcher: Arc<dyn PageFetcher>,
}

impl ScrapingContext {
    /// Env-configured context backed by Chromium and reqwest.
    pub fn new() -> anyhow::Result<Self> {
        let scraping_config = ScrapingConfig::new()?;
        let browser_launcher = Arc::new(ChromiumLauncher::new(scraping_config.browser.clone()));
        let page_fetcher = Arc::new(RequestClient::new()?);
        Ok(ScrapingContext {
            scraping_config,
            browser_launcher,
            page_fetcher,
        })
    }

    pub fn with_parts(
        scraping_config: ScrapingConfig,
        browser_launcher: Arc<dyn BrowserLauncher>,
        page_fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        ScrapingContext {
            scraping_config,
            browser_launcher,
            page_fetcher,
        }
    }
}
