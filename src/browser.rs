//! Headless Chromium over CDP, used for subject index pages. Detail pages go
//! through [`crate::requests`] instead.

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chromiumoxide::{
    Page,
    browser::{Browser, BrowserConfig as CdpConfig},
};
use futures::StreamExt;
use log::{debug, warn};
use tokio::task::JoinHandle;

use crate::config::BrowserConfig;

/// Starts a browser session. One launch per scrape run.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> anyhow::Result<Box<dyn BrowserSession>>;
}

/// A running browser, shared read-only by subject pipelines to open pages.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn new_page(&self) -> anyhow::Result<Box<dyn PageContext>>;
    async fn close(self: Box<Self>) -> anyhow::Result<()>;
}

/// A single tab. Whoever opens it closes it.
#[async_trait]
pub trait PageContext: Send {
    async fn goto(&mut self, url: &str) -> anyhow::Result<()>;
    async fn content(&mut self) -> anyhow::Result<String>;
    async fn close(self: Box<Self>) -> anyhow::Result<()>;
}

pub struct ChromiumLauncher {
    config: BrowserConfig,
}

impl ChromiumLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }

    fn cdp_config(&self) -> anyhow::Result<CdpConfig> {
        let mut builder = CdpConfig::builder()
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage");
        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &self.config.executable {
            builder = builder.chrome_executable(executable);
        }
        builder.build().map_err(|e| anyhow!(e))
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> anyhow::Result<Box<dyn BrowserSession>> {
        let (browser, mut handler) = Browser::launch(self.cdp_config()?)
            .await
            .context("chromium failed to start")?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler stopped: {e}");
                    break;
                }
            }
        });
        Ok(Box::new(ChromiumSession {
            browser,
            handler_task,
        }))
    }
}

struct ChromiumSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn new_page(&self) -> anyhow::Result<Box<dyn PageContext>> {
        let page = self.browser.new_page("about:blank").await?;
        page.enable_stealth_mode().await?;
        Ok(Box::new(ChromiumPage { page }))
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        let ChromiumSession {
            mut browser,
            handler_task,
        } = *self;
        let closed = browser.close().await;
        if let Err(e) = browser.wait().await {
            warn!("browser process did not exit cleanly: {e}");
        }
        handler_task.abort();
        closed.context("failed to close browser")?;
        Ok(())
    }
}

struct ChromiumPage {
    page: Page,
}

#[async_trait]
impl PageContext for ChromiumPage {
    async fn goto(&mut self, url: &str) -> anyhow::Result<()> {
        self.page.goto(url).await?;
        Ok(())
    }

    async fn content(&mut self) -> anyhow::Result<String> {
        Ok(self.page.content().await?)
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        self.page.close().await?;
        Ok(())
    }
}
