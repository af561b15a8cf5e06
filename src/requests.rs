use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Client, ClientBuilder, Response,
    header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, REFERER},
};

use crate::error::FetchError;

/// A desktop browser UA; the catalog serves bare clients a stripped page.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Fetches one course-detail page body.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(
        &self,
        url: &str,
        referer: &str,
        timeout: Duration,
    ) -> Result<String, FetchError>;
}

pub struct RequestClient {
    client: Client,
}

impl RequestClient {
    pub fn new() -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        let client = ClientBuilder::new()
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .build()?;
        Ok(Self { client })
    }

    pub async fn fetch_url_response(
        &self,
        url: &str,
        referer: &str,
        timeout: Duration,
    ) -> Result<Response, FetchError> {
        let response = self
            .client
            .get(url)
            .header(REFERER, referer)
            .timeout(timeout)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(response)
    }

    pub async fn fetch_url_body(
        &self,
        url: &str,
        referer: &str,
        timeout: Duration,
    ) -> Result<String, FetchError> {
        let response = self.fetch_url_response(url, referer, timeout).await?;
        let body = response.text().await?;
        Ok(body)
    }
}

#[async_trait]
impl PageFetcher for RequestClient {
    async fn fetch_page(
        &self,
        url: &str,
        referer: &str,
        timeout: Duration,
    ) -> Result<String, FetchError> {
        self.fetch_url_body(url, referer, timeout).await
    }
}
