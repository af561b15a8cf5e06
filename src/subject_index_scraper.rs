use std::{collections::HashSet, sync::LazyLock, time::Duration};

use log::{debug, info, warn};
use regex::Regex;
use scraper::{Html, Selector};

use crate::{
    browser::BrowserSession,
    config::COURSE_PREVIEW_MARKER,
    error::ScrapeError,
    models::CourseLink,
    text_manipulators::{extract_text, normalize_whitespace},
};

static ANCHOR_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static COURSE_LINK_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{2,4}\s*\d+").unwrap());

/// Resolves the course-detail links listed on one subject's index page.
#[derive(Debug, Clone)]
pub struct SubjectIndexScraper {
    pub subject: String,
    pub url: String,
    navigation_timeout: Duration,
}

impl SubjectIndexScraper {
    pub fn new(
        subject: impl Into<String>,
        url: impl Into<String>,
        navigation_timeout: Duration,
    ) -> Self {
        Self {
            subject: subject.into(),
            url: url.into(),
            navigation_timeout,
        }
    }

    /// Opens a page on `session`, loads the index and pulls the course links
    /// out of it. The page is closed before returning, whatever the outcome.
    pub async fn resolve_links(
        &self,
        session: &dyn BrowserSession,
    ) -> Result<Vec<CourseLink>, ScrapeError> {
        info!("Resolving course links for {} from {}", self.subject, self.url);
        let mut page = session.new_page().await.map_err(|source| ScrapeError::Browser {
            subject: self.subject.clone(),
            source,
        })?;

        let loaded = tokio::time::timeout(self.navigation_timeout, async {
            page.goto(&self.url).await?;
            page.content().await
        })
        .await;

        if let Err(e) = page.close().await {
            warn!("failed to close index page for {}: {e}", self.subject);
        }

        let html = match loaded {
            Ok(Ok(html)) => html,
            Ok(Err(source)) => {
                return Err(ScrapeError::Browser {
                    subject: self.subject.clone(),
                    source,
                });
            }
            Err(_elapsed) => {
                return Err(ScrapeError::NavigationTimeout {
                    subject: self.subject.clone(),
                    timeout: self.navigation_timeout,
                });
            }
        };

        let links = extract_course_links(&html);
        debug!("{}: {} candidate course links", self.subject, links.len());
        Ok(links)
    }
}

/// Anchors pointing at a course preview whose text looks like `SUBJ 123`.
/// Repeated hrefs are kept once, in page order.
pub fn extract_course_links(html: &str) -> Vec<CourseLink> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    document
        .select(&ANCHOR_SELECTOR)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?;
            if !href.contains(COURSE_PREVIEW_MARKER) {
                return None;
            }
            let text = normalize_whitespace(&extract_text(anchor));
            COURSE_LINK_TEXT
                .is_match(&text)
                .then(|| CourseLink::new(href, text))
        })
        .filter(|link| seen.insert(link.href.clone()))
        .collect()
}
