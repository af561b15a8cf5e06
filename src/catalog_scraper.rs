use std::{collections::HashSet, panic::AssertUnwindSafe, time::Instant};

use futures::{FutureExt, future::join_all};
use log::{error, info, warn};

use crate::{
    browser::BrowserSession,
    course_scraper::{CourseScraper, FetchOptions},
    error::ScrapeError,
    models::SubjectResult,
    scraping_context::ScrapingContext,
    subject_index_scraper::SubjectIndexScraper,
};

/// Runs one scrape: a single browser session, one pipeline per subject.
pub struct CatalogScraper {
    context: ScrapingContext,
    course_scraper: CourseScraper,
    fetch_options: FetchOptions,
}

impl CatalogScraper {
    pub fn new(context: ScrapingContext) -> Self {
        let course_scraper = CourseScraper::new(
            context.page_fetcher.clone(),
            context.scraping_config.catalog_base_url.clone(),
        );
        let fetch_options = FetchOptions::from(&context.scraping_config);
        Self {
            context,
            course_scraper,
            fetch_options,
        }
    }

    /// Upper-cased, de-duplicated subject codes; the required subjects when
    /// none are given.
    pub fn resolve_subjects(&self, subjects: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        let subjects: Vec<String> = subjects
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect();
        if subjects.is_empty() {
            self.context.scraping_config.required_subjects.clone()
        } else {
            subjects
        }
    }

    /// Scrapes every subject, returning results for the ones that made it.
    /// Only a browser launch failure fails the run as a whole.
    pub async fn run(
        &self,
        term: &str,
        subjects: &[String],
    ) -> Result<Vec<SubjectResult>, ScrapeError> {
        let subjects = self.resolve_subjects(subjects);
        let started = Instant::now();
        info!(
            "Scraping catalog for term {term}, subjects: {}",
            subjects.join(", ")
        );

        let session = self
            .context
            .browser_launcher
            .launch()
            .await
            .map_err(ScrapeError::LaunchFailure)?;

        let outcomes = join_all(subjects.iter().map(|subject| {
            AssertUnwindSafe(self.scrape_subject(session.as_ref(), subject)).catch_unwind()
        }))
        .await;

        if let Err(e) = session.close().await {
            warn!("failed to close browser session: {e:#}");
        }

        let mut results = Vec::with_capacity(subjects.len());
        for (subject, outcome) in subjects.iter().zip(outcomes) {
            match outcome {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(e)) => error!("Skipping {subject}: {:#}", anyhow::Error::from(e)),
                Err(_panic) => error!("Skipping {subject}: pipeline panicked"),
            }
        }

        info!(
            "Scraped {} of {} subjects ({} courses) in {:.1}s",
            results.len(),
            subjects.len(),
            results.iter().map(|r| r.count).sum::<usize>(),
            started.elapsed().as_secs_f64()
        );
        Ok(results)
    }

    async fn scrape_subject(
        &self,
        session: &dyn BrowserSession,
        subject: &str,
    ) -> Result<SubjectResult, ScrapeError> {
        let config = &self.context.scraping_config;
        let index_url = config.get_index_url_for_subject(subject);
        let index = SubjectIndexScraper::new(subject, index_url, config.navigation_timeout);

        let links = index.resolve_links(session).await?;
        info!("{subject}: found {} course links", links.len());

        let courses = self
            .course_scraper
            .fetch_all(subject, &index.url, &links, &self.fetch_options)
            .await;
        info!("{subject}: scraped {} courses", courses.len());
        Ok(SubjectResult::new(subject, courses))
    }
}
