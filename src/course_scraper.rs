use std::{collections::HashSet, sync::Arc, time::Duration};

use futures::future::join_all;
use log::{debug, info};
use url::Url;

use crate::{
    config::{DEFAULT_REQUEST_TIMEOUT_MS, REQUIRED_SUBJECTS, ScrapingConfig},
    course_parser,
    error::FetchError,
    limiter::{ConcurrencyLimiter, DEFAULT_CONCURRENCY},
    models::{CourseLink, CourseRecord},
    requests::PageFetcher,
    retry::{DEFAULT_MAX_RETRIES, FailureClass, RetryError, RetryPolicy},
    text_manipulators::{extract_coid, resolve_href},
};

/// Share of failed links above which a batch summary is logged.
const FAILURE_SUMMARY_THRESHOLD: f64 = 0.30;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub concurrency: usize,
    pub request_timeout: Duration,
    pub max_retries: u32,
    /// Subjects whose requisite text is kept as parsed.
    pub supported: HashSet<String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            supported: REQUIRED_SUBJECTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl From<&ScrapingConfig> for FetchOptions {
    fn from(config: &ScrapingConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            request_timeout: config.request_timeout,
            max_retries: config.max_retries,
            supported: config.supported_subjects(),
        }
    }
}

/// 404 is the only failure treated as final.
pub fn classify_fetch_error(err: &FetchError) -> FailureClass {
    match err {
        FetchError::Status(404) => FailureClass::Permanent,
        FetchError::Status(status) if *status >= 500 => FailureClass::Transient,
        FetchError::Timeout | FetchError::Connect(_) | FetchError::Body(_) => {
            FailureClass::Transient
        }
        _ => FailureClass::Unclassified,
    }
}

fn exceeds_failure_threshold(failed: usize, total: usize) -> bool {
    total > 0 && failed as f64 / total as f64 > FAILURE_SUMMARY_THRESHOLD
}

/// Fetches and parses course-detail pages under a concurrency cap.
pub struct CourseScraper {
    fetcher: Arc<dyn PageFetcher>,
    base_url: Url,
}

#[derive(Debug, Default)]
struct BatchTally {
    not_found: usize,
    gave_up: usize,
    other: usize,
}

impl CourseScraper {
    pub fn new(fetcher: Arc<dyn PageFetcher>, base_url: Url) -> Self {
        Self { fetcher, base_url }
    }

    /// Fetches every link, waiting for all of them to settle. Links that
    /// never produced a page are left out; the rest come back in no
    /// particular order.
    pub async fn fetch_all(
        &self,
        subject: &str,
        referer: &str,
        links: &[CourseLink],
        options: &FetchOptions,
    ) -> Vec<CourseRecord> {
        let limiter = ConcurrencyLimiter::new(options.concurrency);
        let retry_policy = RetryPolicy::new(options.max_retries);
        let mask_requisites = !options.supported.contains(subject);

        let outcomes = join_all(links.iter().map(|link| {
            self.fetch_course(link, referer, &limiter, &retry_policy, options.request_timeout)
        }))
        .await;

        let mut tally = BatchTally::default();
        let mut courses = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                Ok(mut record) => {
                    if mask_requisites {
                        record.mask_requisites();
                    }
                    courses.push(record);
                }
                Err(RetryError::Permanent(_)) => tally.not_found += 1,
                Err(RetryError::Exhausted { .. }) => tally.gave_up += 1,
                Err(RetryError::Unclassified(_)) => tally.other += 1,
            }
        }

        let failed = links.len() - courses.len();
        if exceeds_failure_threshold(failed, links.len()) {
            info!(
                "{subject}: {failed}/{} course pages failed ({} not found, {} gave up after retries, {} other)",
                links.len(),
                tally.not_found,
                tally.gave_up,
                tally.other
            );
        }
        debug!("{subject}: parsed {} of {} course pages", courses.len(), links.len());
        courses
    }

    async fn fetch_course(
        &self,
        link: &CourseLink,
        referer: &str,
        limiter: &ConcurrencyLimiter,
        retry_policy: &RetryPolicy,
        timeout: Duration,
    ) -> Result<CourseRecord, RetryError<FetchError>> {
        let Some(url) = resolve_href(&self.base_url, &link.href) else {
            return Err(RetryError::Unclassified(FetchError::InvalidUrl(link.href.clone())));
        };
        let url = url.to_string();
        let coid = extract_coid(&url);

        let target = url.as_str();
        let html = retry_policy
            .execute(
                target,
                |_attempt| async move {
                    let _permit = limiter
                        .acquire()
                        .await
                        .map_err(|e| FetchError::Other(e.to_string()))?;
                    self.fetcher.fetch_page(target, referer, timeout).await
                },
                classify_fetch_error,
            )
            .await?;

        let mut record = course_parser::parse(&html);
        record.coid = coid;
        record.url = url;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::{
        collections::HashMap,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    const BASE: &str = "https://catalog.example.edu/";
    const REFERER: &str = "https://catalog.example.edu/content.php?filter%5B27%5D=CSE";

    fn course_page(title: &str, prereq: &str) -> String {
        format!(
            r#"<html><body><td class="block_content">
                 <h1 id="course_preview_title">{title}</h1><hr>A course.
                 <strong>Prerequisite:</strong> {prereq}<br>
                 <strong>3 credits</strong>
               </td></body></html>"#
        )
    }

    /// Plays back a scripted sequence of responses per URL; once a script
    /// runs out the last response repeats.
    #[derive(Default)]
    struct ScriptedFetcher {
        scripts: Mutex<HashMap<String, Vec<Result<String, FetchError>>>>,
        calls: Mutex<HashMap<String, usize>>,
        referers: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        latency: Duration,
    }

    impl ScriptedFetcher {
        fn script(self, url: &str, responses: Vec<Result<String, FetchError>>) -> Self {
            self.scripts.lock().unwrap().insert(url.to_string(), responses);
            self
        }

        fn calls(&self, url: &str) -> usize {
            self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedFetcher {
        async fn fetch_page(
            &self,
            url: &str,
            referer: &str,
            _timeout: Duration,
        ) -> Result<String, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
            self.referers.lock().unwrap().push(referer.to_string());

            tokio::time::sleep(self.latency).await;
            let response = {
                let mut scripts = self.scripts.lock().unwrap();
                match scripts.get_mut(url) {
                    Some(script) if script.len() > 1 => script.remove(0),
                    Some(script) => script[0].clone(),
                    None => Ok(course_page("CSE 100: Default", "")),
                }
            };
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            response
        }
    }

    fn scraper(fetcher: Arc<ScriptedFetcher>) -> CourseScraper {
        CourseScraper::new(fetcher, Url::parse(BASE).unwrap())
    }

    fn link(href: &str) -> CourseLink {
        CourseLink::new(href, "CSE 214")
    }

    #[tokio::test(start_paused = true)]
    async fn mixed_batch_keeps_only_successes() {
        let not_found = "https://catalog.example.edu/preview_course_nopop.php?coid=1";
        let flaky = "https://catalog.example.edu/preview_course_nopop.php?coid=2";
        let good = "https://catalog.example.edu/preview_course_nopop.php?coid=3";
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .script(not_found, vec![Err(FetchError::Status(404))])
                .script(
                    flaky,
                    vec![
                        Err(FetchError::Connect("connection reset".into())),
                        Err(FetchError::Status(503)),
                        Err(FetchError::Timeout),
                    ],
                )
                .script(good, vec![Ok(course_page("CSE 214: Data Structures", "CSE 114"))]),
        );
        let links = [
            link("preview_course_nopop.php?coid=1"),
            link("/preview_course_nopop.php?coid=2"),
            link(good),
        ];

        let courses = scraper(Arc::clone(&fetcher))
            .fetch_all("CSE", REFERER, &links, &FetchOptions::default())
            .await;

        assert_eq!(courses.len(), 1);
        let course = &courses[0];
        assert_eq!(course.coid, "3");
        assert_eq!(course.url, good);
        assert_eq!(course.title, "CSE 214: Data Structures");
        assert_eq!(course.prereq, "CSE 114");
        assert_eq!(fetcher.calls(not_found), 1);
        assert_eq!(fetcher.calls(flaky), 3);
        assert_eq!(fetcher.calls(good), 1);
        assert!(fetcher.referers.lock().unwrap().iter().all(|r| r == REFERER));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_then_success_is_kept() {
        let url = "https://catalog.example.edu/preview_course_nopop.php?coid=42";
        let fetcher = Arc::new(ScriptedFetcher::default().script(
            url,
            vec![
                Err(FetchError::Status(502)),
                Ok(course_page("AMS 151: Applied Calculus I", "")),
            ],
        ));
        let courses = scraper(Arc::clone(&fetcher))
            .fetch_all("AMS", REFERER, &[link(url)], &FetchOptions::default())
            .await;
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].coid, "42");
        assert_eq!(fetcher.calls(url), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unclassified_status_is_not_retried() {
        let url = "https://catalog.example.edu/preview_course_nopop.php?coid=7";
        let fetcher =
            Arc::new(ScriptedFetcher::default().script(url, vec![Err(FetchError::Status(403))]));
        let courses = scraper(Arc::clone(&fetcher))
            .fetch_all("CSE", REFERER, &[link(url)], &FetchOptions::default())
            .await;
        assert!(courses.is_empty());
        assert_eq!(fetcher.calls(url), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_cap_holds() {
        let fetcher = Arc::new(ScriptedFetcher {
            latency: Duration::from_millis(50),
            ..Default::default()
        });
        let links: Vec<_> = (0..25)
            .map(|i| link(&format!("preview_course_nopop.php?coid={i}")))
            .collect();
        let options = FetchOptions {
            concurrency: 4,
            ..Default::default()
        };
        let courses = scraper(Arc::clone(&fetcher))
            .fetch_all("CSE", REFERER, &links, &options)
            .await;
        assert_eq!(courses.len(), 25);
        assert_eq!(fetcher.peak.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_subject_masks_requisites() {
        let url = "https://catalog.example.edu/preview_course_nopop.php?coid=9";
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .script(url, vec![Ok(course_page("BIO 202: Molecular Biology", "BIO 201"))]),
        );
        let scraper = scraper(fetcher);

        let supported = scraper
            .fetch_all("BIO", REFERER, &[link(url)], &FetchOptions {
                supported: HashSet::from(["BIO".to_string()]),
                ..Default::default()
            })
            .await;
        assert_eq!(supported[0].prereq, "BIO 201");

        let unsupported = scraper
            .fetch_all("BIO", REFERER, &[link(url)], &FetchOptions::default())
            .await;
        assert_eq!(unsupported[0].prereq, "unknown");
        assert_eq!(unsupported[0].coreq, "");
        assert_eq!(unsupported[0].anti_req, "");
        assert_eq!(unsupported[0].advisory_prereq, "");
        assert_eq!(unsupported[0].credits, "3");
    }

    #[tokio::test(start_paused = true)]
    async fn missing_coid_is_unknown() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let courses = scraper(fetcher)
            .fetch_all(
                "CSE",
                REFERER,
                &[link("preview_course_nopop.php?catoid=7")],
                &FetchOptions::default(),
            )
            .await;
        assert_eq!(courses[0].coid, "unknown");
        assert_eq!(
            courses[0].url,
            "https://catalog.example.edu/preview_course_nopop.php?catoid=7"
        );
    }

    #[test]
    fn classifies_fetch_errors() {
        assert_eq!(classify_fetch_error(&FetchError::Status(404)), FailureClass::Permanent);
        assert_eq!(classify_fetch_error(&FetchError::Status(500)), FailureClass::Transient);
        assert_eq!(classify_fetch_error(&FetchError::Timeout), FailureClass::Transient);
        assert_eq!(
            classify_fetch_error(&FetchError::Connect("dns error".into())),
            FailureClass::Transient
        );
        assert_eq!(classify_fetch_error(&FetchError::Status(410)), FailureClass::Unclassified);
        assert_eq!(
            classify_fetch_error(&FetchError::InvalidUrl("::".into())),
            FailureClass::Unclassified
        );
    }

    #[test]
    fn failure_summary_needs_more_than_thirty_percent() {
        assert!(!exceeds_failure_threshold(0, 0));
        assert!(!exceeds_failure_threshold(0, 10));
        assert!(!exceeds_failure_threshold(3, 10));
        assert!(exceeds_failure_threshold(4, 10));
        assert!(exceeds_failure_threshold(1, 1));
    }
}
