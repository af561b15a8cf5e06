pub mod browser;
pub mod config;
pub mod error;
pub mod limiter;
pub mod models;
pub mod requests;
pub mod retry;

mod catalog_scraper;
mod course_parser;
mod course_scraper;
mod scraping_context;
mod subject_index_scraper;
mod text_manipulators;

pub use catalog_scraper::CatalogScraper;
pub use config::ScrapingConfig;
pub use course_parser::{classie_evals_url, parse as parse_course, simplify_prereq};
pub use course_scraper::{CourseScraper, FetchOptions, classify_fetch_error};
pub use error::{FetchError, ScrapeError};
pub use models::{CourseLink, CourseRecord, SubjectResult};
pub use scraping_context::ScrapingContext;
pub use subject_index_scraper::{SubjectIndexScraper, extract_course_links};
