use serde::{Deserialize, Serialize};

/// A candidate course-detail link taken from a subject index page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseLink {
    pub href: String,
    pub text: String,
}

impl CourseLink {
    pub fn new(href: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            text: text.into(),
        }
    }
}

/// One parsed course-detail page. Every field is empty when the page didn't
/// carry it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRecord {
    pub coid: String,
    pub url: String,
    pub title: String,
    pub description: String,
    pub credits: String,
    pub prereq: String,
    pub coreq: String,
    pub anti_req: String,
    pub advisory_prereq: String,
    pub sbc: String,
    #[serde(rename = "classieEvalsUrl")]
    pub classie_evals_url: String,
}

impl CourseRecord {
    /// Marks every non-empty requisite field as `"unknown"`.
    ///
    /// Used for subjects whose requisite text we don't trust the parser on.
    pub fn mask_requisites(&mut self) {
        for field in [
            &mut self.prereq,
            &mut self.coreq,
            &mut self.anti_req,
            &mut self.advisory_prereq,
        ] {
            if !field.is_empty() {
                *field = UNKNOWN.to_string();
            }
        }
    }
}

/// Placeholder used both for a missing coid and for masked requisites.
pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectResult {
    pub subject: String,
    pub count: usize,
    pub courses: Vec<CourseRecord>,
}

impl SubjectResult {
    pub fn new(subject: impl Into<String>, courses: Vec<CourseRecord>) -> Self {
        Self {
            subject: subject.into(),
            count: courses.len(),
            courses,
        }
    }
}
