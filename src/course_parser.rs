//! Turns a course-detail page into a [`CourseRecord`].
//!
//! Catalog pages are loosely structured: the title heading is followed by a
//! divider, a run of bare description text, and then `<strong>` labels whose
//! values are whatever text sits between one label and the next. Nothing here
//! fails; a missing piece just leaves its field empty.

use std::sync::LazyLock;

use log::debug;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

use crate::{
    models::CourseRecord,
    text_manipulators::{extract_text, normalize_whitespace},
};

const CLASSIE_EVALS_URL: &str = "https://classie-evals.stonybrook.edu/";

static TITLE_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    ["h1#course_preview_title", "td.block_content h1"]
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect()
});
static LABEL_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("strong").unwrap());

static PLACEMENT_PHRASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)on the mathematics placement examination").unwrap());
static MATH_COURSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:MAT|AMS)\s*\d{3}").unwrap());
static MATH_SUBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:MAT|AMS)(?:\s*\d|\b)").unwrap());
static OR_REST: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)^[\s,;]*or\s+(.+)$").unwrap());
static OR_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bor\b").unwrap());
static OR_HIGHER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^\s*or\s+higher\b").unwrap());
static COURSE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z]{2,4})\s*(\d{3})\b").unwrap());
static CREDIT_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\s*-\s*\d+)?").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Credits,
    Prerequisite,
    Corequisite,
    AntiRequisite,
    AdvisoryPrerequisite,
    Sbc,
}

impl Label {
    fn classify(label: &str) -> Option<Self> {
        let label = label.to_lowercase();
        // Advisory first: its text also contains "prerequisite".
        if label.contains("advisory preq") || label.contains("advisory prereq") {
            Some(Label::AdvisoryPrerequisite)
        } else if label.contains("anti-requisite") {
            Some(Label::AntiRequisite)
        } else if label.contains("corequisite") {
            Some(Label::Corequisite)
        } else if label.contains("prerequisite") {
            Some(Label::Prerequisite)
        } else if label.contains("sbc:") {
            Some(Label::Sbc)
        } else if label.contains("credit") {
            Some(Label::Credits)
        } else {
            None
        }
    }

    fn field<'r>(&self, record: &'r mut CourseRecord) -> &'r mut String {
        match self {
            Label::Credits => &mut record.credits,
            Label::Prerequisite => &mut record.prereq,
            Label::Corequisite => &mut record.coreq,
            Label::AntiRequisite => &mut record.anti_req,
            Label::AdvisoryPrerequisite => &mut record.advisory_prereq,
            Label::Sbc => &mut record.sbc,
        }
    }
}

/// Label names that end a value wherever they show up in bare text.
const STOP_KEYWORDS: [&str; 6] = [
    "prerequisite",
    "corequisite",
    "anti-requisite",
    "advisory prereq",
    "sbc:",
    "credits:",
];

static STOP_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives: Vec<String> = STOP_KEYWORDS.iter().map(|kw| regex::escape(kw)).collect();
    Regex::new(&format!("(?i){}", alternatives.join("|"))).unwrap()
});

enum Sibling<'a> {
    Text(&'a str),
    Element(ElementRef<'a>),
}

fn siblings_after<'a>(element: ElementRef<'a>) -> impl Iterator<Item = Sibling<'a>> {
    element.next_siblings().filter_map(|node| match node.value() {
        Node::Text(text) => Some(Sibling::Text(&**text)),
        Node::Element(_) => ElementRef::wrap(node).map(Sibling::Element),
        _ => None,
    })
}

fn is_label(element: ElementRef) -> bool {
    element.value().name() == "strong" || element.select(&LABEL_SELECTOR).next().is_some()
}

fn element_text(element: ElementRef) -> String {
    match element.value().name() {
        "br" => " ".to_string(),
        _ => extract_text(element),
    }
}

/// Parses one course-detail page. `coid` and `url` are left empty for the
/// caller to fill in.
pub fn parse(html: &str) -> CourseRecord {
    let document = Html::parse_document(html);
    let mut record = CourseRecord::default();

    let Some(title) = find_title(&document) else {
        return record;
    };
    record.title = normalize_whitespace(&extract_text(title));
    record.description = parse_description(title);

    if let Some(container) = title.parent().and_then(ElementRef::wrap) {
        for label_element in container.select(&LABEL_SELECTOR) {
            let label_text = normalize_whitespace(&extract_text(label_element));
            let Some(label) = Label::classify(&label_text) else {
                continue;
            };
            let from_label = match label {
                Label::Credits => credits_from_label(&label_text),
                _ => String::new(),
            };
            let value = if from_label.is_empty() {
                capture_label_value(label_element)
            } else {
                from_label
            };
            let field = label.field(&mut record);
            if field.is_empty() {
                *field = value;
            }
        }
    }

    record.prereq = simplify_prereq(&record.prereq);
    record.classie_evals_url = classie_evals_url(&record.title);
    record
}

fn find_title(document: &Html) -> Option<ElementRef<'_>> {
    TITLE_SELECTORS
        .iter()
        .find_map(|selector| document.select(selector).next())
}

fn parse_description(title: ElementRef) -> String {
    let mut siblings = siblings_after(title);
    let next = siblings
        .by_ref()
        .find(|sibling| !matches!(sibling, Sibling::Text(text) if text.trim().is_empty()));
    if !matches!(next, Some(Sibling::Element(el)) if el.value().name() == "hr") {
        return String::new();
    }

    let mut description = String::new();
    for sibling in siblings {
        match sibling {
            Sibling::Text(text) => description.push_str(text),
            Sibling::Element(el) if is_label(el) => break,
            Sibling::Element(el) => {
                description.push(' ');
                description.push_str(&element_text(el));
            }
        }
    }
    normalize_whitespace(&description)
}

/// Text between `label` and the next label or divider, cut at the first
/// stop keyword.
fn capture_label_value(label: ElementRef) -> String {
    let mut value = String::new();
    for sibling in siblings_after(label) {
        match sibling {
            Sibling::Element(el) if is_label(el) || el.value().name() == "hr" => break,
            Sibling::Element(el) => value.push_str(&element_text(el)),
            Sibling::Text(text) => value.push_str(text),
        }
    }
    if let Some(stop) = STOP_KEYWORD.find(&value) {
        value.truncate(stop.start());
    }
    let value = normalize_whitespace(&value);
    value.strip_prefix(':').unwrap_or(&value).trim().to_string()
}

fn credits_from_label(label: &str) -> String {
    CREDIT_VALUE
        .find(label)
        .map(|m| normalize_whitespace(m.as_str()).replace(' ', ""))
        .unwrap_or_default()
}

/// Collapses "placement exam OR course" prerequisites to the course branch.
///
/// Lossy: the placement-exam alternative is dropped and only the course
/// branch survives.
pub fn simplify_prereq(prereq: &str) -> String {
    if !PLACEMENT_PHRASE.is_match(prereq) || !MATH_COURSE.is_match(prereq) {
        return prereq.to_string();
    }

    let simplified = course_after_placement(prereq).or_else(|| first_course_alternative(prereq));
    match simplified {
        Some(simplified) => {
            debug!("simplified placement prerequisite {prereq:?} to {simplified:?}");
            simplified
        }
        None => prereq.to_string(),
    }
}

fn course_after_placement(prereq: &str) -> Option<String> {
    let phrase = PLACEMENT_PHRASE.find(prereq)?;
    let rest = OR_REST.captures(&prereq[phrase.end()..])?.get(1)?;
    let rest = rest.as_str().trim();
    (!rest.is_empty()).then(|| rest.to_string())
}

fn first_course_alternative(prereq: &str) -> Option<String> {
    let mut start = 0;
    let mut bounds = Vec::new();
    for or in OR_WORD.find_iter(prereq) {
        bounds.push((start, or.start()));
        start = or.end();
    }
    bounds.push((start, prereq.len()));

    bounds.into_iter().find_map(|(start, end)| {
        let segment = &prereq[start..end];
        if !MATH_SUBJECT.is_match(segment) || segment.to_lowercase().contains("placement") {
            return None;
        }
        let mut course = segment
            .trim_matches(|c: char| c.is_whitespace() || c == ',' || c == ';')
            .to_string();
        if OR_HIGHER.is_match(&prereq[end..]) {
            course.push_str(" or higher");
        }
        Some(course)
    })
}

/// Course-evaluation lookup for the first `SUBJ 123` code in `title`.
pub fn classie_evals_url(title: &str) -> String {
    COURSE_CODE
        .captures(title)
        .map(|caps| {
            format!(
                "{CLASSIE_EVALS_URL}?SearchKeyword={}{}&SearchTerm=ALL",
                &caps[1], &caps[2]
            )
        })
        .unwrap_or_default()
}
