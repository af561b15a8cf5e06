use std::sync::LazyLock;

use regex::Regex;
use scraper::ElementRef;
use url::Url;

use crate::models::UNKNOWN;

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static COID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"coid=(\d+)").unwrap());

pub fn extract_text(node: ElementRef) -> String {
    node.text().collect::<String>()
}

/// Replaces non-breaking spaces, collapses whitespace runs and trims.
pub fn normalize_whitespace(text: &str) -> String {
    let text = text.replace('\u{a0}', " ");
    WHITESPACE_RUN.replace_all(&text, " ").trim().to_string()
}

/// Resolves an absolute, root-relative or relative href against `base`.
pub fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    base.join(href).ok()
}

pub fn extract_coid(url: &str) -> String {
    COID.captures(url)
        .and_then(|caps| caps.get(1))
        .map_or_else(|| UNKNOWN.to_string(), |m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_nbsp_and_runs() {
        assert_eq!(
            normalize_whitespace("  CSE\u{a0}214:\n\t Data   Structures "),
            "CSE 214: Data Structures"
        );
    }

    #[test]
    fn resolves_all_href_shapes() {
        let base = Url::parse("https://catalog.example.edu/content.php?catoid=7").unwrap();
        assert_eq!(
            resolve_href(&base, "https://other.example.edu/x?coid=1").unwrap().as_str(),
            "https://other.example.edu/x?coid=1"
        );
        assert_eq!(
            resolve_href(&base, "/preview_course_nopop.php?coid=2").unwrap().as_str(),
            "https://catalog.example.edu/preview_course_nopop.php?coid=2"
        );
        assert_eq!(
            resolve_href(&base, "preview_course_nopop.php?catoid=7&coid=3").unwrap().as_str(),
            "https://catalog.example.edu/preview_course_nopop.php?catoid=7&coid=3"
        );
        assert!(resolve_href(&base, "   ").is_none());
    }

    #[test]
    fn coid_falls_back_to_unknown() {
        assert_eq!(extract_coid("preview_course_nopop.php?catoid=7&coid=81234"), "81234");
        assert_eq!(extract_coid("preview_course_nopop.php?catoid=7"), "unknown");
    }
}
