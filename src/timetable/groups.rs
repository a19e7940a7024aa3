//! Group discovery from the upstream landing page.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::bytes::Regex;

/// Group codes look like `221-352`, `24Б-101` or `221-352 ИНБ`.
static GROUP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{2}[0-9a-zA-Zа-яА-ЯёЁ]-\d{3}(?:\s[a-zA-Zа-яА-ЯёЁ]{3})?")
        .expect("group pattern is valid")
});

/// Extract the distinct group numbers mentioned on the landing page.
///
/// Order is unspecified. A page without any group yields an empty list.
pub fn discover_groups(page: &[u8]) -> Vec<String> {
    let mut seen = HashSet::new();
    GROUP_PATTERN
        .find_iter(page)
        .filter_map(|m| std::str::from_utf8(m.as_bytes()).ok())
        .map(str::trim)
        .filter(|group| seen.insert(group.to_string()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_set(groups: Vec<String>) -> HashSet<String> {
        groups.into_iter().collect()
    }

    #[test]
    fn finds_and_deduplicates_groups() {
        let page = r#"
            <option value="221-352">221-352</option>
            <option value="221-352">221-352</option>
            <option value="24Б-101">24Б-101</option>
            <option value="231-731 ИНБ">231-731 ИНБ</option>
        "#;
        let found = as_set(discover_groups(page.as_bytes()));
        let expected: HashSet<String> = ["221-352", "24Б-101", "231-731 ИНБ"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn page_without_groups_is_empty() {
        assert!(discover_groups(b"<html><body>maintenance</body></html>").is_empty());
    }

    #[test]
    fn partial_codes_do_not_match() {
        assert!(discover_groups(b"22-352 2213-52 221-35").is_empty());
    }

    #[test]
    fn invalid_utf8_around_matches_is_ignored() {
        let mut page = vec![0xff, 0xfe];
        page.extend_from_slice(b" 221-352 ");
        page.push(0xff);
        assert_eq!(discover_groups(&page), vec!["221-352".to_string()]);
    }
}
