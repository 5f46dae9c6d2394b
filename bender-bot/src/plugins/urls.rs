//! Web address detection shared by the matchers.

use std::sync::LazyLock;

use regex::Regex;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:https?://|www\.)[^\s<>"']+"#).unwrap_or_else(|e| panic!("invalid URL pattern: {e}"))
});

/// Web addresses in `text`, in order of appearance. Trailing punctuation
/// that usually ends a sentence rather than a URL is dropped.
pub fn find_urls(text: &str) -> Vec<&str> {
    URL_RE
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ')', '!', '?', ';', ':']))
        .filter(|url| !url.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_addresses() {
        assert_eq!(
            find_urls("see https://example.com/a?b=c and www.rust-lang.org."),
            vec!["https://example.com/a?b=c", "www.rust-lang.org"]
        );
    }

    #[test]
    fn plain_text_has_none() {
        assert!(find_urls("nothing to see here").is_empty());
        assert!(find_urls("").is_empty());
    }

    #[test]
    fn strips_sentence_punctuation() {
        assert_eq!(find_urls("(http://a.example/x)."), vec!["http://a.example/x"]);
    }
}
