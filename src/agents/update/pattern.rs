use crate::error::{Result, SafebumpError};
use regex::Regex;

/// Case-insensitive glob over package names. A pattern without `*` or `?`
/// matches as a substring.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    regex: Regex,
}

impl PatternMatcher {
    pub fn new(pattern: &str) -> Result<Self> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return Err(SafebumpError::ProjectValidation(
                "Filter pattern cannot be empty".to_string(),
            ));
        }

        let adjusted = if trimmed.contains(['*', '?']) {
            trimmed.to_string()
        } else {
            format!("*{trimmed}*")
        };

        Ok(Self {
            regex: Self::compile_glob(&adjusted)?,
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    fn compile_glob(pattern: &str) -> Result<Regex> {
        let mut regex = String::from("(?i)^");
        for ch in pattern.chars() {
            match ch {
                '*' => regex.push_str(".*"),
                '?' => regex.push('.'),
                _ => regex.push_str(&regex::escape(ch.encode_utf8(&mut [0; 4]))),
            }
        }
        regex.push('$');

        Regex::new(&regex).map_err(|e| {
            SafebumpError::ProjectValidation(format!("Invalid filter pattern '{pattern}': {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_matches_anywhere() {
        let matcher = PatternMatcher::new("React").unwrap();
        assert!(matcher.matches("react-dom"));
        assert!(matcher.matches("@types/react"));
        assert!(!matcher.matches("vue"));
    }

    #[test]
    fn globs_are_anchored() {
        let matcher = PatternMatcher::new("@types/*").unwrap();
        assert!(matcher.matches("@types/node"));
        assert!(!matcher.matches("types"));

        let matcher = PatternMatcher::new("lodash.?et").unwrap();
        assert!(matcher.matches("lodash.get"));
        assert!(!matcher.matches("lodashxget"));
    }

    #[test]
    fn empty_pattern_is_rejected() {
        assert!(PatternMatcher::new("  ").is_err());
    }
}
