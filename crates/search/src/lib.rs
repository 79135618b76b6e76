//! Text matching and recursive directory search for the explorer.
//!
//! [`SearchOptions`] compile into a [`Matcher`] for plain or regex patterns.
//! [`search_directory`] walks a folder and reports the entries whose name or
//! content matches, which is what the explorer's search panel lists.

mod directory;

use std::borrow::Cow;
use std::io;
use std::path::PathBuf;

use regex::{Regex, RegexBuilder};
use thiserror::Error;

pub use directory::{search_directory, search_directory_with, DirectoryHit, DirectorySearchLimits};

/// Error conditions raised by the search engine.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search pattern cannot be empty")]
    EmptyPattern,
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("cannot read search root {}: {source}", root.display())]
    Root {
        root: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("search root {} is not a directory", .0.display())]
    NotADirectory(PathBuf),
}

/// Determines how the search pattern is interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SearchMode {
    #[default]
    Plain,
    Regex,
}

/// Options supplied to the search engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchOptions {
    pub pattern: String,
    pub mode: SearchMode,
    pub case_sensitive: bool,
    pub whole_word: bool,
}

impl SearchOptions {
    /// Creates a case-insensitive plain-text query for `pattern`.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            mode: SearchMode::Plain,
            case_sensitive: false,
            whole_word: false,
        }
    }

    pub fn regex(mut self, enabled: bool) -> Self {
        self.mode = if enabled {
            SearchMode::Regex
        } else {
            SearchMode::Plain
        };
        self
    }

    pub fn case_sensitive(mut self, enabled: bool) -> Self {
        self.case_sensitive = enabled;
        self
    }

    pub fn whole_word(mut self, enabled: bool) -> Self {
        self.whole_word = enabled;
        self
    }

    fn validate(&self) -> Result<(), SearchError> {
        if self.pattern.is_empty() {
            return Err(SearchError::EmptyPattern);
        }
        Ok(())
    }

    /// Validates the options and compiles them into a reusable matcher.
    pub fn compile(&self) -> Result<Matcher, SearchError> {
        self.validate()?;
        Ok(Matcher {
            regex: build_regex(self)?,
            whole_word: self.whole_word,
        })
    }
}

/// Compiled form of [`SearchOptions`], cheap to apply to many texts.
#[derive(Clone, Debug)]
pub struct Matcher {
    regex: Regex,
    whole_word: bool,
}

impl Matcher {
    /// Returns `true` when `text` holds at least one acceptable match.
    pub fn is_match(&self, text: &str) -> bool {
        self.regex
            .find_iter(text)
            .any(|m| !self.whole_word || is_whole_word(text, m.start(), m.end()))
    }
}

fn is_whole_word(text: &str, start: usize, end: usize) -> bool {
    let is_word = |byte: u8| byte.is_ascii_alphanumeric() || byte == b'_';
    let bytes = text.as_bytes();
    let left = start > 0 && bytes.get(start - 1).is_some_and(|b| is_word(*b));
    let right = bytes.get(end).is_some_and(|b| is_word(*b));
    !(left || right)
}

fn build_regex(options: &SearchOptions) -> Result<Regex, SearchError> {
    let mut builder = RegexBuilder::new(&translate_pattern(options));
    builder.case_insensitive(!options.case_sensitive);
    builder.multi_line(true);
    builder
        .build()
        .map_err(|err| SearchError::InvalidPattern(err.to_string()))
}

fn translate_pattern(options: &SearchOptions) -> Cow<'_, str> {
    match options.mode {
        SearchMode::Plain => Cow::Owned(regex::escape(&options.pattern)),
        SearchMode::Regex => Cow::Borrowed(&options.pattern),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: SearchOptions, text: &str) -> bool {
        pattern.compile().unwrap().is_match(text)
    }

    #[test]
    fn plain_search_is_case_insensitive_by_default() {
        assert!(matches(SearchOptions::new("HELLO"), "say hello world"));
        assert!(!matches(SearchOptions::new("HELLO").case_sensitive(true), "say hello"));
        assert!(matches(SearchOptions::new("todo").case_sensitive(true), "Todo todo"));
    }

    #[test]
    fn whole_word_skips_partial_matches() {
        let options = SearchOptions::new("cat").whole_word(true);
        assert!(!matches(options.clone(), "concatenate scatter cat_"));
        assert!(matches(options.clone(), "scatter cat_ cat"));
        assert!(matches(options, "the cat sat"));
        assert!(matches(SearchOptions::new("cat"), "concatenate"));
    }

    #[test]
    fn plain_patterns_are_escaped() {
        assert!(!matches(SearchOptions::new("a.b"), "axb"));
        assert!(matches(SearchOptions::new("a.b"), "a.b"));
        assert!(matches(SearchOptions::new("a.b").regex(true), "axb"));
    }

    #[test]
    fn regex_anchors_apply_per_line() {
        let options = SearchOptions::new("^fn main").regex(true);
        assert!(matches(options, "// header\nfn main() {}\n"));
    }

    #[test]
    fn invalid_options_are_rejected() {
        assert!(matches!(
            SearchOptions::new("").compile(),
            Err(SearchError::EmptyPattern)
        ));
        assert!(matches!(
            SearchOptions::new("(unclosed").regex(true).compile(),
            Err(SearchError::InvalidPattern(_))
        ));
        assert!(SearchOptions::new("(unclosed").compile().is_ok());
    }
}
