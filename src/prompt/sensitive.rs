use std::fs;
use std::path::Path;

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::prompt::cleaner::polish_separators;

const DEFAULT_BANNED_WORDS: &[&str] = &[
    "nude",
    "naked",
    "nsfw",
    "topless",
    "bottomless",
    "nipples",
    "genitals",
    "pussy",
    "penis",
    "sex",
    "porn",
    "hentai",
    "explicit",
    "gore",
];

static SPACE_BEFORE_PUNCT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+([.,;:!?])").expect("valid punctuation spacing regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOutcome {
    pub cleaned_text: String,
    pub flagged: bool,
}

/// Whole-word, case-insensitive redaction against a swappable word list.
#[derive(Debug, Clone)]
pub struct SensitiveWordFilter {
    patterns: Vec<(String, Regex)>,
}

impl Default for SensitiveWordFilter {
    fn default() -> Self {
        Self::from_words(DEFAULT_BANNED_WORDS.iter().copied())
    }
}

impl SensitiveWordFilter {
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut patterns = Vec::new();
        for word in words {
            let word = word.as_ref().trim();
            if word.is_empty() {
                continue;
            }
            let pattern = format!(r"(?i)\b{}\b", regex::escape(word));
            match Regex::new(&pattern) {
                Ok(regex) => patterns.push((word.to_lowercase(), regex)),
                Err(err) => warn!("Skipping unusable sensitive word {:?}: {}", word, err),
            }
        }
        SensitiveWordFilter { patterns }
    }

    /// Reads one word per line; blank lines and `#` comments are ignored.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            anyhow!(
                "Failed to read sensitive word list '{}': {}",
                path.display(),
                err
            )
        })?;
        let words = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'));
        let filter = Self::from_words(words);
        info!(
            "Loaded {} sensitive words from {}",
            filter.len(),
            path.display()
        );
        Ok(filter)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn filter(&self, text: &str) -> FilterOutcome {
        if text.trim().is_empty() {
            return FilterOutcome {
                cleaned_text: String::new(),
                flagged: false,
            };
        }

        let mut current = text.to_string();
        let mut flagged = false;
        for (word, regex) in &self.patterns {
            if regex.is_match(&current) {
                flagged = true;
                debug!("Removed sensitive word {:?}", word);
                current = regex.replace_all(&current, "").into_owned();
            }
        }

        // Removal can strand the gap before punctuation.
        if flagged {
            current = SPACE_BEFORE_PUNCT_RE.replace_all(&current, "$1").into_owned();
        }
        FilterOutcome {
            cleaned_text: polish_separators(&current),
            flagged,
        }
    }
}
