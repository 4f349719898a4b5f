use once_cell::sync::Lazy;
use regex::Regex;
use whatlang::{detect, Lang, Script};

const MIN_ALPHA_CHARS: usize = 2;
const LATIN_CONFIDENCE_THRESHOLD: f64 = 0.68;
const NON_LATIN_CONFIDENCE_THRESHOLD: f64 = 0.5;

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://\S+|www\.\S+").expect("valid url regex"));
static SYNTAX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[()\[\]{}<>:_]|\d+(\.\d+)?").expect("valid syntax regex"));
static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

fn normalize_text_for_detection(text: &str) -> String {
    let without_urls = URL_RE.replace_all(text, " ");
    let without_syntax = SYNTAX_RE.replace_all(&without_urls, " ");
    WHITESPACE_RE
        .replace_all(&without_syntax, " ")
        .trim()
        .to_string()
}

fn alphabetic_char_count(text: &str) -> usize {
    text.chars().filter(|ch| ch.is_alphabetic()).count()
}

pub fn detect_language_name(text: &str) -> Option<String> {
    let normalized = normalize_text_for_detection(text);
    if normalized.is_empty() || alphabetic_char_count(&normalized) < MIN_ALPHA_CHARS {
        return None;
    }

    let info = detect(&normalized)?;
    if info.is_reliable() {
        return Some(info.lang().eng_name().to_string());
    }

    let threshold = match info.script() {
        Script::Latin => LATIN_CONFIDENCE_THRESHOLD,
        _ => NON_LATIN_CONFIDENCE_THRESHOLD,
    };
    if info.confidence() >= threshold {
        return Some(info.lang().eng_name().to_string());
    }

    None
}

/// Whether free text should be translated before keyword extraction.
///
/// Tag soup rarely detects reliably, so any non-Latin script counts as foreign
/// even when the language itself is uncertain.
pub fn needs_translation(text: &str) -> bool {
    let normalized = normalize_text_for_detection(text);
    if normalized.is_empty() {
        return false;
    }
    if normalized
        .chars()
        .any(|ch| ch.is_alphabetic() && !ch.is_ascii() && !is_latin_extended(ch))
    {
        return true;
    }
    match detect_language_name(&normalized) {
        Some(language) => language != Lang::Eng.eng_name(),
        None => false,
    }
}

fn is_latin_extended(ch: char) -> bool {
    matches!(ch, '\u{00C0}'..='\u{024F}')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_sentences_skip_translation() {
        assert!(!needs_translation(
            "A young woman with long red hair is smiling in a garden"
        ));
        assert!(!needs_translation("(1.2)"));
    }

    #[test]
    fn non_latin_text_needs_translation() {
        assert!(needs_translation("一个长发的女孩在花园里微笑"));
        assert!(needs_translation("赤いドレスの女の子"));
    }

    #[test]
    fn detects_reliable_languages() {
        let detected = detect_language_name(
            "¿Puedes describir a una mujer joven con el pelo largo y un vestido rojo?",
        );
        assert_eq!(detected.as_deref(), Some("Spanish"));
        assert_eq!(detect_language_name("12345"), None);
    }
}
