use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// Quality boilerplate that carries no subject information.
const JUNK_TOKENS: &[&str] = &[
    "masterpiece",
    "best quality",
    "high quality",
    "highest quality",
    "top quality",
    "amazing quality",
    "very aesthetic",
    "normal quality",
    "low quality",
    "worst quality",
    "lowres",
    "highres",
    "absurdres",
    "ultra-detailed",
    "ultra detailed",
    "extremely detailed",
    "hyper detailed",
    "8k",
    "4k",
    "uhd",
    "hdr",
    "official art",
    "score_9",
    "score_8_up",
    "score_7_up",
];

/// Generation-parameter keys that leak into prompts copied from image metadata.
const METADATA_KEYS: &[&str] = &[
    "steps",
    "sampler",
    "schedule type",
    "cfg scale",
    "seed",
    "size",
    "model",
    "model hash",
    "vae",
    "vae hash",
    "clip skip",
    "denoising strength",
    "hires upscale",
    "hires steps",
    "hires upscaler",
    "lora hashes",
    "negative prompt",
    "ensd",
    "version",
];

static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));
static BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.?\bBREAK\b\.?").expect("valid break regex"));
static COMMA_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",(\s*,)+").expect("valid comma run regex"));
static DIRECTIVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<\s*[A-Za-z_][\w-]*\s*:[^<>]*>").expect("valid directive regex")
});
static STRAY_WEIGHT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r":\s*-?\d*\.?\d+\s*[)\]}]+\s*$").expect("valid stray weight regex")
});

// Weighted form first so `(term:1.2)` loses its weight along with the brackets.
static EMPHASIS_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\(([^()]*?)\s*:\s*-?\d*\.?\d+\s*\)",
        r"\(([^()]*)\)",
        r"\[([^\[\]]*?)\s*:\s*-?\d*\.?\d+\s*\]",
        r"\[([^\[\]]*)\]",
        r"\{([^{}]*?)\s*:\s*-?\d*\.?\d+\s*\}",
        r"\{([^{}]*)\}",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid emphasis regex"))
    .collect()
});

fn is_edge_punctuation(ch: char) -> bool {
    ch.is_whitespace()
        || matches!(
            ch,
            '(' | ')' | '[' | ']' | '{' | '}' | '<' | '>' | '.' | ',' | ';' | ':' | '!' | '?' | '"' | '\'' | '`' | '|'
        )
}

fn strip_segment(segment: &str) -> String {
    let mut current = segment.to_string();
    loop {
        let mut next = BREAK_RE.replace_all(&current, ",").into_owned();
        next = DIRECTIVE_RE.replace_all(&next, " ").into_owned();
        for pattern in EMPHASIS_RES.iter() {
            next = pattern.replace_all(&next, "$1").into_owned();
        }
        next = STRAY_WEIGHT_RE.replace_all(&next, "").into_owned();
        next = WHITESPACE_RE.replace_all(&next, " ").into_owned();
        let next = next.trim_matches(is_edge_punctuation).to_string();
        if next == current {
            return next;
        }
        current = next;
    }
}

// Stripping can expose commas that were hidden inside brackets.
fn expand_segment(segment: &str) -> Vec<String> {
    let stripped = strip_segment(segment);
    if !stripped.contains(',') {
        return vec![stripped];
    }
    stripped.split(',').flat_map(expand_segment).collect()
}

fn is_junk_token(segment: &str) -> bool {
    let lowered = segment.to_lowercase();
    if JUNK_TOKENS.contains(&lowered.as_str()) {
        return true;
    }
    METADATA_KEYS.iter().any(|key| {
        lowered
            .strip_prefix(key)
            .is_some_and(|rest| rest.trim_start().starts_with(':'))
    })
}

/// Normalizes a raw tag prompt into a deduplicated `", "`-joined list.
pub fn clean_prompt(raw: &str) -> String {
    let collapsed = WHITESPACE_RE.replace_all(raw, " ");
    let separated = BREAK_RE.replace_all(&collapsed, ",");
    let single_commas = COMMA_RUN_RE.replace_all(&separated, ",");
    let trimmed = single_commas.trim_matches(|ch: char| ch == ',' || ch.is_whitespace());
    if trimmed.is_empty() {
        return String::new();
    }

    let mut seen = HashSet::new();
    let mut kept = Vec::new();
    for segment in trimmed.split(',') {
        for piece in expand_segment(segment) {
            if piece.is_empty() || is_junk_token(&piece) {
                continue;
            }
            if seen.insert(piece.to_lowercase()) {
                kept.push(piece);
            }
        }
    }
    kept.join(", ")
}

/// Whitespace and comma polish shared with the sensitive-word pass.
pub fn polish_separators(text: &str) -> String {
    let collapsed = WHITESPACE_RE.replace_all(text, " ");
    collapsed
        .split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}
