//! Name-based classifiers behind the generator's consistency filters.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Female,
    Male,
}

impl Gender {
    pub fn opposite(self) -> Self {
        match self {
            Gender::Female => Gender::Male,
            Gender::Male => Gender::Female,
        }
    }
}

const FEMALE_WORDS: &[&str] = &[
    "1girl", "2girls", "girl", "girls", "woman", "women", "female", "lady", "mother",
    "grandmother", "schoolgirl", "maiden", "wife", "granny",
];

const MALE_WORDS: &[&str] = &[
    "1boy", "2boys", "boy", "boys", "man", "men", "male", "gentleman", "father",
    "grandfather", "schoolboy", "husband", "grandpa",
];

const VERY_SHORT_LENGTHS: &[&str] = &["very short hair", "buzz cut", "crew cut", "shaved head", "bald"];

const LONG_HAIR_STYLES: &[&str] = &["braid", "ponytail", "twintail", "drill hair", "hair bun", "double bun"];

const POSITIVE_EXPRESSIONS: &[&str] = &["smil", "happy", "laugh", "grin", "joy", "cheerful"];

fn tokens(name: &str) -> Vec<String> {
    name.to_lowercase()
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Gender a tag name implies, if exactly one is implied.
pub fn classify_gender(name: &str) -> Option<Gender> {
    let tokens = tokens(name);
    let female = tokens.iter().any(|token| FEMALE_WORDS.contains(&token.as_str()));
    let male = tokens.iter().any(|token| MALE_WORDS.contains(&token.as_str()));
    match (female, male) {
        (true, false) => Some(Gender::Female),
        (false, true) => Some(Gender::Male),
        _ => None,
    }
}

pub fn contradicts_gender(name: &str, gender: Gender) -> bool {
    classify_gender(name) == Some(gender.opposite())
}

pub fn is_very_short_length(name: &str) -> bool {
    let lowered = name.to_lowercase();
    VERY_SHORT_LENGTHS.iter().any(|marker| lowered.contains(marker))
}

pub fn needs_long_hair(style: &str) -> bool {
    let lowered = style.to_lowercase();
    LONG_HAIR_STYLES.iter().any(|marker| lowered.contains(marker))
}

pub fn hair_conflict(length: &str, style: &str) -> bool {
    is_very_short_length(length) && needs_long_hair(style)
}

pub fn is_positive_expression(name: &str) -> bool {
    let lowered = name.to_lowercase();
    POSITIVE_EXPRESSIONS.iter().any(|marker| lowered.contains(marker))
}
