use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::catalog::{Tag, TagCatalog};
use crate::llm::backend::{BackendError, GenerativeBackend, TextRequest};
use crate::llm::media::detect_mime_type;
use crate::prompt::cleaner::clean_prompt;
use crate::prompt::synth::{StructuredTag, NOT_APPLICABLE};
use crate::prompt::templates::{CAPTION_SYSTEM_PROMPT, KEYWORDS_SYSTEM_PROMPT, TRANSLATE_SYSTEM_PROMPT};
use crate::utils::language::needs_translation;

const NEGATIVE_PREFIX: &str = "Negative prompt:";
const MIN_SETTINGS_ON_LINE: usize = 3;

static SETTING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\s*([A-Za-z][\w \-/]*?)\s*:\s*("(?:[^"\\]|\\.)*"|[^,]*)(?:,|$)"#)
        .expect("valid setting regex")
});

/// Prompt and settings recovered from an SD-WebUI style parameters block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationParameters {
    pub positive: String,
    pub negative: String,
    pub settings: BTreeMap<String, String>,
}

fn parse_settings_line(line: &str) -> BTreeMap<String, String> {
    SETTING_RE
        .captures_iter(line)
        .filter_map(|caps| {
            let key = caps.get(1)?.as_str().trim();
            let value = caps.get(2)?.as_str().trim();
            if key.is_empty() {
                return None;
            }
            let value = value
                .strip_prefix('"')
                .and_then(|inner| inner.strip_suffix('"'))
                .unwrap_or(value);
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

fn is_settings_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("Steps:") || SETTING_RE.captures_iter(trimmed).count() >= MIN_SETTINGS_ON_LINE
}

pub fn parse_generation_parameters(text: &str) -> GenerationParameters {
    let mut lines: Vec<&str> = text.trim().lines().collect();
    let mut settings = BTreeMap::new();
    if let Some(last) = lines.last() {
        if lines.len() > 1 && is_settings_line(last) && !last.trim_start().starts_with(NEGATIVE_PREFIX) {
            settings = parse_settings_line(last);
            lines.pop();
        }
    }

    let mut positive = Vec::new();
    let mut negative = Vec::new();
    let mut in_negative = false;
    for line in lines {
        if let Some(rest) = line.trim_start().strip_prefix(NEGATIVE_PREFIX) {
            in_negative = true;
            negative.push(rest.trim());
            continue;
        }
        if in_negative {
            negative.push(line.trim());
        } else {
            positive.push(line.trim());
        }
    }

    GenerationParameters {
        positive: positive.join("\n").trim().to_string(),
        negative: negative.join("\n").trim().to_string(),
        settings,
    }
}

fn selection_instance(tag: &Tag) -> Tag {
    if tag.allow_multiple_selections {
        tag.instantiate()
    } else {
        tag.clone()
    }
}

/// Maps a prompt onto catalog tags; unknown keywords become free tags in
/// the catalog's input category.
pub fn tags_from_prompt(prompt: &str, catalog: &TagCatalog) -> Vec<Tag> {
    let cleaned = clean_prompt(prompt);
    let input_category = catalog.input_category_id();
    let mut matched = 0usize;
    let tags: Vec<Tag> = cleaned
        .split(", ")
        .filter(|keyword| !keyword.is_empty())
        .map(|keyword| match catalog.find_by_name(keyword) {
            Some(tag) => {
                matched += 1;
                selection_instance(tag)
            }
            None => Tag::custom(keyword, input_category),
        })
        .collect();
    debug!(
        "Mapped {} keywords to tags ({} from catalog)",
        tags.len(),
        matched
    );
    tags
}

fn resolve_structured_tag(entry: &StructuredTag, catalog: &TagCatalog) -> Tag {
    let category_id = catalog.category_id_by_display_name(&entry.category_display_name);
    let sub_category_id = match category_id {
        Some(category_id) if entry.sub_category_display_name != NOT_APPLICABLE => {
            catalog.sub_category_id_by_display_name(category_id, &entry.sub_category_display_name)
        }
        _ => None,
    };

    let placed = category_id.and_then(|category_id| {
        catalog
            .tags_in(category_id, sub_category_id)
            .into_iter()
            .find(|tag| tag.name.eq_ignore_ascii_case(entry.name.trim()))
    });
    let tag = match placed.or_else(|| catalog.find_by_name(&entry.name)) {
        Some(tag) => selection_instance(tag),
        None => {
            let mut tag = Tag::custom(&entry.name, catalog.input_category_id());
            if !entry.localized_name.trim().is_empty() {
                tag.localized_name = entry.localized_name.clone();
            }
            tag
        }
    };
    tag.with_locked(entry.is_locked)
}

/// Rebuilds a selection from a structured-dump snapshot.
pub fn import_structured_dump(raw: &str, catalog: &TagCatalog) -> Result<Vec<Tag>> {
    let entries: Vec<StructuredTag> = serde_json::from_str(raw)
        .map_err(|err| anyhow!("Failed to parse structured dump: {}", err))?;
    let tags: Vec<Tag> = entries
        .iter()
        .filter(|entry| !entry.name.trim().is_empty())
        .map(|entry| resolve_structured_tag(entry, catalog))
        .collect();
    if tags.len() < entries.len() {
        warn!(
            "Skipped {} structured dump entries without a name",
            entries.len() - tags.len()
        );
    }
    info!("Imported {} tags from structured dump", tags.len());
    Ok(tags)
}

/// Free description -> English keywords -> tags. Each backend step consumes
/// the previous step's output.
pub async fn extract_tags(
    backend: &dyn GenerativeBackend,
    text: &str,
    catalog: &TagCatalog,
) -> Result<Vec<Tag>, BackendError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let english = if needs_translation(text) {
        let translated = backend
            .generate_text(TextRequest::text(text).with_system(TRANSLATE_SYSTEM_PROMPT))
            .await?;
        debug!("Translated description before keyword extraction");
        translated
    } else {
        text.to_string()
    };

    let keywords = backend
        .generate_text(TextRequest::text(english).with_system(KEYWORDS_SYSTEM_PROMPT))
        .await?;
    Ok(tags_from_prompt(&keywords, catalog))
}

/// Captions an image so it can drive source-text synthesis.
pub async fn describe_image(
    backend: &dyn GenerativeBackend,
    bytes: &[u8],
) -> Result<String, BackendError> {
    let mime_type = detect_mime_type(bytes)
        .filter(|mime| mime.starts_with("image/"))
        .ok_or_else(|| BackendError::Failed("Unsupported image data".to_string()))?;
    let request = TextRequest::text("Describe this image.")
        .with_image(mime_type, bytes.to_vec())
        .with_system(CAPTION_SYSTEM_PROMPT);
    let caption = backend.generate_text(request).await?;
    Ok(caption.trim().to_string())
}
