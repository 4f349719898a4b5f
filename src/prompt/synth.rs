use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::{Tag, TagCatalog};
use crate::config::{DEFAULT_MIDJOURNEY_SUFFIX, DEFAULT_QUALITY_PREFIX};
use crate::llm::backend::{BackendError, GenerativeBackend, TextRequest};
use crate::prompt::cleaner::clean_prompt;
use crate::prompt::sensitive::SensitiveWordFilter;
use crate::prompt::templates::{IMAGE_PROMPT_SYSTEM_PROMPT, STYLIZED_PROMPT_SYSTEM_PROMPT};

/// Sub-category label for tags placed directly under a category.
pub const NOT_APPLICABLE: &str = "N/A";

/// The four output dialects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptBundle {
    pub stable_diffusion: String,
    pub midjourney: String,
    pub image_prompt: String,
    pub structured_dump: String,
}

/// One entry of the structured-dump snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredTag {
    pub name: String,
    pub localized_name: String,
    pub category_display_name: String,
    pub sub_category_display_name: String,
    pub is_locked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisSettings {
    pub quality_prefix: String,
    pub midjourney_suffix: String,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        SynthesisSettings {
            quality_prefix: DEFAULT_QUALITY_PREFIX.to_string(),
            midjourney_suffix: DEFAULT_MIDJOURNEY_SUFFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisReport {
    pub bundle: PromptBundle,
    /// Cleaned (and filtered) base text every dialect was built from.
    pub base: String,
    pub flagged: bool,
    /// Set when a backend rewrite failed and its dialect fell back to the
    /// tag-based text. A block outranks a generic failure.
    pub backend_error: Option<BackendError>,
}

/// Concatenates tag names in order, merging trailing-hyphen modifiers into
/// the tag that follows them.
pub fn join_tag_names(tags: &[Tag]) -> String {
    let mut pieces = Vec::new();
    let mut pending_modifier = String::new();
    for tag in tags {
        let name = tag.name.trim();
        if name.is_empty() {
            continue;
        }
        if let Some(stem) = name.strip_suffix('-') {
            pending_modifier.push_str(stem.trim());
            continue;
        }
        if pending_modifier.is_empty() {
            pieces.push(name.to_string());
        } else {
            pieces.push(format!("{}{}", std::mem::take(&mut pending_modifier), name));
        }
    }
    if !pending_modifier.is_empty() {
        pieces.push(pending_modifier);
    }
    pieces.join(", ")
}

pub struct PromptSynthesizer<'a> {
    catalog: &'a TagCatalog,
    filter: &'a SensitiveWordFilter,
    backend: Option<&'a dyn GenerativeBackend>,
    settings: SynthesisSettings,
}

impl<'a> PromptSynthesizer<'a> {
    pub fn new(
        catalog: &'a TagCatalog,
        filter: &'a SensitiveWordFilter,
        settings: SynthesisSettings,
    ) -> Self {
        PromptSynthesizer {
            catalog,
            filter,
            backend: None,
            settings,
        }
    }

    pub fn with_backend(mut self, backend: Option<&'a dyn GenerativeBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn structured_tags(&self, tags: &[Tag]) -> Vec<StructuredTag> {
        tags.iter()
            .map(|tag| StructuredTag {
                name: tag.name.clone(),
                localized_name: tag.localized_name.clone(),
                category_display_name: self.catalog.category_display_name(&tag.category_id),
                sub_category_display_name: self
                    .catalog
                    .sub_category_display_name(&tag.category_id, tag.sub_category_id.as_deref())
                    .unwrap_or_else(|| NOT_APPLICABLE.to_string()),
                is_locked: tag.is_locked,
            })
            .collect()
    }

    fn structured_dump(&self, tags: &[Tag]) -> String {
        serde_json::to_string_pretty(&self.structured_tags(tags)).unwrap_or_else(|err| {
            warn!("Failed to serialise structured dump: {}", err);
            "[]".to_string()
        })
    }

    /// Cleaned, optionally filtered base text plus the filter flag.
    fn base_text(&self, tags: &[Tag], source_text: Option<&str>, filter_enabled: bool) -> (String, bool) {
        let raw = match source_text.map(str::trim).filter(|text| !text.is_empty()) {
            Some(text) => text.to_string(),
            None => join_tag_names(tags),
        };
        let cleaned = clean_prompt(&raw);
        if !filter_enabled {
            return (cleaned, false);
        }
        let outcome = self.filter.filter(&cleaned);
        if outcome.flagged {
            warn!("Sensitive words removed from prompt base");
        }
        (outcome.cleaned_text, outcome.flagged)
    }

    fn text_dialects(&self, base: &str) -> (String, String) {
        if base.is_empty() {
            return (String::new(), String::new());
        }
        let prefix = self.settings.quality_prefix.trim();
        let stable_diffusion = if prefix.is_empty() {
            base.to_string()
        } else {
            format!("{}, {}", prefix, base)
        };

        (stable_diffusion, self.with_midjourney_suffix(base))
    }

    /// Appends the parameter suffix unless the text already ends with it.
    fn with_midjourney_suffix(&self, text: &str) -> String {
        let suffix = self.settings.midjourney_suffix.trim();
        if suffix.is_empty() || text.ends_with(suffix) {
            text.to_string()
        } else {
            format!("{} {}", text, suffix)
        }
    }

    /// Builds every dialect without calling the backend.
    pub fn synthesize_offline(
        &self,
        tags: &[Tag],
        source_text: Option<&str>,
        filter_enabled: bool,
    ) -> SynthesisReport {
        let (base, flagged) = self.base_text(tags, source_text, filter_enabled);
        let (stable_diffusion, midjourney) = self.text_dialects(&base);
        SynthesisReport {
            bundle: PromptBundle {
                stable_diffusion,
                midjourney,
                image_prompt: base.clone(),
                structured_dump: self.structured_dump(tags),
            },
            base,
            flagged,
            backend_error: None,
        }
    }

    /// Builds every dialect, asking the backend (when present) for a
    /// natural-language rewrite and a stylized Midjourney rewrite. Each
    /// failed rewrite falls back to its tag-based dialect.
    pub async fn synthesize(
        &self,
        tags: &[Tag],
        source_text: Option<&str>,
        filter_enabled: bool,
    ) -> SynthesisReport {
        let mut report = self.synthesize_offline(tags, source_text, filter_enabled);
        let Some(backend) = self.backend else {
            return report;
        };
        if report.base.is_empty() {
            debug!("Skipping backend rewrite for empty prompt base");
            return report;
        }

        match self
            .rewrite(backend, &report.base, IMAGE_PROMPT_SYSTEM_PROMPT, filter_enabled, &mut report.flagged)
            .await
        {
            Ok(rewritten) => {
                info!("Image prompt rewritten by {}", backend.name());
                report.bundle.image_prompt = rewritten;
            }
            Err(err) => {
                warn!("Image prompt rewrite failed, using cleaned tags: {}", err);
                record_backend_error(&mut report, err);
            }
        }

        match self
            .rewrite(backend, &report.base, STYLIZED_PROMPT_SYSTEM_PROMPT, filter_enabled, &mut report.flagged)
            .await
        {
            Ok(stylized) => {
                info!("Midjourney prompt stylized by {}", backend.name());
                report.bundle.midjourney = self.with_midjourney_suffix(&stylized);
            }
            Err(err) => {
                warn!("Midjourney rewrite failed, using cleaned tags: {}", err);
                record_backend_error(&mut report, err);
            }
        }
        report
    }

    async fn rewrite(
        &self,
        backend: &dyn GenerativeBackend,
        base: &str,
        instruction: &str,
        filter_enabled: bool,
        flagged: &mut bool,
    ) -> Result<String, BackendError> {
        let request = TextRequest::text(base).with_system(instruction);
        let rewritten = backend.generate_text(request).await?;
        let rewritten = rewritten.trim();
        let rewritten = if filter_enabled {
            let outcome = self.filter.filter(rewritten);
            *flagged |= outcome.flagged;
            outcome.cleaned_text
        } else {
            rewritten.to_string()
        };
        if rewritten.is_empty() {
            return Err(BackendError::Failed(
                "Backend returned an empty rewrite".to_string(),
            ));
        }
        Ok(rewritten)
    }
}

fn record_backend_error(report: &mut SynthesisReport, err: BackendError) {
    let replace = match &report.backend_error {
        None => true,
        Some(existing) => err.is_blocked() && !existing.is_blocked(),
    };
    if replace {
        report.backend_error = Some(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_fixtures::sample_catalog;
    use crate::llm::backend::fake::ScriptedBackend;

    fn selection(catalog: &TagCatalog, ids: &[&str]) -> Vec<Tag> {
        ids.iter()
            .map(|id| {
                let tag = catalog.tag(id).unwrap();
                if tag.allow_multiple_selections {
                    tag.instantiate()
                } else {
                    tag.clone()
                }
            })
            .collect()
    }

    #[test]
    fn merges_hyphen_modifiers_into_following_tag() {
        let catalog = sample_catalog();
        let filter = SensitiveWordFilter::default();
        let synth = PromptSynthesizer::new(&catalog, &filter, SynthesisSettings::default());
        let tags = selection(&catalog, &["g-girl", "mod-red", "dress"]);

        let report = synth.synthesize_offline(&tags, None, false);
        assert_eq!(report.bundle.image_prompt, "1girl, reddress");
        assert!(!report.flagged);
    }

    #[test]
    fn trailing_and_stacked_modifiers() {
        let catalog = sample_catalog();
        let tags = selection(&catalog, &["mod-big", "mod-red", "dress", "g-girl", "mod-red"]);
        assert_eq!(join_tag_names(&tags), "bigreddress, 1girl, red");
    }

    #[test]
    fn sensitive_filter_flags_and_removes_words_from_source_text() {
        let catalog = sample_catalog();
        let filter = SensitiveWordFilter::default();
        let synth = PromptSynthesizer::new(&catalog, &filter, SynthesisSettings::default());

        let report = synth.synthesize_offline(&[], Some("1girl, nude, standing"), true);
        assert!(report.flagged);
        assert_eq!(report.bundle.image_prompt, "1girl, standing");
        assert!(!report.bundle.stable_diffusion.contains("nude"));

        let unfiltered = synth.synthesize_offline(&[], Some("1girl, nude, standing"), false);
        assert!(!unfiltered.flagged);
        assert_eq!(unfiltered.bundle.image_prompt, "1girl, nude, standing");
    }

    #[test]
    fn dialects_use_prefix_and_single_suffix() {
        let catalog = sample_catalog();
        let filter = SensitiveWordFilter::default();
        let settings = SynthesisSettings {
            quality_prefix: "masterpiece".to_string(),
            midjourney_suffix: "--v 6".to_string(),
        };
        let synth = PromptSynthesizer::new(&catalog, &filter, settings);

        let report = synth.synthesize_offline(&[], Some("a cat on a roof"), false);
        assert_eq!(report.bundle.stable_diffusion, "masterpiece, a cat on a roof");
        assert_eq!(report.bundle.midjourney, "a cat on a roof --v 6");

        let suffixed = synth.synthesize_offline(&[], Some("a cat on a roof --v 6"), false);
        assert_eq!(suffixed.bundle.midjourney, "a cat on a roof --v 6");
    }

    #[test]
    fn empty_base_gives_empty_text_dialects() {
        let catalog = sample_catalog();
        let filter = SensitiveWordFilter::default();
        let synth = PromptSynthesizer::new(&catalog, &filter, SynthesisSettings::default());

        let report = synth.synthesize_offline(&[], Some("(masterpiece:1.2), best quality"), false);
        assert_eq!(report.bundle.stable_diffusion, "");
        assert_eq!(report.bundle.midjourney, "");
        assert_eq!(report.bundle.image_prompt, "");
        assert_eq!(report.bundle.structured_dump, "[]");
    }

    #[test]
    fn structured_dump_uses_display_names_and_sentinel() {
        let catalog = sample_catalog();
        let filter = SensitiveWordFilter::default();
        let synth = PromptSynthesizer::new(&catalog, &filter, SynthesisSettings::default());
        let mut tags = selection(&catalog, &["g-girl", "expr-smile"]);
        tags[0].is_locked = true;

        let report = synth.synthesize_offline(&tags, None, false);
        let dumped: Vec<StructuredTag> =
            serde_json::from_str(&report.bundle.structured_dump).unwrap();
        assert_eq!(dumped.len(), 2);
        assert_eq!(dumped[0].category_display_name, "Character");
        assert_eq!(dumped[0].sub_category_display_name, "Gender");
        assert_eq!(dumped[0].localized_name, "女孩");
        assert!(dumped[0].is_locked);
        assert_eq!(dumped[1].sub_category_display_name, NOT_APPLICABLE);

        let raw: serde_json::Value = serde_json::from_str(&report.bundle.structured_dump).unwrap();
        assert!(raw[1].get("subCategoryDisplayName").is_some());
        assert!(raw[1].get("isLocked").is_some());
    }

    #[tokio::test]
    async fn backend_rewrites_image_prompt_and_midjourney() {
        let catalog = sample_catalog();
        let filter = SensitiveWordFilter::default();
        let backend = ScriptedBackend::new(vec![
            Ok(" A girl in a red dress. ".to_string()),
            Ok("girl in crimson, cinematic light".to_string()),
        ]);
        let synth = PromptSynthesizer::new(&catalog, &filter, SynthesisSettings::default())
            .with_backend(Some(&backend));
        let tags = selection(&catalog, &["g-girl", "mod-red", "dress"]);

        let report = synth.synthesize(&tags, None, true).await;
        assert_eq!(report.bundle.image_prompt, "A girl in a red dress.");
        assert_eq!(
            report.bundle.midjourney,
            format!("girl in crimson, cinematic light {}", DEFAULT_MIDJOURNEY_SUFFIX)
        );
        assert_eq!(
            report.bundle.stable_diffusion,
            format!("{}, 1girl, reddress", DEFAULT_QUALITY_PREFIX)
        );
        assert_eq!(report.base, "1girl, reddress");
        assert!(report.backend_error.is_none());

        let requests = backend.requests.lock();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[0].system_instruction.as_deref(),
            Some(IMAGE_PROMPT_SYSTEM_PROMPT)
        );
        assert_eq!(
            requests[1].system_instruction.as_deref(),
            Some(STYLIZED_PROMPT_SYSTEM_PROMPT)
        );
    }

    #[tokio::test]
    async fn stylized_rewrite_keeps_a_single_suffix() {
        let catalog = sample_catalog();
        let filter = SensitiveWordFilter::default();
        let settings = SynthesisSettings {
            quality_prefix: String::new(),
            midjourney_suffix: "--v 6".to_string(),
        };
        let backend = ScriptedBackend::new(vec![
            Ok("A girl in a dress.".to_string()),
            Ok("  girl, flowing dress --v 6 ".to_string()),
        ]);
        let synth = PromptSynthesizer::new(&catalog, &filter, settings).with_backend(Some(&backend));
        let tags = selection(&catalog, &["g-girl", "dress"]);

        let report = synth.synthesize(&tags, None, false).await;
        assert_eq!(report.bundle.midjourney, "girl, flowing dress --v 6");
    }

    #[tokio::test]
    async fn failed_stylized_rewrite_falls_back_to_suffixed_base() {
        let catalog = sample_catalog();
        let filter = SensitiveWordFilter::default();
        let backend = ScriptedBackend::new(vec![
            Ok("A girl in a dress.".to_string()),
            Err(BackendError::Blocked { reason: None }),
        ]);
        let synth = PromptSynthesizer::new(&catalog, &filter, SynthesisSettings::default())
            .with_backend(Some(&backend));
        let tags = selection(&catalog, &["g-girl", "dress"]);

        let report = synth.synthesize(&tags, None, false).await;
        assert_eq!(report.bundle.image_prompt, "A girl in a dress.");
        assert_eq!(
            report.bundle.midjourney,
            format!("1girl, dress {}", DEFAULT_MIDJOURNEY_SUFFIX)
        );
        assert!(report.backend_error.as_ref().is_some_and(BackendError::is_blocked));
    }

    #[tokio::test]
    async fn blocked_and_failed_backends_fall_back_distinctly() {
        let catalog = sample_catalog();
        let filter = SensitiveWordFilter::default();
        let tags = selection(&catalog, &["g-girl", "dress"]);

        let blocked = ScriptedBackend::new(vec![Err(BackendError::Blocked {
            reason: Some("SAFETY".to_string()),
        })]);
        let synth = PromptSynthesizer::new(&catalog, &filter, SynthesisSettings::default())
            .with_backend(Some(&blocked));
        let report = synth.synthesize(&tags, None, false).await;
        assert_eq!(report.bundle.image_prompt, "1girl, dress");
        assert_eq!(
            report.bundle.midjourney,
            format!("1girl, dress {}", DEFAULT_MIDJOURNEY_SUFFIX)
        );
        assert!(report.backend_error.as_ref().is_some_and(BackendError::is_blocked));
        assert!(!report.bundle.stable_diffusion.is_empty());

        let failed = ScriptedBackend::new(vec![Err(BackendError::Failed("timeout".to_string()))]);
        let synth = PromptSynthesizer::new(&catalog, &filter, SynthesisSettings::default())
            .with_backend(Some(&failed));
        let report = synth.synthesize(&tags, None, false).await;
        assert_eq!(report.bundle.image_prompt, "1girl, dress");
        assert_eq!(
            report.backend_error,
            Some(BackendError::Failed("timeout".to_string()))
        );
    }

    #[tokio::test]
    async fn empty_base_skips_backend() {
        let catalog = sample_catalog();
        let filter = SensitiveWordFilter::default();
        let backend = ScriptedBackend::new(vec![Ok("should not be used".to_string())]);
        let synth = PromptSynthesizer::new(&catalog, &filter, SynthesisSettings::default())
            .with_backend(Some(&backend));

        let report = synth.synthesize(&[], None, true).await;
        assert_eq!(report.bundle.image_prompt, "");
        assert!(backend.requests.lock().is_empty());
    }
}
