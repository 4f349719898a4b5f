use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use tracing::{info, warn};

use crate::catalog::{Tag, TagCatalog};
use crate::config::Config;
use crate::db::{HistoryRecord, HistoryStore};
use crate::llm::backend::{BackendError, GenerativeBackend};
use crate::llm::media::thumbnail_png;
use crate::persona::{GeneratorSettings, PersonaGenerator, Slot};
use crate::prompt::import::{
    describe_image, extract_tags, import_structured_dump, parse_generation_parameters,
    tags_from_prompt, GenerationParameters,
};
use crate::prompt::sensitive::SensitiveWordFilter;
use crate::prompt::synth::{PromptBundle, PromptSynthesizer, SynthesisSettings};
use crate::selection::{AddOutcome, ReplaceOutcome, SelectionError, TagSelection};
use crate::utils::timing::OperationTimer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    BudgetExceeded,
    TagLocked,
    NotFound,
    InvalidOrder,
    ContentBlocked,
    BackendError,
    EmptySlot,
    SensitiveWords,
    Import,
    History,
}

/// User-visible, non-fatal message produced at the workbench boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Notice {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<SelectionError> for Notice {
    fn from(err: SelectionError) -> Self {
        let kind = match &err {
            SelectionError::BudgetExceeded { .. } => NoticeKind::BudgetExceeded,
            SelectionError::TagLocked { .. } => NoticeKind::TagLocked,
            SelectionError::NotFound(_) => NoticeKind::NotFound,
            SelectionError::InvalidOrder => NoticeKind::InvalidOrder,
        };
        Notice::new(kind, err.to_string())
    }
}

impl From<BackendError> for Notice {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Blocked { .. } => Notice::new(
                NoticeKind::ContentBlocked,
                "The generative service refused this prompt on content-policy grounds; showing the tag-based prompt instead.",
            ),
            BackendError::Failed(message) => Notice::new(
                NoticeKind::BackendError,
                format!("The generative service is unavailable ({}); showing the tag-based prompt instead.", message),
            ),
        }
    }
}

fn replace_notices(outcome: ReplaceOutcome, limit: usize) -> Vec<Notice> {
    let mut notices = Vec::new();
    if outcome.budget_exceeded() {
        notices.push(Notice::from(SelectionError::BudgetExceeded { limit }));
    }
    notices
}

#[derive(Debug, Clone)]
pub struct WorkbenchSettings {
    pub filter_enabled: bool,
    pub generator: GeneratorSettings,
    pub synthesis: SynthesisSettings,
    pub history_limit: usize,
}

impl WorkbenchSettings {
    pub fn from_config(config: &Config) -> Self {
        WorkbenchSettings {
            filter_enabled: config.sensitive_filter_enabled,
            generator: config.generator_settings(),
            synthesis: config.synthesis_settings(),
            history_limit: config.history_limit,
        }
    }
}

impl Default for WorkbenchSettings {
    fn default() -> Self {
        WorkbenchSettings {
            filter_enabled: true,
            generator: GeneratorSettings::default(),
            synthesis: SynthesisSettings::default(),
            history_limit: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisOutcome {
    Completed {
        record: HistoryRecord,
        notices: Vec<Notice>,
    },
    /// A newer action superseded this request; its result was discarded.
    Stale,
}

/// One authoring session: the shared selection plus everything needed to
/// turn it into prompts.
pub struct Workbench {
    catalog: Arc<TagCatalog>,
    selection: Mutex<TagSelection>,
    request_token: AtomicU64,
    history: Arc<dyn HistoryStore>,
    backend: Option<Arc<dyn GenerativeBackend>>,
    filter: SensitiveWordFilter,
    settings: WorkbenchSettings,
}

impl Workbench {
    pub fn new(
        catalog: Arc<TagCatalog>,
        history: Arc<dyn HistoryStore>,
        settings: WorkbenchSettings,
    ) -> Self {
        Workbench {
            catalog,
            selection: Mutex::new(TagSelection::new(settings.generator.max_tokens)),
            request_token: AtomicU64::new(0),
            history,
            backend: None,
            filter: SensitiveWordFilter::default(),
            settings,
        }
    }

    pub fn with_backend(mut self, backend: Option<Arc<dyn GenerativeBackend>>) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_filter(mut self, filter: SensitiveWordFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn catalog(&self) -> &TagCatalog {
        &self.catalog
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    pub fn is_online(&self) -> bool {
        self.backend.is_some()
    }

    pub fn tags(&self) -> Vec<Tag> {
        self.selection.lock().tags().to_vec()
    }

    /// Invalidates any in-flight request.
    fn supersede(&self) -> u64 {
        self.request_token.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, token: u64) -> bool {
        self.request_token.load(Ordering::SeqCst) == token
    }

    /// Applies a selection change; in-flight requests are superseded only
    /// when the selection actually changed.
    fn mutate<T>(&self, apply: impl FnOnce(&mut TagSelection) -> T) -> T {
        let (result, changed) = {
            let mut selection = self.selection.lock();
            let before = selection.tags().to_vec();
            let result = apply(&mut *selection);
            let changed = selection.tags() != before.as_slice();
            (result, changed)
        };
        if changed {
            self.supersede();
        }
        result
    }

    fn replace_selection(&self, tags: Vec<Tag>) -> Vec<Notice> {
        let limit = self.settings.generator.max_tokens;
        let outcome = self.mutate(|selection| selection.replace_all(tags, true));
        replace_notices(outcome, limit)
    }

    pub fn add(&self, tag_id: &str) -> Result<AddOutcome, Notice> {
        let tag = self.catalog.tag(tag_id).ok_or_else(|| {
            Notice::new(NoticeKind::NotFound, format!("Unknown tag {}", tag_id))
        })?;
        Ok(self.mutate(|selection| selection.add(tag))?)
    }

    /// Adds free text as a tag in the catalog's input category.
    pub fn add_custom(&self, text: &str) -> Result<AddOutcome, Notice> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Notice::new(NoticeKind::Import, "Nothing to add"));
        }
        let tag = Tag::custom(text, self.catalog.input_category_id());
        Ok(self.mutate(|selection| selection.add(&tag))?)
    }

    pub fn remove(&self, tag_id: &str) -> Result<(), Notice> {
        self.mutate(|selection| selection.remove(tag_id))?;
        Ok(())
    }

    pub fn toggle_lock(&self, tag_id: &str) -> Result<bool, Notice> {
        Ok(self.mutate(|selection| selection.toggle_lock(tag_id))?)
    }

    pub fn unlock_all(&self) {
        self.mutate(TagSelection::unlock_all);
    }

    pub fn reorder(&self, order: &[String]) -> Result<(), Notice> {
        Ok(self.mutate(|selection| selection.reorder(order))?)
    }

    pub fn clear(&self, keep_locked: bool) {
        self.mutate(|selection| selection.clear(keep_locked));
    }

    /// Replaces unlocked tags with a random persona.
    pub fn randomize<R: Rng + ?Sized>(&self, slots: &[Slot], rng: &mut R) -> Vec<Notice> {
        let mut timer = OperationTimer::start("randomize", None);
        let locked = self.selection.lock().locked_tags();
        let generator = PersonaGenerator::new(&self.catalog, self.settings.generator);
        let report = generator.generate(slots, &locked, rng);

        let mut notices = Vec::new();
        if let Some(warning) = report.warning() {
            notices.push(Notice::new(NoticeKind::EmptySlot, warning));
        }
        if report.budget_exceeded() {
            notices.push(Notice::from(SelectionError::BudgetExceeded {
                limit: self.settings.generator.max_tokens,
            }));
        }
        notices.extend(self.replace_selection(report.tags));
        timer.mark_status("success", Some(format!("new_tags={}", report.new_tags)));
        notices
    }

    /// Applies an SD-WebUI parameters block; locked tags are kept.
    pub fn import_metadata(&self, text: &str) -> (GenerationParameters, Vec<Notice>) {
        let parameters = parse_generation_parameters(text);
        let tags = tags_from_prompt(&parameters.positive, &self.catalog);
        if tags.is_empty() {
            return (
                parameters,
                vec![Notice::new(NoticeKind::Import, "No prompt found in the imported metadata")],
            );
        }
        info!("Importing {} tag(s) from metadata", tags.len());
        let notices = self.replace_selection(tags);
        (parameters, notices)
    }

    pub fn import_dump(&self, raw: &str) -> Vec<Notice> {
        match import_structured_dump(raw, &self.catalog) {
            Ok(tags) => self.replace_selection(tags),
            Err(err) => {
                warn!("Structured dump import failed: {err}");
                vec![Notice::new(NoticeKind::Import, err.to_string())]
            }
        }
    }

    fn require_backend(&self) -> Result<Arc<dyn GenerativeBackend>, Notice> {
        self.backend.clone().ok_or_else(|| {
            Notice::new(NoticeKind::BackendError, "No generative backend is configured")
        })
    }

    /// Replaces unlocked tags with tags extracted from a free description.
    pub async fn extract_from_text(&self, text: &str) -> Vec<Notice> {
        let backend = match self.require_backend() {
            Ok(backend) => backend,
            Err(notice) => return vec![notice],
        };
        let token = self.supersede();
        let mut timer = OperationTimer::start("extract_tags", Some(token));
        match extract_tags(backend.as_ref(), text, &self.catalog).await {
            Ok(_) if !self.is_current(token) => {
                timer.mark_status("stale", None);
                Vec::new()
            }
            Ok(tags) => self.replace_selection(tags),
            Err(err) => {
                timer.mark_status("error", Some(err.to_string()));
                vec![Notice::from(err)]
            }
        }
    }

    pub async fn caption_image(&self, bytes: &[u8]) -> Result<String, Notice> {
        let backend = self.require_backend()?;
        Ok(describe_image(backend.as_ref(), bytes).await?)
    }

    /// Builds all dialects from the selection (or `source_text`) and records
    /// the result, unless a newer action superseded the request meanwhile.
    pub async fn synthesize(&self, source_text: Option<&str>) -> SynthesisOutcome {
        let token = self.supersede();
        let mut timer = OperationTimer::start("synthesize", Some(token));
        let tags = self.tags();

        let synthesizer = PromptSynthesizer::new(
            &self.catalog,
            &self.filter,
            self.settings.synthesis.clone(),
        )
        .with_backend(self.backend.as_deref());
        let report = synthesizer
            .synthesize(&tags, source_text, self.settings.filter_enabled)
            .await;

        if !self.is_current(token) {
            info!("Discarding superseded synthesis result {}", token);
            timer.mark_status("stale", None);
            return SynthesisOutcome::Stale;
        }

        let mut notices = Vec::new();
        if report.flagged {
            notices.push(Notice::new(
                NoticeKind::SensitiveWords,
                "Sensitive words were removed from the prompt",
            ));
        }
        if let Some(err) = report.backend_error {
            timer.mark_status("fallback", Some(err.to_string()));
            notices.push(Notice::from(err));
        }

        let record = HistoryRecord::new(tags, source_text.map(str::to_string), report.bundle);
        if let Err(err) = self.history.save(record.clone()).await {
            warn!("Failed to save history record: {err}");
            notices.push(Notice::new(NoticeKind::History, "Could not save this prompt to history"));
        }
        SynthesisOutcome::Completed { record, notices }
    }

    /// Loads an archived record's tags back into the selection.
    pub fn restore(&self, record: &HistoryRecord) -> Vec<Notice> {
        self.replace_selection(record.tags.clone())
    }

    pub async fn history_entries(&self) -> Result<Vec<HistoryRecord>, Notice> {
        self.history.list().await.map_err(history_notice)
    }

    pub async fn delete_history(&self, id: &str) -> Result<bool, Notice> {
        self.history.delete(id).await.map_err(history_notice)
    }

    pub async fn clear_history(&self) -> Result<(), Notice> {
        self.history.clear().await.map_err(history_notice)
    }

    /// Renders the record's image prompt and stores a thumbnail with it.
    pub async fn render_image(&self, record: &HistoryRecord) -> Result<Vec<u8>, Notice> {
        let backend = self.require_backend()?;
        let prompt = pick_render_prompt(&record.prompts);
        if prompt.is_empty() {
            return Err(Notice::new(NoticeKind::Import, "Nothing to render"));
        }
        let mut timer = OperationTimer::start("render_image", None);
        let image = backend.generate_image(prompt).await.map_err(|err| {
            timer.mark_status("error", Some(err.to_string()));
            Notice::from(err)
        })?;

        match thumbnail_png(&image) {
            Ok(thumbnail) => {
                let updated = record.clone().with_thumbnail(Some(thumbnail));
                if let Err(err) = self.history.save(updated).await {
                    warn!("Failed to attach thumbnail to history: {err}");
                }
            }
            Err(err) => warn!("Skipping thumbnail: {err}"),
        }
        Ok(image)
    }
}

fn history_notice(err: anyhow::Error) -> Notice {
    warn!("History store error: {err}");
    Notice::new(NoticeKind::History, "History is unavailable")
}

fn pick_render_prompt(prompts: &PromptBundle) -> &str {
    if prompts.image_prompt.trim().is_empty() {
        prompts.stable_diffusion.trim()
    } else {
        prompts.image_prompt.trim()
    }
}
