use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use dotenvy::dotenv;
use tracing::{info, warn};

use prompt_tag_studio::catalog::load_catalog;
use prompt_tag_studio::config::CONFIG;
use prompt_tag_studio::db::{HistoryStore, SqliteHistory};
use prompt_tag_studio::llm::backend::GenerativeBackend;
use prompt_tag_studio::llm::gemini::GeminiBackend;
use prompt_tag_studio::llm::media::is_image;
use prompt_tag_studio::persona::load_slots;
use prompt_tag_studio::prompt::sensitive::SensitiveWordFilter;
use prompt_tag_studio::utils::logging::init_logging;
use prompt_tag_studio::{Notice, SynthesisOutcome, Workbench, WorkbenchSettings};

fn usage() -> &'static str {
    "Usage: prompt_tag_studio [--text <description>] [--metadata <file>] [--caption <image>] [--render <out.png>]"
}

#[derive(Debug, Default)]
struct SessionArgs {
    text: Option<String>,
    metadata: Option<PathBuf>,
    caption: Option<PathBuf>,
    render: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> Result<SessionArgs> {
    let mut parsed = SessionArgs::default();
    let mut index = 1;
    while index < args.len() {
        let flag = args[index].as_str();
        if matches!(flag, "--help" | "-h") {
            return Err(anyhow!(usage()));
        }
        index += 1;
        let value = args
            .get(index)
            .ok_or_else(|| anyhow!("Missing value for {flag}\n{}", usage()))?;
        match flag {
            "--text" => parsed.text = Some(value.clone()),
            "--metadata" => parsed.metadata = Some(PathBuf::from(value)),
            "--caption" => parsed.caption = Some(PathBuf::from(value)),
            "--render" => parsed.render = Some(PathBuf::from(value)),
            other => return Err(anyhow!("Unknown argument: {other}\n{}", usage())),
        }
        index += 1;
    }
    Ok(parsed)
}

fn report(notices: &[Notice]) {
    for notice in notices {
        warn!(kind = ?notice.kind, "{}", notice.message);
        eprintln!("! {}", notice);
    }
}

fn load_filter(path: Option<&Path>) -> Result<SensitiveWordFilter> {
    match path {
        Some(path) => SensitiveWordFilter::load(path),
        None => Ok(SensitiveWordFilter::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let _guards = init_logging(&CONFIG.log_level, Path::new("logs"));
    let args: Vec<String> = std::env::args().collect();
    let session = parse_args(&args)?;

    info!("Starting prompt tag studio");
    let catalog = Arc::new(load_catalog(&CONFIG.catalog_path)?);
    let slots = load_slots(&CONFIG.persona_slots_path)?;
    let filter = load_filter(CONFIG.sensitive_words_path.as_deref())?;

    let history = SqliteHistory::init(&CONFIG.database_url, CONFIG.history_limit).await?;
    history.health_check().await?;
    let history: Arc<dyn HistoryStore> = Arc::new(history);

    let backend = GeminiBackend::from_config(&CONFIG)
        .map(|backend| Arc::new(backend) as Arc<dyn GenerativeBackend>);
    if backend.is_none() {
        info!("GEMINI_API_KEY is not set; running offline");
    }

    let workbench = Workbench::new(catalog, history, WorkbenchSettings::from_config(&CONFIG))
        .with_filter(filter)
        .with_backend(backend);

    let mut source_text = None;
    if let Some(path) = &session.caption {
        let bytes = fs::read(path)?;
        if !is_image(&bytes) {
            return Err(anyhow!("{} is not an image", path.display()));
        }
        match workbench.caption_image(&bytes).await {
            Ok(caption) => source_text = Some(caption),
            Err(notice) => report(&[notice]),
        }
    } else if let Some(path) = &session.metadata {
        let raw = fs::read_to_string(path)?;
        let (parameters, notices) = workbench.import_metadata(&raw);
        report(&notices);
        if !parameters.negative.is_empty() {
            println!("Negative prompt: {}", parameters.negative);
        }
    } else if let Some(text) = &session.text {
        if workbench.is_online() {
            report(&workbench.extract_from_text(text).await);
        } else {
            source_text = Some(text.clone());
        }
    } else {
        let notices = workbench.randomize(&slots, &mut rand::thread_rng());
        report(&notices);
    }

    let names: Vec<String> = workbench.tags().into_iter().map(|tag| tag.name).collect();
    println!("Tags: {}", names.join(", "));

    let record = match workbench.synthesize(source_text.as_deref()).await {
        SynthesisOutcome::Completed { record, notices } => {
            report(&notices);
            record
        }
        SynthesisOutcome::Stale => return Err(anyhow!("Synthesis was superseded")),
    };

    println!("Stable Diffusion: {}", record.prompts.stable_diffusion);
    println!("Midjourney: {}", record.prompts.midjourney);
    println!("Image prompt: {}", record.prompts.image_prompt);
    println!("Structured: {}", record.prompts.structured_dump);

    if let Some(path) = &session.render {
        match workbench.render_image(&record).await {
            Ok(image) => {
                fs::write(path, image)?;
                println!("Rendered image written to {}", path.display());
            }
            Err(notice) => report(&[notice]),
        }
    }

    Ok(())
}
