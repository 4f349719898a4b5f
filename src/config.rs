use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use tracing::warn;

use crate::persona::GeneratorSettings;
use crate::prompt::synth::SynthesisSettings;
use crate::selection::DEFAULT_MAX_TOKENS;

pub const DEFAULT_QUALITY_PREFIX: &str = "masterpiece, best quality, ultra-detailed";
pub const DEFAULT_MIDJOURNEY_SUFFIX: &str = "--v 6 --style raw";

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub database_url: String,
    pub gemini_api_key: String,
    pub gemini_text_model: String,
    pub gemini_image_model: String,
    pub gemini_temperature: f32,
    pub gemini_top_k: i32,
    pub gemini_top_p: f32,
    pub gemini_max_output_tokens: i32,
    pub gemini_safety_settings: String,
    pub max_tokens: usize,
    pub history_limit: usize,
    pub catalog_path: PathBuf,
    pub persona_slots_path: PathBuf,
    pub sensitive_words_path: Option<PathBuf>,
    pub sensitive_filter_enabled: bool,
    pub include_nsfw: bool,
    pub hair_drop_length_probability: f64,
    pub expression_positive_bias: f64,
    pub quality_prefix: String,
    pub midjourney_suffix: String,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_f32(name: &str, default: f32) -> f32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<f32>().ok())
        .unwrap_or(default)
}

fn env_f64(name: &str, default: f64) -> f64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<f64>().ok())
        .unwrap_or(default)
}

fn env_i32(name: &str, default: i32) -> i32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<i32>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_path(name: &str) -> Option<PathBuf> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn normalize_database_url(value: String) -> String {
    if value.starts_with("sqlite+aiosqlite://") {
        return value.replacen("sqlite+aiosqlite://", "sqlite://", 1);
    }
    value
}

fn normalize_gemini_safety_settings(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "standard".to_string();
    }

    let lowered = trimmed.to_lowercase();
    match lowered.as_str() {
        "permissive" | "off" | "none" => "permissive".to_string(),
        "standard" => "standard".to_string(),
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}'; defaulting to standard.",
                value
            );
            "standard".to_string()
        }
    }
}

fn validate_probability(name: &str, value: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&value) {
        return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
    }
    Ok(value)
}

impl Config {
    pub fn load() -> Result<Self> {
        let max_tokens = env_usize("MAX_TOKENS", DEFAULT_MAX_TOKENS);
        if max_tokens == 0 {
            return Err(anyhow!("MAX_TOKENS must be greater than zero"));
        }

        Ok(Config {
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            database_url: normalize_database_url(env_string(
                "DATABASE_URL",
                "sqlite://studio.db",
            )),
            gemini_api_key: env_string("GEMINI_API_KEY", ""),
            gemini_text_model: env_string("GEMINI_TEXT_MODEL", "gemini-2.0-flash"),
            gemini_image_model: env_string(
                "GEMINI_IMAGE_MODEL",
                "gemini-2.0-flash-preview-image-generation",
            ),
            gemini_temperature: env_f32("GEMINI_TEMPERATURE", 0.7),
            gemini_top_k: env_i32("GEMINI_TOP_K", 40),
            gemini_top_p: env_f32("GEMINI_TOP_P", 0.95),
            gemini_max_output_tokens: env_i32("GEMINI_MAX_OUTPUT_TOKENS", 2048),
            gemini_safety_settings: normalize_gemini_safety_settings(env_string(
                "GEMINI_SAFETY_SETTINGS",
                "standard",
            )),
            max_tokens,
            history_limit: env_usize("HISTORY_LIMIT", 50),
            catalog_path: env_path("CATALOG_PATH")
                .unwrap_or_else(|| PathBuf::from("data/catalog.json")),
            persona_slots_path: env_path("PERSONA_SLOTS_PATH")
                .unwrap_or_else(|| PathBuf::from("data/persona_slots.yaml")),
            sensitive_words_path: env_path("SENSITIVE_WORDS_PATH"),
            sensitive_filter_enabled: env_bool("SENSITIVE_FILTER_ENABLED", true),
            include_nsfw: env_bool("INCLUDE_NSFW", false),
            hair_drop_length_probability: validate_probability(
                "HAIR_DROP_LENGTH_PROBABILITY",
                env_f64("HAIR_DROP_LENGTH_PROBABILITY", 0.5),
            )?,
            expression_positive_bias: validate_probability(
                "EXPRESSION_POSITIVE_BIAS",
                env_f64("EXPRESSION_POSITIVE_BIAS", 0.7),
            )?,
            quality_prefix: env_string("QUALITY_PREFIX", DEFAULT_QUALITY_PREFIX),
            midjourney_suffix: env_string("MIDJOURNEY_SUFFIX", DEFAULT_MIDJOURNEY_SUFFIX),
        })
    }

    pub fn offline(&self) -> bool {
        self.gemini_api_key.trim().is_empty()
    }

    pub fn generator_settings(&self) -> GeneratorSettings {
        GeneratorSettings {
            max_tokens: self.max_tokens,
            hair_drop_length_probability: self.hair_drop_length_probability,
            expression_positive_bias: self.expression_positive_bias,
            include_nsfw: self.include_nsfw,
        }
    }

    pub fn synthesis_settings(&self) -> SynthesisSettings {
        SynthesisSettings {
            quality_prefix: self.quality_prefix.clone(),
            midjourney_suffix: self.midjourney_suffix.clone(),
        }
    }
}
