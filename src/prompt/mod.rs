pub mod cleaner;
pub mod import;
pub mod sensitive;
pub mod synth;
pub mod templates;

pub use cleaner::{clean_prompt, polish_separators};
pub use import::{
    describe_image, extract_tags, import_structured_dump, parse_generation_parameters,
    tags_from_prompt, GenerationParameters,
};
pub use sensitive::{FilterOutcome, SensitiveWordFilter};
pub use synth::{PromptBundle, PromptSynthesizer, StructuredTag, SynthesisReport, SynthesisSettings};
