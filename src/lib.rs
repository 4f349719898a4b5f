//! Tag-driven authoring engine for AI image prompts: a curated tag catalog,
//! a lock-aware selection, constrained random personas and multi-dialect
//! prompt synthesis with an optional generative backend.

pub mod catalog;
pub mod config;
pub mod db;
pub mod llm;
pub mod persona;
pub mod prompt;
pub mod selection;
pub mod state;
pub mod utils;

pub use state::{Notice, NoticeKind, SynthesisOutcome, Workbench, WorkbenchSettings};
