pub mod store;

pub use store::{AddOutcome, ReplaceOutcome, SelectionError, TagSelection, DEFAULT_MAX_TOKENS};
