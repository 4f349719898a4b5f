pub mod database;
pub mod history;
pub mod models;

pub use database::SqliteHistory;
pub use history::{HistoryStore, MemoryHistory};
pub use models::{snapshot_key, HistoryRecord};
