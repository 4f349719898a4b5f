pub mod loader;
pub mod types;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use loader::{load_catalog, parse_catalog};
pub use types::{Category, SubCategory, Tag, TagCatalog, CUSTOM_CATEGORY_ID};
