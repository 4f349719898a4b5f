use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::catalog::types::{Category, SubCategory, Tag, TagCatalog};

#[derive(Debug, Deserialize)]
struct CatalogFile {
    categories: Vec<CategoryEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CategoryEntry {
    id: String,
    name: String,
    #[serde(default)]
    localized_name: Option<String>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    tags: Vec<TagEntry>,
    #[serde(default)]
    sub_categories: Vec<SubCategoryEntry>,
    #[serde(default)]
    is_input_category: bool,
    #[serde(default)]
    allow_multiple_selections: bool,
    #[serde(default)]
    nsfw: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubCategoryEntry {
    id: String,
    name: String,
    #[serde(default)]
    localized_name: Option<String>,
    #[serde(default)]
    tags: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TagEntry {
    id: String,
    name: String,
    #[serde(default)]
    localized_name: Option<String>,
}

struct TagContext<'a> {
    category: &'a CategoryEntry,
    sub_category_id: Option<&'a str>,
}

fn build_tags(
    entries: &[TagEntry],
    context: TagContext<'_>,
    seen_ids: &mut HashSet<String>,
) -> Vec<Tag> {
    let mut tags = Vec::new();
    for entry in entries {
        let id = entry.id.trim();
        let name = entry.name.trim();
        if id.is_empty() || name.is_empty() {
            warn!(
                "Skipping catalog tag with empty id or name in category {}",
                context.category.id
            );
            continue;
        }
        if !seen_ids.insert(id.to_string()) {
            warn!("Skipping duplicate catalog tag id {}", id);
            continue;
        }
        let localized_name = entry
            .localized_name
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(name);
        tags.push(Tag {
            id: id.to_string(),
            name: name.to_string(),
            localized_name: localized_name.to_string(),
            category_id: context.category.id.trim().to_string(),
            sub_category_id: context.sub_category_id.map(str::to_string),
            original_id: None,
            allow_multiple_selections: context.category.allow_multiple_selections,
            is_custom: context.category.is_input_category,
            is_locked: false,
        });
    }
    tags
}

fn build_category(entry: &CategoryEntry, seen_ids: &mut HashSet<String>) -> Result<Category> {
    let id = entry.id.trim();
    if id.is_empty() {
        return Err(anyhow!("Catalog category id cannot be empty"));
    }
    if !entry.tags.is_empty() && !entry.sub_categories.is_empty() {
        warn!(
            "Category {} declares both flat tags and subcategories; keeping both",
            id
        );
    }

    let tags = build_tags(
        &entry.tags,
        TagContext {
            category: entry,
            sub_category_id: None,
        },
        seen_ids,
    );

    let mut sub_categories = Vec::new();
    for sub in &entry.sub_categories {
        let sub_id = sub.id.trim();
        if sub_id.is_empty() {
            return Err(anyhow!("Subcategory id cannot be empty in category {}", id));
        }
        let sub_tags = build_tags(
            &sub.tags,
            TagContext {
                category: entry,
                sub_category_id: Some(sub_id),
            },
            seen_ids,
        );
        sub_categories.push(SubCategory {
            id: sub_id.to_string(),
            name: sub.name.trim().to_string(),
            localized_name: sub
                .localized_name
                .clone()
                .unwrap_or_else(|| sub.name.trim().to_string()),
            tags: sub_tags,
        });
    }

    Ok(Category {
        id: id.to_string(),
        name: entry.name.trim().to_string(),
        localized_name: entry
            .localized_name
            .clone()
            .unwrap_or_else(|| entry.name.trim().to_string()),
        color: entry.color.clone().unwrap_or_default(),
        tags,
        sub_categories,
        is_input_category: entry.is_input_category,
        allow_multiple_selections: entry.allow_multiple_selections,
        nsfw: entry.nsfw,
    })
}

pub fn parse_catalog(raw: &str) -> Result<TagCatalog> {
    let parsed: CatalogFile =
        serde_json::from_str(raw).map_err(|err| anyhow!("Failed to parse tag catalog: {}", err))?;

    let mut seen_category_ids = HashSet::new();
    let mut seen_tag_ids = HashSet::new();
    let mut categories = Vec::new();
    for entry in &parsed.categories {
        if !seen_category_ids.insert(entry.id.trim().to_string()) {
            return Err(anyhow!("Duplicate catalog category id {}", entry.id.trim()));
        }
        categories.push(build_category(entry, &mut seen_tag_ids)?);
    }

    Ok(TagCatalog::new(categories))
}

pub fn load_catalog(path: &Path) -> Result<TagCatalog> {
    let raw = fs::read_to_string(path)
        .map_err(|err| anyhow!("Failed to read tag catalog '{}': {}", path.display(), err))?;
    let catalog = parse_catalog(&raw)?;
    info!(
        "Loaded {} categories and {} tags from {}",
        catalog.categories().len(),
        catalog.tag_count(),
        path.display()
    );
    Ok(catalog)
}
