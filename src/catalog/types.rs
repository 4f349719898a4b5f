use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category used for free-text tags when the catalog declares no input category.
pub const CUSTOM_CATEGORY_ID: &str = "custom";

/// A catalog tag definition or a tag instance inside a selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub localized_name: String,
    pub category_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_category_id: Option<String>,
    /// Catalog id this instance was cloned from, set for multi-instance tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_id: Option<String>,
    #[serde(default)]
    pub allow_multiple_selections: bool,
    /// Free-text or derived tag; exempt from per-slot exclusivity.
    #[serde(default)]
    pub is_custom: bool,
    #[serde(default)]
    pub is_locked: bool,
}

impl Tag {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category_id: impl Into<String>,
        sub_category_id: Option<&str>,
    ) -> Self {
        let name = name.into();
        Tag {
            id: id.into(),
            localized_name: name.clone(),
            name,
            category_id: category_id.into(),
            sub_category_id: sub_category_id.map(str::to_string),
            original_id: None,
            allow_multiple_selections: false,
            is_custom: false,
            is_locked: false,
        }
    }

    /// Builds a free-text tag with a fresh id.
    pub fn custom(name: &str, category_id: &str) -> Self {
        let trimmed = name.trim();
        Tag {
            id: format!("custom-{}", Uuid::new_v4()),
            name: trimmed.to_string(),
            localized_name: trimmed.to_string(),
            category_id: category_id.to_string(),
            sub_category_id: None,
            original_id: None,
            allow_multiple_selections: true,
            is_custom: true,
            is_locked: false,
        }
    }

    /// Clones a multi-selection catalog tag into a distinct selection instance.
    pub fn instantiate(&self) -> Self {
        let original = self.original_id.clone().unwrap_or_else(|| self.id.clone());
        Tag {
            id: format!("{}#{}", original, Uuid::new_v4()),
            original_id: Some(original),
            is_locked: false,
            ..self.clone()
        }
    }

    /// Id of the catalog definition behind this tag.
    pub fn catalog_id(&self) -> &str {
        self.original_id.as_deref().unwrap_or(&self.id)
    }

    pub fn is_exclusive(&self) -> bool {
        !self.allow_multiple_selections && !self.is_custom
    }

    pub fn slot_key(&self) -> (&str, Option<&str>) {
        (self.category_id.as_str(), self.sub_category_id.as_deref())
    }

    pub fn with_locked(mut self, locked: bool) -> Self {
        self.is_locked = locked;
        self
    }
}

#[derive(Debug, Clone)]
pub struct SubCategory {
    pub id: String,
    pub name: String,
    pub localized_name: String,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub localized_name: String,
    pub color: String,
    pub tags: Vec<Tag>,
    pub sub_categories: Vec<SubCategory>,
    pub is_input_category: bool,
    pub allow_multiple_selections: bool,
    pub nsfw: bool,
}

impl Category {
    /// Whether the random generator may draw from this category.
    pub fn is_randomizable(&self, include_nsfw: bool) -> bool {
        !self.is_input_category && (include_nsfw || !self.nsfw)
    }

    pub fn all_tags(&self) -> impl Iterator<Item = &Tag> {
        self.tags
            .iter()
            .chain(self.sub_categories.iter().flat_map(|sub| sub.tags.iter()))
    }
}

/// Read-only tag taxonomy, built once and shared by reference.
#[derive(Debug, Clone, Default)]
pub struct TagCatalog {
    categories: Vec<Category>,
    tag_index: HashMap<String, (usize, Option<usize>, usize)>,
}

impl TagCatalog {
    pub fn new(categories: Vec<Category>) -> Self {
        let mut tag_index = HashMap::new();
        for (category_index, category) in categories.iter().enumerate() {
            for (tag_index_in_list, tag) in category.tags.iter().enumerate() {
                tag_index
                    .entry(tag.id.clone())
                    .or_insert((category_index, None, tag_index_in_list));
            }
            for (sub_index, sub) in category.sub_categories.iter().enumerate() {
                for (tag_index_in_list, tag) in sub.tags.iter().enumerate() {
                    tag_index.entry(tag.id.clone()).or_insert((
                        category_index,
                        Some(sub_index),
                        tag_index_in_list,
                    ));
                }
            }
        }
        TagCatalog {
            categories,
            tag_index,
        }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category(&self, category_id: &str) -> Option<&Category> {
        self.categories.iter().find(|category| category.id == category_id)
    }

    pub fn sub_category(&self, category_id: &str, sub_category_id: &str) -> Option<&SubCategory> {
        self.category(category_id)?
            .sub_categories
            .iter()
            .find(|sub| sub.id == sub_category_id)
    }

    pub fn tag(&self, tag_id: &str) -> Option<&Tag> {
        let (category_index, sub_index, tag_index) = *self.tag_index.get(tag_id)?;
        let category = self.categories.get(category_index)?;
        match sub_index {
            Some(sub_index) => category.sub_categories.get(sub_index)?.tags.get(tag_index),
            None => category.tags.get(tag_index),
        }
    }

    pub fn tag_count(&self) -> usize {
        self.tag_index.len()
    }

    /// Tags placed at a taxonomy location. A missing subcategory means the whole category.
    pub fn tags_in(&self, category_id: &str, sub_category_id: Option<&str>) -> Vec<&Tag> {
        let Some(category) = self.category(category_id) else {
            return Vec::new();
        };
        match sub_category_id {
            Some(sub_id) => category
                .sub_categories
                .iter()
                .filter(|sub| sub.id == sub_id)
                .flat_map(|sub| sub.tags.iter())
                .collect(),
            None => category.all_tags().collect(),
        }
    }

    /// Case-insensitive lookup by prompt name, then by localized name.
    pub fn find_by_name(&self, name: &str) -> Option<&Tag> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        let tags = || self.categories.iter().flat_map(|category| category.all_tags());
        tags()
            .find(|tag| tag.name.to_lowercase() == needle)
            .or_else(|| tags().find(|tag| tag.localized_name.to_lowercase() == needle))
    }

    /// Category that receives free-text tags.
    pub fn input_category_id(&self) -> &str {
        self.categories
            .iter()
            .find(|category| category.is_input_category)
            .map(|category| category.id.as_str())
            .unwrap_or(CUSTOM_CATEGORY_ID)
    }

    pub fn category_display_name(&self, category_id: &str) -> String {
        self.category(category_id)
            .map(|category| category.name.clone())
            .unwrap_or_else(|| category_id.to_string())
    }

    pub fn sub_category_display_name(
        &self,
        category_id: &str,
        sub_category_id: Option<&str>,
    ) -> Option<String> {
        let sub_id = sub_category_id?;
        Some(
            self.sub_category(category_id, sub_id)
                .map(|sub| sub.name.clone())
                .unwrap_or_else(|| sub_id.to_string()),
        )
    }

    pub fn category_id_by_display_name(&self, display_name: &str) -> Option<&str> {
        let needle = display_name.trim();
        self.categories
            .iter()
            .find(|category| {
                category.name.eq_ignore_ascii_case(needle)
                    || category.localized_name == needle
                    || category.id == needle
            })
            .map(|category| category.id.as_str())
    }

    pub fn sub_category_id_by_display_name(
        &self,
        category_id: &str,
        display_name: &str,
    ) -> Option<&str> {
        let needle = display_name.trim();
        self.category(category_id)?
            .sub_categories
            .iter()
            .find(|sub| {
                sub.name.eq_ignore_ascii_case(needle) || sub.localized_name == needle || sub.id == needle
            })
            .map(|sub| sub.id.as_str())
    }
}
