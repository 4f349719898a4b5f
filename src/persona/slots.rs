use std::fs;
use std::path::Path;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Cross-slot rules key off the role a slot plays in the persona.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotRole {
    Gender,
    Age,
    HairLength,
    HairStyle,
    Expression,
    #[default]
    Other,
}

/// One pick the random generator attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub category_id: String,
    #[serde(default)]
    pub sub_category_id: Option<String>,
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub role: SlotRole,
}

const fn default_count() -> usize {
    1
}

impl Slot {
    pub fn new(category_id: &str, sub_category_id: Option<&str>) -> Self {
        Slot {
            category_id: category_id.to_string(),
            sub_category_id: sub_category_id.map(str::to_string),
            count: 1,
            required: false,
            role: SlotRole::Other,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn with_role(mut self, role: SlotRole) -> Self {
        self.role = role;
        self
    }

    /// Whether a tag at `(category_id, sub_category_id)` sits inside this slot's target.
    pub fn targets(&self, category_id: &str, sub_category_id: Option<&str>) -> bool {
        if self.category_id != category_id {
            return false;
        }
        match self.sub_category_id.as_deref() {
            Some(sub) => sub_category_id == Some(sub),
            None => true,
        }
    }

    pub fn label(&self) -> String {
        match self.sub_category_id.as_deref() {
            Some(sub) => format!("{}/{}", self.category_id, sub),
            None => self.category_id.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SlotsFile {
    slots: Vec<Slot>,
}

pub fn parse_slots(raw: &str) -> Result<Vec<Slot>> {
    let parsed: SlotsFile =
        serde_yaml::from_str(raw).map_err(|err| anyhow!("Failed to parse persona slots: {}", err))?;
    let mut slots = Vec::new();
    for slot in parsed.slots {
        if slot.category_id.trim().is_empty() {
            warn!("Skipping persona slot with empty category id");
            continue;
        }
        if slot.count == 0 {
            warn!("Skipping persona slot {} with zero count", slot.label());
            continue;
        }
        slots.push(slot);
    }
    Ok(slots)
}

pub fn load_slots(path: &Path) -> Result<Vec<Slot>> {
    let raw = fs::read_to_string(path)
        .map_err(|err| anyhow!("Failed to read persona slots '{}': {}", path.display(), err))?;
    let slots = parse_slots(&raw)?;
    info!("Loaded {} persona slots from {}", slots.len(), path.display());
    Ok(slots)
}
