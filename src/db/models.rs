use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::catalog::Tag;
use crate::prompt::synth::PromptBundle;

/// One archived synthesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub snapshot_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_text: Option<String>,
    pub tags: Vec<Tag>,
    pub prompts: PromptBundle,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes")]
    pub thumbnail_png: Option<Vec<u8>>,
}

impl HistoryRecord {
    pub fn new(tags: Vec<Tag>, source_text: Option<String>, prompts: PromptBundle) -> Self {
        let source_text = source_text
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        HistoryRecord {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            snapshot_key: snapshot_key(&tags, source_text.as_deref()),
            source_text,
            tags,
            prompts,
            thumbnail_png: None,
        }
    }

    pub fn with_thumbnail(mut self, thumbnail_png: Option<Vec<u8>>) -> Self {
        self.thumbnail_png = thumbnail_png;
        self
    }
}

/// Content identity used for dedup: sorted catalog ids followed by the
/// source text, if any.
pub fn snapshot_key(tags: &[Tag], source_text: Option<&str>) -> String {
    let source_text = source_text.map(str::trim).filter(|text| !text.is_empty());
    if tags.is_empty() {
        return format!("text:{}", source_text.unwrap_or_default());
    }
    let mut ids: Vec<String> = tags
        .iter()
        .map(|tag| {
            if tag.is_custom {
                format!("custom:{}", tag.name.to_lowercase())
            } else {
                tag.catalog_id().to_string()
            }
        })
        .collect();
    ids.sort();
    if let Some(text) = source_text {
        ids.push(format!("text:{}", text));
    }
    ids.join("|")
}

#[derive(Debug, Clone, FromRow)]
pub struct HistoryRow {
    pub id: String,
    pub snapshot_key: String,
    pub created_at: DateTime<Utc>,
    pub payload_json: String,
}

impl HistoryRow {
    pub fn into_record(self) -> Result<HistoryRecord> {
        serde_json::from_str(&self.payload_json)
            .map_err(|err| anyhow!("Corrupt history payload for {}: {}", self.id, err))
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_str(&general_purpose::STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|text| general_purpose::STANDARD.decode(text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_key_ignores_order_and_instance_ids() {
        let red = Tag::new("mod-red", "red-", "modifier", None);
        let dress = Tag::new("dress", "dress", "clothing", Some("dresses"));
        let forward = snapshot_key(&[red.instantiate(), dress.clone()], None);
        let backward = snapshot_key(&[dress, red.instantiate()], None);
        assert_eq!(forward, backward);
        assert_eq!(forward, "dress|mod-red");
    }

    #[test]
    fn text_only_records_key_on_source_text() {
        let record = HistoryRecord::new(Vec::new(), Some("  a cat  ".to_string()), PromptBundle::default());
        assert_eq!(record.snapshot_key, "text:a cat");
        assert_eq!(record.source_text.as_deref(), Some("a cat"));
    }

    #[test]
    fn source_text_distinguishes_records_over_the_same_tags() {
        let girl = Tag::new("g-girl", "1girl", "character", Some("gender"));
        let cat = snapshot_key(&[girl.clone()], Some(" a cat on a roof "));
        let dog = snapshot_key(&[girl.clone()], Some("a dog in a field"));
        assert_eq!(cat, "g-girl|text:a cat on a roof");
        assert_ne!(cat, dog);
        assert_eq!(snapshot_key(&[girl.clone()], Some("  ")), "g-girl");
        assert_eq!(snapshot_key(&[girl], None), "g-girl");
    }

    #[test]
    fn thumbnail_survives_json_as_base64() {
        let record = HistoryRecord::new(Vec::new(), None, PromptBundle::default())
            .with_thumbnail(Some(vec![137, 80, 78, 71]));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["thumbnailPng"], "iVBORw==");
        let back: HistoryRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
