use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// --- Enums ---

/// Persisted status of one item's progress through one stage.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Pending => write!(f, "pending"),
            StageStatus::InProgress => write!(f, "in_progress"),
            StageStatus::Completed => write!(f, "completed"),
            StageStatus::Failed => write!(f, "failed"),
        }
    }
}

/// The two ordered processing stages every item goes through.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Summarize,
    Capture,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Summarize => write!(f, "summarize"),
            Stage::Capture => write!(f, "capture"),
        }
    }
}

/// Classification derived from an item's two stage states. Never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemClass {
    Done,
    Failed,
    InProgress,
    Pending,
}

impl ItemClass {
    /// Eligible for (re)processing on the next run.
    pub fn is_pending(self) -> bool {
        self != ItemClass::Done
    }
}

/// Single source of truth for item classification.
///
/// Precedence: done, then failed, then in progress, then pending. Every item
/// lands in exactly one class, which is what keeps `Stats` a partition.
pub fn classify(
    summarize: &SummarizeState,
    capture: &CaptureState,
    capture_enabled: bool,
) -> ItemClass {
    use StageStatus::*;

    let capture_satisfied = !capture_enabled || capture.status == Completed;
    match (summarize.status, capture.status) {
        (Completed, _) if capture_satisfied => ItemClass::Done,
        (Failed, _) | (_, Failed) => ItemClass::Failed,
        (InProgress, _) | (_, InProgress) => ItemClass::InProgress,
        _ => ItemClass::Pending,
    }
}

// --- Stage states ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SummarizeState {
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    /// Normalized `HH:MM:SS` content timestamps; drives the capture stage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub timestamps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CaptureState {
    pub status: StageStatus,
    #[serde(default)]
    pub total: usize,
    #[serde(default)]
    pub completed: usize,
    /// Screenshot filenames produced so far. Never shrinks across retries.
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// --- Records ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    /// Map key in the persisted document; filled in on load.
    #[serde(skip)]
    pub id: String,
    pub index: u32,
    pub title: String,
    pub output_slug: String,
    #[serde(default)]
    pub summarize: SummarizeState,
    #[serde(default)]
    pub capture: CaptureState,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    pub locale: String,
    pub screenshots: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            locale: "en".to_string(),
            screenshots: true,
        }
    }
}

/// One state document per playlist.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CollectionRecord {
    pub playlist_id: String,
    pub title: String,
    pub config: RunConfig,
    pub total_items: usize,
    pub created_at: String,
    pub updated_at: String,
    /// Ordered by insertion; serialized as an object keyed by item id.
    #[serde(default, with = "item_map")]
    pub items: Vec<ItemRecord>,
}

impl CollectionRecord {
    pub fn find_item(&self, id: &str) -> Option<&ItemRecord> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn find_item_mut(&mut self, id: &str) -> Option<&mut ItemRecord> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    pub fn classify_item(&self, item: &ItemRecord) -> ItemClass {
        classify(&item.summarize, &item.capture, self.config.screenshots)
    }
}

/// Aggregate counts over a collection. The four buckets sum to `total`.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub failed: usize,
    pub pending: usize,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} total: {} completed, {} in progress, {} failed, {} pending",
            self.total, self.completed, self.in_progress, self.failed, self.pending
        )
    }
}

// --- Collaborator payloads ---

/// An entry of the source collection as reported by the catalog.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SourceItem {
    pub id: String,
    pub title: String,
}

impl SourceItem {
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub overview: String,
    #[serde(default)]
    pub sections: Vec<SummarySection>,
    #[serde(default)]
    pub key_points: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct SummarySection {
    pub timestamp: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

// --- Insertion-ordered item map ---

mod item_map {
    use super::*;
    use serde::de::{Error as _, MapAccess, Visitor};
    use serde::ser::SerializeMap;

    pub fn serialize<S: Serializer>(items: &[ItemRecord], serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(items.len()))?;
        for item in items {
            map.serialize_entry(&item.id, item)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<ItemRecord>, D::Error> {
        deserializer.deserialize_map(ItemMapVisitor)
    }

    struct ItemMapVisitor;

    impl<'de> Visitor<'de> for ItemMapVisitor {
        type Value = Vec<ItemRecord>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of item id to item record")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut items = Vec::with_capacity(access.size_hint().unwrap_or(0));
            let mut seen = HashSet::new();
            while let Some((id, mut item)) = access.next_entry::<String, ItemRecord>()? {
                if !seen.insert(id.clone()) {
                    return Err(A::Error::custom(format!("duplicate item id '{}'", id)));
                }
                item.id = id;
                items.push(item);
            }
            Ok(items)
        }
    }
}
