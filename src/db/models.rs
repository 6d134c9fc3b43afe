use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub type DocumentId = Uuid;
pub type SlideId = Uuid;

pub const DEFAULT_TITLE: &str = "Untitled Presentation";
pub const DEFAULT_CREATOR: &str = "anonymous";

/// A slide element. Opaque to the server: stored and relayed verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Element(pub Value);

impl From<Value> for Element {
    fn from(value: Value) -> Self {
        Element(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    pub creator_id: String,
    pub created_at: DateTime<Utc>,
    /// Slide references in insertion order.
    pub slides: Vec<SlideId>,
}

impl Document {
    pub fn new(title: Option<String>, creator_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            creator_id: creator_id.unwrap_or_else(|| DEFAULT_CREATOR.to_string()),
            created_at: Utc::now(),
            slides: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slide {
    pub id: SlideId,
    pub document_id: DocumentId,
    pub order_index: i32,
    #[serde(default)]
    pub elements: Vec<Element>,
}

impl Slide {
    pub fn new(document_id: DocumentId, order_index: i32, elements: Vec<Element>) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            order_index,
            elements,
        }
    }
}

/// Client-supplied data for a slide that does not exist yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSlide {
    #[serde(default)]
    pub document_id: Option<DocumentId>,
    #[serde(default)]
    pub elements: Vec<Element>,
}

/// Full element list for an existing slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideElements {
    pub id: SlideId,
    pub elements: Vec<Element>,
}
