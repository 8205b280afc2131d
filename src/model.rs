//! Feed data model shared by the gateway, store and dispatcher.
//!
//! Field names follow the backend's camelCase JSON. Only the fields the
//! reconciliation logic reads are modeled; everything else in a response is
//! ignored by serde.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique, stable identifier of a feed item or comment.
///
/// The sole correlation key for vote, delete and comment-count patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub i64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ItemId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ============================================================================
// Authors and Content
// ============================================================================

/// Who posted an item, as seen from the current user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorKind {
    Me,
    OtherUser,
    /// Admin/system generated item. Excluded from pagination cursors.
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
    /// Team or role tag shown next to the name.
    #[serde(default)]
    pub team: Option<String>,
    #[serde(rename = "type")]
    pub kind: AuthorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    #[serde(rename = "TEXT")]
    Text,
    #[serde(rename = "IMAGE")]
    Image,
    #[serde(rename = "CHECK_IN_EVENT", alias = "CHECK_IN")]
    CheckIn,
    #[serde(rename = "SYSTEM")]
    System,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "TEXT",
            ContentType::Image => "IMAGE",
            ContentType::CheckIn => "CHECK_IN_EVENT",
            ContentType::System => "SYSTEM",
        }
    }
}

// ============================================================================
// Votes
// ============================================================================

/// A user's vote on an item. Serialized as -1, 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum VoteValue {
    Down,
    #[default]
    None,
    Up,
}

impl VoteValue {
    pub fn as_i64(self) -> i64 {
        i8::from(self) as i64
    }
}

impl From<VoteValue> for i8 {
    fn from(value: VoteValue) -> Self {
        match value {
            VoteValue::Down => -1,
            VoteValue::None => 0,
            VoteValue::Up => 1,
        }
    }
}

impl TryFrom<i8> for VoteValue {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(VoteValue::Down),
            0 => Ok(VoteValue::None),
            1 => Ok(VoteValue::Up),
            other => Err(format!("vote value out of range: {}", other)),
        }
    }
}

/// Vote request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub value: VoteValue,
    pub feed_item_id: ItemId,
}

/// Backend reply to a vote.
///
/// `delta` is applied additively on top of the optimistic patch. A backend
/// that only acknowledges (empty body) yields a delta of 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct VoteReceipt {
    #[serde(default)]
    pub delta: i64,
}

// ============================================================================
// Feed Items
// ============================================================================

/// A posted item or a comment (when `parent_id` is set).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub id: ItemId,
    pub author: Author,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    #[serde(default)]
    pub text: Option<String>,
    /// Image location for IMAGE items.
    #[serde(default)]
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub votes: i64,
    #[serde(default)]
    pub user_vote: VoteValue,
    #[serde(default)]
    pub number_of_comments: u32,
    #[serde(default, alias = "parent_id")]
    pub parent_id: Option<ItemId>,
}

impl FeedItem {
    pub fn is_comment(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn is_system(&self) -> bool {
        self.author.kind == AuthorKind::System || self.content_type == ContentType::System
    }
}

/// Loading indicator, tracked separately for the feed list, the open comment
/// thread and content submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadingState {
    #[default]
    None,
    Loading,
    Ready,
    Failed,
}

// ============================================================================
// Queries
// ============================================================================

/// Feed ordering requested from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedSort {
    #[default]
    Hot,
    /// Chronological, newest first.
    New,
}

impl FeedSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedSort::Hot => "hot",
            FeedSort::New => "new",
        }
    }
}

impl std::str::FromStr for FeedSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hot" => Ok(FeedSort::Hot),
            "new" => Ok(FeedSort::New),
            other => Err(format!("unknown feed sort: {}", other)),
        }
    }
}

/// Filter query attached to list requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeedQuery {
    pub city_id: Option<i64>,
    pub sort: Option<FeedSort>,
}

impl FeedQuery {
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(2);
        if let Some(city_id) = self.city_id {
            pairs.push(("cityId", city_id.to_string()));
        }
        if let Some(sort) = self.sort {
            pairs.push(("sort", sort.as_str().to_string()));
        }
        pairs
    }
}

// ============================================================================
// Submissions
// ============================================================================

/// Device geolocation attached to posts by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// Content the user submits through `submit_content`.
#[derive(Debug, Clone, PartialEq)]
pub enum PostPayload {
    Text {
        text: String,
    },
    /// Text reply to an existing item.
    Comment {
        text: String,
        parent_id: ItemId,
    },
    Image {
        /// Base64 encoded image data.
        image_data: String,
        image_text: Option<String>,
        image_text_position: Option<f32>,
    },
    CheckIn {
        event_id: i64,
    },
}

impl PostPayload {
    pub fn content_type(&self) -> ContentType {
        match self {
            PostPayload::Text { .. } | PostPayload::Comment { .. } => ContentType::Text,
            PostPayload::Image { .. } => ContentType::Image,
            PostPayload::CheckIn { .. } => ContentType::CheckIn,
        }
    }

    pub fn parent_id(&self) -> Option<ItemId> {
        match self {
            PostPayload::Comment { parent_id, .. } => Some(*parent_id),
            _ => None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WirePost<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(rename = "parent_id", skip_serializing_if = "Option::is_none")]
    parent_id: Option<ItemId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_data: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_text_position: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<Location>,
}

impl PostPayload {
    /// Build the JSON request body, optionally tagged with a location.
    pub fn to_body(&self, location: Option<Location>) -> serde_json::Value {
        let mut wire = WirePost {
            kind: self.content_type().as_str(),
            text: None,
            parent_id: None,
            image_data: None,
            image_text: None,
            image_text_position: None,
            event_id: None,
            location,
        };
        match self {
            PostPayload::Text { text } => wire.text = Some(text.as_str()),
            PostPayload::Comment { text, parent_id } => {
                wire.text = Some(text.as_str());
                wire.parent_id = Some(*parent_id);
            }
            PostPayload::Image {
                image_data,
                image_text,
                image_text_position,
            } => {
                wire.image_data = Some(image_data.as_str());
                // Caption position is only meaningful alongside a caption
                if let Some(caption) = image_text.as_deref().filter(|t| !t.is_empty()) {
                    wire.image_text = Some(caption);
                    wire.image_text_position = *image_text_position;
                }
            }
            PostPayload::CheckIn { event_id } => wire.event_id = Some(*event_id),
        }
        serde_json::to_value(wire).unwrap_or(serde_json::Value::Null)
    }
}

/// Report request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportBody {
    pub feed_item_id: ItemId,
    pub report_creator_uuid: String,
    pub report_description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ITEM_JSON: &str = r#"{
        "id": 42,
        "author": {"name": "Ada", "team": "Tietoteekkarikilta", "type": "OTHER_USER"},
        "type": "IMAGE",
        "url": "https://cdn.example.com/42.jpg",
        "createdAt": "2024-04-30T12:00:00Z",
        "votes": 7,
        "userVote": -1,
        "numberOfComments": 3,
        "location": {"latitude": 60.1}
    }"#;

    #[test]
    fn test_feed_item_deserializes_backend_shape() {
        let item: FeedItem = serde_json::from_str(ITEM_JSON).unwrap();
        assert_eq!(item.id, ItemId(42));
        assert_eq!(item.content_type, ContentType::Image);
        assert_eq!(item.user_vote, VoteValue::Down);
        assert_eq!(item.number_of_comments, 3);
        assert_eq!(item.parent_id, None);
        assert!(!item.is_system());
    }

    #[test]
    fn test_feed_item_defaults_missing_counters() {
        let json = r#"{"id": 1, "author": {"type": "SYSTEM"}, "type": "SYSTEM",
                       "createdAt": "2024-04-30T12:00:00Z", "parent_id": 9}"#;
        let item: FeedItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.votes, 0);
        assert_eq!(item.user_vote, VoteValue::None);
        assert_eq!(item.parent_id, Some(ItemId(9)));
        assert!(item.is_system());
        assert!(item.is_comment());
    }

    #[test]
    fn test_out_of_range_vote_rejected() {
        let json = ITEM_JSON.replace("\"userVote\": -1", "\"userVote\": 2");
        assert!(serde_json::from_str::<FeedItem>(&json).is_err());
    }

    #[test]
    fn test_comment_body_is_text_with_parent() {
        let payload = PostPayload::Comment {
            text: "hello".to_string(),
            parent_id: ItemId(5),
        };
        let body = payload.to_body(None);
        assert_eq!(body["type"], "TEXT");
        assert_eq!(body["text"], "hello");
        assert_eq!(body["parent_id"], 5);
        assert!(body.get("location").is_none());
    }

    #[test]
    fn test_image_caption_position_dropped_without_caption() {
        let payload = PostPayload::Image {
            image_data: "aGVsbG8=".to_string(),
            image_text: None,
            image_text_position: Some(0.5),
        };
        let body = payload.to_body(Some(Location {
            latitude: 60.0,
            longitude: 24.0,
        }));
        assert_eq!(body["type"], "IMAGE");
        assert!(body.get("imageTextPosition").is_none());
        assert_eq!(body["location"]["longitude"], 24.0);
    }

    #[test]
    fn test_feed_query_pairs() {
        let query = FeedQuery {
            city_id: Some(2),
            sort: Some(FeedSort::New),
        };
        assert_eq!(
            query.pairs(),
            vec![("cityId", "2".to_string()), ("sort", "new".to_string())]
        );
        assert!(FeedQuery::default().pairs().is_empty());
    }

    #[test]
    fn test_feed_sort_from_str() {
        assert_eq!("NEW".parse::<FeedSort>(), Ok(FeedSort::New));
        assert!("top".parse::<FeedSort>().is_err());
    }
}
