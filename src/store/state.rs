use crate::model::{FeedItem, FeedSort, ItemId, LoadingState};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

// ============================================================================
// Store Value
// ============================================================================

/// Canonical client-side feed state.
///
/// Lists are `Arc<Vec<_>>` so cloning a snapshot is O(1). The reducer
/// replaces a list through `Arc::make_mut`, which copies it when a snapshot
/// still shares it; holders of older values never observe a change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedState {
    /// Primary feed list in backend order.
    pub list: Arc<Vec<FeedItem>>,
    pub list_state: LoadingState,
    /// Pull-to-refresh indicator, independent of `list_state`.
    pub is_refreshing: bool,
    pub sort: FeedSort,

    /// Items posted by the user being viewed.
    pub user_items: Arc<Vec<FeedItem>>,
    /// Items posted to the event being viewed.
    pub event_items: Arc<Vec<FeedItem>>,

    /// The single open comment thread, if any.
    pub thread: CommentThread,
    pub comment_state: LoadingState,

    /// Content submission indicator.
    pub post_state: LoadingState,

    pub overlay: OverlayState,
    pub notification: Notification,
    pub session: Session,
}

impl FeedState {
    pub fn open_comment_id(&self) -> Option<ItemId> {
        self.thread.parent_id
    }
}

/// Comments under one parent item.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommentThread {
    pub parent_id: Option<ItemId>,
    pub items: Arc<Vec<FeedItem>>,
    /// Parent's `numberOfComments` as last refreshed while the thread was open.
    pub total: Option<u32>,
    /// Offset for the next page request.
    pub offset: usize,
}

/// Transient UI overlays that the reducer owns.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverlayState {
    pub lightbox_item_id: Option<ItemId>,
    /// Item the report dialog is open for.
    pub report_target: Option<FeedItem>,
    /// Height of the last collapsed thread, used to compensate scroll position.
    pub closed_thread_height: f32,
    /// Vertical position of the comment input field.
    pub input_position: f32,
}

// ============================================================================
// Notification
// ============================================================================

/// The single transient message slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Notification {
    pub message: Option<String>,
    pub visible: bool,
    /// Sequence number of the show that produced the current message.
    /// Dismissals carrying any other number are stale.
    pub seq: u64,
    #[serde(serialize_with = "serialize_duration_ms")]
    pub duration: Duration,
    #[serde(skip)]
    pub deadline: Option<Instant>,
}

fn serialize_duration_ms<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Moderator,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Session {
    pub role: Role,
    /// Set when the backend rejected moderator credentials; the presentation
    /// layer routes back to login. Cleared by the next session restore.
    pub forced_logout: bool,
}
