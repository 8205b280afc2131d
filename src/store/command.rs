use crate::model::{FeedItem, FeedSort, ItemId, VoteValue};
use std::time::Duration;
use tokio::time::Instant;

/// Auxiliary item collection that feeds cross-source lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemSource {
    User(i64),
    Event(i64),
}

impl ItemSource {
    /// Backend collection name for `fetch_models`.
    pub fn resource(&self) -> String {
        match self {
            ItemSource::User(id) => format!("users/{}/feed", id),
            ItemSource::Event(id) => format!("events/{}/feed", id),
        }
    }
}

/// Every state transition the reducer understands.
///
/// All variants except `FeedAppended`, `CommentsAppended`, `VoteApplied`,
/// `VoteConfirmed` and `VoteReverted` are idempotent: applying one twice
/// yields the same state as applying it once.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // Feed list
    FeedRequested,
    RefreshStarted,
    /// Last-write-wins replacement of the feed list.
    FeedLoaded {
        items: Vec<FeedItem>,
    },
    FeedLoadFailed,
    /// Page delivered by load-more; already filtered of known ids.
    FeedAppended {
        items: Vec<FeedItem>,
    },
    SortChanged(FeedSort),
    SourceLoaded {
        source: ItemSource,
        items: Vec<FeedItem>,
    },

    // Comment thread
    /// Opens the thread for `parent_id`, closing any other.
    CommentsRequested {
        parent_id: ItemId,
    },
    CommentsLoaded {
        parent_id: ItemId,
        items: Vec<FeedItem>,
    },
    CommentsAppended {
        parent_id: ItemId,
        items: Vec<FeedItem>,
    },
    CommentsFailed {
        parent_id: ItemId,
    },
    CommentsClosed,
    CommentCountUpdated {
        parent_id: ItemId,
        count: u32,
    },

    // Votes
    /// Optimistic patch issued before the request.
    VoteApplied {
        item_id: ItemId,
        value: VoteValue,
        delta: i64,
    },
    /// Backend-reported delta, added on top of the optimistic patch.
    VoteConfirmed {
        item_id: ItemId,
        delta: i64,
    },
    /// Undo of an optimistic patch whose request failed.
    VoteReverted {
        item_id: ItemId,
        delta: i64,
        previous: VoteValue,
    },

    /// Confirmed deletion.
    ItemRemoved {
        item_id: ItemId,
    },

    // Submission
    PostStarted,
    PostSucceeded,
    PostFailed,

    // Notification
    NotificationShown {
        message: String,
        seq: u64,
        duration: Duration,
        deadline: Instant,
    },
    NotificationHidden {
        seq: u64,
    },

    // Overlays
    LightboxOpened(ItemId),
    LightboxClosed,
    ReportDialogOpened(FeedItem),
    ReportDialogClosed,
    ClosedThreadHeightStored(f32),
    InputPositionStored(f32),

    // Session
    SessionRestored {
        moderator: bool,
    },
    ForcedLogout,
}

impl Command {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::FeedRequested => "feed_requested",
            Command::RefreshStarted => "refresh_started",
            Command::FeedLoaded { .. } => "feed_loaded",
            Command::FeedLoadFailed => "feed_load_failed",
            Command::FeedAppended { .. } => "feed_appended",
            Command::SortChanged(_) => "sort_changed",
            Command::SourceLoaded { .. } => "source_loaded",
            Command::CommentsRequested { .. } => "comments_requested",
            Command::CommentsLoaded { .. } => "comments_loaded",
            Command::CommentsAppended { .. } => "comments_appended",
            Command::CommentsFailed { .. } => "comments_failed",
            Command::CommentsClosed => "comments_closed",
            Command::CommentCountUpdated { .. } => "comment_count_updated",
            Command::VoteApplied { .. } => "vote_applied",
            Command::VoteConfirmed { .. } => "vote_confirmed",
            Command::VoteReverted { .. } => "vote_reverted",
            Command::ItemRemoved { .. } => "item_removed",
            Command::PostStarted => "post_started",
            Command::PostSucceeded => "post_succeeded",
            Command::PostFailed => "post_failed",
            Command::NotificationShown { .. } => "notification_shown",
            Command::NotificationHidden { .. } => "notification_hidden",
            Command::LightboxOpened(_) => "lightbox_opened",
            Command::LightboxClosed => "lightbox_closed",
            Command::ReportDialogOpened(_) => "report_dialog_opened",
            Command::ReportDialogClosed => "report_dialog_closed",
            Command::ClosedThreadHeightStored(_) => "closed_thread_height_stored",
            Command::InputPositionStored(_) => "input_position_stored",
            Command::SessionRestored { .. } => "session_restored",
            Command::ForcedLogout => "forced_logout",
        }
    }
}
