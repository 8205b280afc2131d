use crate::gateway::GatewayError;
use crate::model::{FeedItem, ItemId, PostPayload, VoteReceipt, VoteValue};
use crate::store::ItemSource;

/// Settlement of a background gateway call, delivered to the dispatcher.
///
/// Sequence numbers come from the request fence and let the dispatcher
/// recognise completions that a newer request has superseded.
#[derive(Debug)]
pub enum Outcome {
    FeedFetched {
        seq: u64,
        result: Result<Vec<FeedItem>, GatewayError>,
    },
    /// Older feed page. `feed_seq` is the feed list's sequence when the
    /// page was requested.
    MoreFeedFetched {
        cursor: ItemId,
        feed_seq: Option<u64>,
        result: Result<Vec<FeedItem>, GatewayError>,
    },
    SourceFetched {
        source: ItemSource,
        seq: u64,
        result: Result<Vec<FeedItem>, GatewayError>,
    },
    CommentsFetched {
        parent_id: ItemId,
        offset: usize,
        seq: Option<u64>,
        result: Result<Vec<FeedItem>, GatewayError>,
    },
    CommentCountRefreshed {
        parent_id: ItemId,
        seq: u64,
        result: Result<u32, GatewayError>,
    },
    Posted {
        payload: PostPayload,
        offset: usize,
        result: Result<(), GatewayError>,
    },
    Voted {
        item_id: ItemId,
        seq: u64,
        /// Count of wholesale list replacements when the vote was issued.
        lists_seen: u64,
        /// Optimistic delta that was applied.
        delta: i64,
        previous: VoteValue,
        result: Result<VoteReceipt, GatewayError>,
    },
    Removed {
        item: FeedItem,
        admin: bool,
        result: Result<(), GatewayError>,
    },
    Reported {
        item_id: ItemId,
        result: Result<(), GatewayError>,
    },
    Banned {
        item_id: ItemId,
        result: Result<(), GatewayError>,
    },
    /// A background task panicked.
    TaskPanicked {
        task: &'static str,
        error: String,
    },
}
