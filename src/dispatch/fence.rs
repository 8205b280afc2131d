use std::collections::HashMap;

use crate::model::ItemId;

/// Logical resource whose completions are ordered by request sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    FeedList,
    /// The open comment thread. Reissued on open and close so pages for a
    /// closed thread are recognisably stale.
    CommentThread,
    CommentCount(ItemId),
    UserItems,
    EventItems,
    Vote(ItemId),
}

/// Per-resource monotonic request sequence numbers.
///
/// Every request takes a fresh number from one global counter; a completion
/// is current only if no newer request for the same resource was issued
/// since. With fencing disabled every completion is accepted, which restores
/// last-callback-wins ordering.
#[derive(Debug)]
pub struct RequestFence {
    enabled: bool,
    next: u64,
    latest: HashMap<Resource, u64>,
}

impl RequestFence {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            next: 0,
            latest: HashMap::new(),
        }
    }

    /// Record a new request for `resource` and return its sequence number.
    pub fn issue(&mut self, resource: Resource) -> u64 {
        self.next += 1;
        self.latest.insert(resource, self.next);
        self.next
    }

    /// Sequence number of the newest request for `resource`.
    pub fn latest(&self, resource: Resource) -> Option<u64> {
        self.latest.get(&resource).copied()
    }

    /// True if `seq` is still the newest request for `resource`, regardless
    /// of whether fencing is enabled.
    pub fn is_latest(&self, resource: Resource, seq: u64) -> bool {
        self.latest(resource) == Some(seq)
    }

    /// Whether a completion should be applied.
    pub fn accepts(&self, resource: Resource, seq: u64) -> bool {
        !self.enabled || self.is_latest(resource, seq)
    }

    /// Like [`accepts`](Self::accepts) for completions that recorded the
    /// resource's sequence at issue time without taking a new one.
    pub fn unchanged_since(&self, resource: Resource, seen: Option<u64>) -> bool {
        !self.enabled || self.latest(resource) == seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newer_request_fences_older() {
        let mut fence = RequestFence::new(true);
        let first = fence.issue(Resource::FeedList);
        let second = fence.issue(Resource::FeedList);

        assert!(!fence.accepts(Resource::FeedList, first));
        assert!(fence.accepts(Resource::FeedList, second));
    }

    #[test]
    fn test_resources_are_independent() {
        let mut fence = RequestFence::new(true);
        let feed = fence.issue(Resource::FeedList);
        fence.issue(Resource::CommentCount(ItemId(1)));
        fence.issue(Resource::CommentCount(ItemId(2)));

        assert!(fence.accepts(Resource::FeedList, feed));
    }

    #[test]
    fn test_disabled_fence_accepts_everything() {
        let mut fence = RequestFence::new(false);
        let first = fence.issue(Resource::CommentThread);
        fence.issue(Resource::CommentThread);

        assert!(fence.accepts(Resource::CommentThread, first));
        assert!(!fence.is_latest(Resource::CommentThread, first));
        assert!(fence.unchanged_since(Resource::FeedList, Some(99)));
    }

    #[test]
    fn test_unchanged_since() {
        let mut fence = RequestFence::new(true);
        assert!(fence.unchanged_since(Resource::FeedList, None));
        let seen = fence.latest(Resource::FeedList);
        fence.issue(Resource::FeedList);
        assert!(!fence.unchanged_since(Resource::FeedList, seen));
    }
}
