//! Settlement handling: maps each [`Outcome`] to store commands, follow-up
//! requests and notifications.

use std::collections::HashSet;

use super::fence::Resource;
use super::outcome::Outcome;
use super::Dispatcher;
use crate::gateway::{ErrorClass, Gateway, GatewayError};
use crate::model::{FeedItem, ItemId, PostPayload, VoteReceipt, VoteValue};
use crate::notify::{
    error_message, invalid_event_message, rate_limit_message, success_message, ADMIN_NOTIFICATION_DURATION,
    MSG_ERROR, MSG_NOT_FOUND, MSG_REPORTED, MSG_UNAUTHORIZED, NOTIFICATION_DURATION,
};
use crate::store::{Command, ItemSource};

impl<G: Gateway> Dispatcher<G> {
    pub(super) async fn handle_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::FeedFetched { seq, result } => self.on_feed_fetched(seq, result),
            Outcome::MoreFeedFetched {
                cursor,
                feed_seq,
                result,
            } => self.on_more_feed_fetched(cursor, feed_seq, result),
            Outcome::SourceFetched {
                source,
                seq,
                result,
            } => self.on_source_fetched(source, seq, result),
            Outcome::CommentsFetched {
                parent_id,
                offset,
                seq,
                result,
            } => self.on_comments_fetched(parent_id, offset, seq, result),
            Outcome::CommentCountRefreshed {
                parent_id,
                seq,
                result,
            } => self.on_comment_count(parent_id, seq, result),
            Outcome::Posted {
                payload,
                offset,
                result,
            } => self.on_posted(payload, offset, result),
            Outcome::Voted {
                item_id,
                seq,
                lists_seen,
                delta,
                previous,
                result,
            } => self.on_voted(item_id, seq, lists_seen, delta, previous, result),
            Outcome::Removed {
                item,
                admin,
                result,
            } => self.on_removed(item, admin, result).await,
            Outcome::Reported { item_id, result } => match result {
                Ok(()) => {
                    tracing::info!(item_id = %item_id, "Item reported");
                    self.notify(MSG_REPORTED, NOTIFICATION_DURATION);
                }
                Err(e) => tracing::warn!(item_id = %item_id, error = %e, "Failed to report item"),
            },
            Outcome::Banned { item_id, result } => match result {
                Ok(()) => tracing::info!(item_id = %item_id, "Author shadow-banned"),
                Err(e) => {
                    tracing::warn!(item_id = %item_id, error = %e, "Shadow ban failed");
                    if e.class() == ErrorClass::Unauthorized {
                        self.force_logout().await;
                    }
                }
            },
            Outcome::TaskPanicked { task, error } => {
                tracing::error!(task, error = %error, "Background task panicked");
                match task {
                    "load_more" => self.loading_more.clear(),
                    "load_comments" => self.loading_comments.clear(),
                    _ => {}
                }
                self.notify(MSG_ERROR, NOTIFICATION_DURATION);
            }
        }
    }

    fn on_feed_fetched(&mut self, seq: u64, result: Result<Vec<FeedItem>, GatewayError>) {
        if !self.fence.accepts(Resource::FeedList, seq) {
            tracing::debug!(seq, "Discarding stale feed response");
            return;
        }
        match result {
            Ok(items) => {
                tracing::debug!(count = items.len(), "Feed loaded");
                self.lists_replaced += 1;
                self.apply(Command::FeedLoaded { items });
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch feed");
                self.apply(Command::FeedLoadFailed);
            }
        }
    }

    fn on_more_feed_fetched(
        &mut self,
        cursor: ItemId,
        feed_seq: Option<u64>,
        result: Result<Vec<FeedItem>, GatewayError>,
    ) {
        self.loading_more.remove(&cursor);
        if !self.fence.unchanged_since(Resource::FeedList, feed_seq) {
            tracing::debug!(cursor = %cursor, "Feed replaced while loading more, discarding page");
            return;
        }
        let items = match result {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(cursor = %cursor, error = %e, "Failed to load more feed items");
                return;
            }
        };

        let known: HashSet<ItemId> = self.state.list.iter().map(|item| item.id).collect();
        let delivered = items.len();
        let fresh: Vec<FeedItem> = items
            .into_iter()
            .filter(|item| !known.contains(&item.id))
            .collect();
        if fresh.len() < delivered {
            tracing::debug!(
                cursor = %cursor,
                dropped = delivered - fresh.len(),
                "Dropped already-listed items from page"
            );
        }
        self.apply(Command::FeedAppended { items: fresh });
    }

    fn on_source_fetched(
        &mut self,
        source: ItemSource,
        seq: u64,
        result: Result<Vec<FeedItem>, GatewayError>,
    ) {
        let resource = match source {
            ItemSource::User(_) => Resource::UserItems,
            ItemSource::Event(_) => Resource::EventItems,
        };
        if !self.fence.accepts(resource, seq) {
            tracing::debug!(?source, seq, "Discarding stale item source response");
            return;
        }
        match result {
            Ok(items) => {
                self.lists_replaced += 1;
                self.apply(Command::SourceLoaded { source, items });
            }
            Err(e) => tracing::warn!(?source, error = %e, "Failed to load item source"),
        }
    }

    fn on_comments_fetched(
        &mut self,
        parent_id: ItemId,
        offset: usize,
        seq: Option<u64>,
        result: Result<Vec<FeedItem>, GatewayError>,
    ) {
        if offset > 0 {
            self.loading_comments.remove(&(parent_id, offset));
        }
        if !self.fence.unchanged_since(Resource::CommentThread, seq) {
            tracing::debug!(parent_id = %parent_id, offset, "Discarding stale comments response");
            return;
        }
        match result {
            Ok(items) => {
                tracing::debug!(parent_id = %parent_id, offset, count = items.len(), "Comments loaded");
                if offset == 0 {
                    self.lists_replaced += 1;
                    self.apply(Command::CommentsLoaded { parent_id, items });
                } else {
                    let known: HashSet<ItemId> =
                        self.state.thread.items.iter().map(|comment| comment.id).collect();
                    let delivered = items.len();
                    let fresh: Vec<FeedItem> = items
                        .into_iter()
                        .filter(|comment| !known.contains(&comment.id))
                        .collect();
                    if fresh.len() < delivered {
                        tracing::debug!(
                            parent_id = %parent_id,
                            dropped = delivered - fresh.len(),
                            "Dropped already-listed comments from page"
                        );
                    }
                    self.apply(Command::CommentsAppended {
                        parent_id,
                        items: fresh,
                    });
                }
                self.refresh_comment_count(parent_id);
            }
            Err(e) => {
                tracing::warn!(parent_id = %parent_id, offset, error = %e, "Failed to load comments");
                self.apply(Command::CommentsFailed { parent_id });
            }
        }
    }

    fn on_comment_count(&mut self, parent_id: ItemId, seq: u64, result: Result<u32, GatewayError>) {
        if !self.fence.accepts(Resource::CommentCount(parent_id), seq) {
            tracing::debug!(parent_id = %parent_id, seq, "Discarding stale comment count");
            return;
        }
        match result {
            Ok(count) => self.apply(Command::CommentCountUpdated { parent_id, count }),
            Err(e) => {
                tracing::warn!(parent_id = %parent_id, error = %e, "Failed to refresh comment count")
            }
        }
    }

    fn on_posted(&mut self, payload: PostPayload, offset: usize, result: Result<(), GatewayError>) {
        match result {
            Ok(()) => {
                tracing::info!(kind = payload.content_type().as_str(), "Content posted");
                self.apply(Command::PostSucceeded);
                match &payload {
                    PostPayload::Comment { parent_id, .. } => self.load_comments(*parent_id, offset),
                    PostPayload::Text { .. } | PostPayload::Image { .. } => self.sort_chronological(),
                    PostPayload::CheckIn { .. } => self.refresh_feed(),
                }
                self.notify(success_message(&payload), NOTIFICATION_DURATION);
            }
            Err(e) => {
                tracing::warn!(kind = payload.content_type().as_str(), error = %e, "Failed to post content");
                self.apply(Command::PostFailed);
                let message = match e.class() {
                    ErrorClass::RateLimited => rate_limit_message(&payload),
                    ErrorClass::Forbidden => invalid_event_message(&payload),
                    _ => error_message(&payload),
                };
                self.notify(message, NOTIFICATION_DURATION);
            }
        }
    }

    fn on_voted(
        &mut self,
        item_id: ItemId,
        seq: u64,
        lists_seen: u64,
        delta: i64,
        previous: VoteValue,
        result: Result<VoteReceipt, GatewayError>,
    ) {
        match result {
            Ok(receipt) => {
                if receipt.delta != 0 {
                    self.apply(Command::VoteConfirmed {
                        item_id,
                        delta: receipt.delta,
                    });
                }
            }
            Err(e) => {
                tracing::warn!(item_id = %item_id, error = %e, "Failed to vote");
                if !self.config.rollback_failed_votes {
                    return;
                }
                // A later vote on the same item already re-asserted the user's choice
                if !self.fence.is_latest(Resource::Vote(item_id), seq) {
                    tracing::debug!(item_id = %item_id, "Newer vote in flight, skipping rollback");
                    return;
                }
                // Server data replaced the optimistic patch; there is nothing to undo
                if self.lists_replaced != lists_seen {
                    tracing::debug!(item_id = %item_id, "Lists reloaded since vote, skipping rollback");
                    return;
                }
                self.apply(Command::VoteReverted {
                    item_id,
                    delta,
                    previous,
                });
            }
        }
    }

    async fn on_removed(&mut self, item: FeedItem, admin: bool, result: Result<(), GatewayError>) {
        match result {
            Ok(()) => {
                tracing::info!(item_id = %item.id, admin, "Item deleted");
                self.apply(Command::ItemRemoved { item_id: item.id });
                if let Some(parent_id) = item.parent_id {
                    self.refresh_comment_count(parent_id);
                }
            }
            Err(e) if admin => {
                tracing::warn!(item_id = %item.id, error = %e, "Admin delete failed");
                let message = match e.class() {
                    ErrorClass::Unauthorized => {
                        self.force_logout().await;
                        MSG_UNAUTHORIZED
                    }
                    ErrorClass::NotFound => MSG_NOT_FOUND,
                    _ => MSG_ERROR,
                };
                self.notify(message, ADMIN_NOTIFICATION_DURATION);
            }
            Err(e) => tracing::warn!(item_id = %item.id, error = %e, "Failed to delete item"),
        }
    }
}
