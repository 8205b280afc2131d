//! Command dispatcher: turns user intents into optimistic store transitions
//! and background gateway calls whose settlements flow back as [`Outcome`]s.
//!
//! The dispatcher is the only owner of the [`FeedState`]. Every transition
//! goes through [`reduce`], on the task that drives the dispatcher; gateway
//! calls run on spawned tasks and never touch the state.

mod events;
mod fence;
mod outcome;
mod tasks;

pub use fence::{RequestFence, Resource};
pub use outcome::Outcome;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::gateway::Gateway;
use crate::model::{FeedItem, FeedQuery, FeedSort, ItemId, Location, PostPayload, ReportBody, Vote, VoteValue};
use crate::notify::{NotificationScheduler, ADMIN_NOTIFICATION_DURATION, MSG_UNAUTHORIZED};
use crate::storage::{Database, Moderator};
use crate::store::{
    compute_vote, find_item, lightbox_target, load_more_cursor, reduce, Command, FeedState, ItemSource,
    LightboxTarget,
};
use tasks::spawn_call;

/// Capacity of the outcome channel.
const OUTCOME_CHANNEL_CAPACITY: usize = 64;

/// Owns the feed state and serializes every transition applied to it.
pub struct Dispatcher<G: Gateway> {
    state: FeedState,
    gateway: Arc<G>,
    db: Database,
    config: Config,
    moderator: Option<Moderator>,
    notifications: NotificationScheduler,
    expired_rx: mpsc::Receiver<u64>,
    outcome_tx: mpsc::Sender<Outcome>,
    outcome_rx: mpsc::Receiver<Outcome>,
    /// Spawned calls whose outcome has not been handled yet.
    pending: usize,
    fence: RequestFence,
    /// Load-more cursors with a request in flight.
    loading_more: HashSet<ItemId>,
    /// Comment pages (parent, offset) with a request in flight.
    loading_comments: HashSet<(ItemId, usize)>,
    /// Bumped whenever a list is replaced wholesale with server data.
    lists_replaced: u64,
}

/// What woke the dispatcher up.
enum Wakeup {
    Outcome(Outcome),
    NotificationExpired(u64),
}

impl<G: Gateway> Dispatcher<G> {
    pub fn new(gateway: G, db: Database, config: Config) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::channel(OUTCOME_CHANNEL_CAPACITY);
        let (notifications, expired_rx) = NotificationScheduler::new();
        let state = reduce(&FeedState::default(), Command::SortChanged(config.feed_sort));
        Self {
            state,
            gateway: Arc::new(gateway),
            db,
            fence: RequestFence::new(config.fence_completions),
            config,
            moderator: None,
            notifications,
            expired_rx,
            outcome_tx,
            outcome_rx,
            pending: 0,
            loading_more: HashSet::new(),
            loading_comments: HashSet::new(),
            lists_replaced: 0,
        }
    }

    // ========================================================================
    // Store Access
    // ========================================================================

    pub fn state(&self) -> &FeedState {
        &self.state
    }

    /// Owned copy of the current state. Later transitions never alter it.
    pub fn snapshot(&self) -> FeedState {
        self.state.clone()
    }

    pub fn is_moderator(&self) -> bool {
        self.moderator.is_some()
    }

    /// Number of gateway calls still awaiting settlement.
    pub fn pending(&self) -> usize {
        self.pending
    }

    fn apply(&mut self, command: Command) {
        tracing::trace!(command = command.name(), "Applying command");
        self.state = reduce(&self.state, command);
    }

    fn notify(&mut self, message: &str, duration: Duration) {
        let command = self.notifications.show(message, duration);
        self.apply(command);
    }

    fn query(&self) -> FeedQuery {
        FeedQuery {
            city_id: self.config.city_id,
            sort: Some(self.state.sort),
        }
    }

    fn spawn<F>(&mut self, task: &'static str, call: F)
    where
        F: std::future::Future<Output = Outcome> + Send + 'static,
    {
        self.pending += 1;
        spawn_call(task, self.outcome_tx.clone(), call);
    }

    // ========================================================================
    // Event Pump
    // ========================================================================

    /// Wait for the next outcome or notification expiry and apply it.
    ///
    /// Returns `false` if both channels are closed.
    pub async fn process_next(&mut self) -> bool {
        let wakeup = tokio::select! {
            biased;
            Some(outcome) = self.outcome_rx.recv() => Wakeup::Outcome(outcome),
            Some(seq) = self.expired_rx.recv() => Wakeup::NotificationExpired(seq),
            else => return false,
        };

        match wakeup {
            Wakeup::Outcome(outcome) => {
                self.pending = self.pending.saturating_sub(1);
                self.handle_outcome(outcome).await;
            }
            Wakeup::NotificationExpired(seq) => {
                self.apply(Command::NotificationHidden { seq });
            }
        }
        true
    }

    /// Process events until every spawned call, including follow-ups issued
    /// while handling outcomes, has settled.
    pub async fn settle(&mut self) {
        while self.pending > 0 {
            if !self.process_next().await {
                break;
            }
        }
    }

    /// Wait until the visible notification is dismissed.
    pub async fn await_notification_dismissal(&mut self) {
        while self.state.notification.visible {
            if !self.process_next().await {
                break;
            }
        }
    }

    // ========================================================================
    // Session
    // ========================================================================

    /// Restore moderator privileges from the persisted record.
    pub async fn restore_session(&mut self) {
        let key = self.config.moderator_key();
        match self.db.load_moderator(&key).await {
            Ok(moderator) => self.moderator = moderator,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read moderator record");
                self.moderator = None;
            }
        }
        tracing::info!(moderator = self.moderator.is_some(), "Session restored");
        self.apply(Command::SessionRestored {
            moderator: self.moderator.is_some(),
        });
    }

    /// Persist moderator credentials and elevate the session.
    pub async fn store_moderator(&mut self, moderator: Moderator) -> anyhow::Result<()> {
        self.db
            .save_moderator(&self.config.moderator_key(), &moderator)
            .await?;
        self.moderator = Some(moderator);
        self.apply(Command::SessionRestored { moderator: true });
        Ok(())
    }

    /// Drop moderator privileges after the backend rejected them.
    async fn force_logout(&mut self) {
        tracing::warn!("Moderator credentials rejected, logging out");
        self.moderator = None;
        self.apply(Command::ForcedLogout);
        if let Err(e) = self.db.clear_moderator(&self.config.moderator_key()).await {
            tracing::warn!(error = %e, "Failed to clear moderator record");
        }
    }

    // ========================================================================
    // Feed List
    // ========================================================================

    /// Replace the feed list with a fresh fetch, showing the loading state.
    pub fn fetch_feed(&mut self) {
        self.request_feed(false);
    }

    /// Like [`fetch_feed`](Self::fetch_feed) but drives the refresh indicator.
    pub fn refresh_feed(&mut self) {
        self.request_feed(true);
    }

    fn request_feed(&mut self, refresh: bool) {
        self.close_comments();
        if self.config.city_id.is_none() {
            tracing::debug!("No city selected, skipping feed fetch");
            return;
        }

        self.apply(if refresh {
            Command::RefreshStarted
        } else {
            Command::FeedRequested
        });
        let seq = self.fence.issue(Resource::FeedList);
        let query = self.query();
        let gateway = Arc::clone(&self.gateway);
        tracing::debug!(seq, refresh, sort = query.sort.map(|s| s.as_str()), "Fetching feed");

        self.spawn("fetch_feed", async move {
            let result = gateway.fetch_models("feed", &query).await;
            Outcome::FeedFetched { seq, result }
        });
    }

    /// Append the page older than the oldest non-system item.
    ///
    /// Loading flags are left alone. Only one request per cursor is in
    /// flight at a time.
    pub fn load_more(&mut self) {
        if self.state.is_refreshing {
            tracing::debug!("Feed is refreshing, not loading more");
            return;
        }
        let Some(cursor) = load_more_cursor(&self.state) else {
            tracing::debug!("Feed is empty, nothing to load more from");
            return;
        };
        if !self.loading_more.insert(cursor) {
            tracing::debug!(cursor = %cursor, "Load more already in flight");
            return;
        }

        let feed_seq = self.fence.latest(Resource::FeedList);
        let query = self.query();
        let gateway = Arc::clone(&self.gateway);
        tracing::debug!(cursor = %cursor, "Loading more feed items");

        self.spawn("load_more", async move {
            let result = gateway.fetch_more_feed(cursor, &query).await;
            Outcome::MoreFeedFetched {
                cursor,
                feed_seq,
                result,
            }
        });
    }

    pub fn set_sort(&mut self, sort: FeedSort) {
        self.apply(Command::SortChanged(sort));
        self.fetch_feed();
    }

    /// Switch to newest-first ordering and re-fetch.
    pub fn sort_chronological(&mut self) {
        self.set_sort(FeedSort::New);
    }

    pub fn load_user_items(&mut self, user_id: i64) {
        self.load_source(ItemSource::User(user_id));
    }

    pub fn load_event_items(&mut self, event_id: i64) {
        self.load_source(ItemSource::Event(event_id));
    }

    fn load_source(&mut self, source: ItemSource) {
        let resource = match source {
            ItemSource::User(_) => Resource::UserItems,
            ItemSource::Event(_) => Resource::EventItems,
        };
        let seq = self.fence.issue(resource);
        let query = self.query();
        let gateway = Arc::clone(&self.gateway);

        self.spawn("load_source", async move {
            let result = gateway.fetch_models(&source.resource(), &query).await;
            Outcome::SourceFetched { source, seq, result }
        });
    }

    // ========================================================================
    // Content
    // ========================================================================

    /// Post new content. Nothing is inserted optimistically; the list is
    /// reloaded once the backend accepts the post.
    ///
    /// `offset` is the comment offset to reload from when posting a comment.
    pub fn submit_content(&mut self, payload: PostPayload, location: Option<Location>, offset: usize) {
        self.apply(Command::PostStarted);
        let query = self.query();
        let gateway = Arc::clone(&self.gateway);
        tracing::debug!(kind = payload.content_type().as_str(), "Submitting content");

        self.spawn("submit_content", async move {
            let result = gateway.post_action(&payload, location, &query).await;
            Outcome::Posted {
                payload,
                offset,
                result,
            }
        });
    }

    /// Vote on an item wherever it lives.
    ///
    /// The tally is patched before the request is sent. Unknown ids are a
    /// no-op.
    pub fn vote(&mut self, item_id: ItemId, value: VoteValue) {
        let Some(item) = find_item(&self.state, item_id) else {
            tracing::debug!(item_id = %item_id, "Vote target not in store, ignoring");
            return;
        };
        let previous = item.user_vote;
        let change = compute_vote(item.votes, previous, value);
        let delta = change.delta;

        self.apply(Command::VoteApplied {
            item_id,
            value,
            delta,
        });

        let seq = self.fence.issue(Resource::Vote(item_id));
        let lists_seen = self.lists_replaced;
        let gateway = Arc::clone(&self.gateway);
        self.spawn("vote", async move {
            let result = gateway
                .vote_feed_item(Vote {
                    value,
                    feed_item_id: item_id,
                })
                .await;
            Outcome::Voted {
                item_id,
                seq,
                lists_seen,
                delta,
                previous,
                result,
            }
        });
    }

    // ========================================================================
    // Comment Thread
    // ========================================================================

    /// Load comments under `parent_id` starting at `offset`.
    ///
    /// Offset zero opens (or reopens) the thread and shows the loading state;
    /// later offsets append silently to the open thread, one request per
    /// page at a time.
    pub fn load_comments(&mut self, parent_id: ItemId, offset: usize) {
        if offset > 0 && !self.loading_comments.insert((parent_id, offset)) {
            tracing::debug!(parent_id = %parent_id, offset, "Comment page already in flight");
            return;
        }
        let seq = if offset == 0 {
            self.apply(Command::CommentsRequested { parent_id });
            Some(self.fence.issue(Resource::CommentThread))
        } else {
            self.fence.latest(Resource::CommentThread)
        };
        let gateway = Arc::clone(&self.gateway);
        tracing::debug!(parent_id = %parent_id, offset, "Loading comments");

        self.spawn("load_comments", async move {
            let result = gateway
                .fetch_comments(parent_id, offset, &FeedQuery::default())
                .await;
            Outcome::CommentsFetched {
                parent_id,
                offset,
                seq,
                result,
            }
        });
    }

    pub fn close_comments(&mut self) {
        if self.state.open_comment_id().is_some() {
            self.fence.issue(Resource::CommentThread);
        }
        self.apply(Command::CommentsClosed);
    }

    fn refresh_comment_count(&mut self, parent_id: ItemId) {
        let seq = self.fence.issue(Resource::CommentCount(parent_id));
        let gateway = Arc::clone(&self.gateway);
        self.spawn("refresh_comment_count", async move {
            let result = gateway.refresh_comment_count(parent_id).await;
            Outcome::CommentCountRefreshed {
                parent_id,
                seq,
                result,
            }
        });
    }

    // ========================================================================
    // Moderation
    // ========================================================================

    /// Delete one of the user's own items. The item stays in the store until
    /// the backend confirms.
    pub fn remove_item(&mut self, item: &FeedItem) {
        let item = item.clone();
        let gateway = Arc::clone(&self.gateway);
        tracing::debug!(item_id = %item.id, "Deleting item");

        self.spawn("remove_item", async move {
            let result = gateway.delete_feed_item(&item).await;
            Outcome::Removed {
                item,
                admin: false,
                result,
            }
        });
    }

    /// Delete any item with moderator credentials, optionally shadow-banning
    /// its author. The ban is issued independently of the delete's outcome.
    pub fn remove_item_as_admin(&mut self, item: &FeedItem, is_ban: bool) {
        let Some(token) = self.moderator.as_ref().map(|m| m.token.clone()) else {
            tracing::warn!(item_id = %item.id, "Admin delete without moderator session");
            self.notify(MSG_UNAUTHORIZED, ADMIN_NOTIFICATION_DURATION);
            return;
        };
        tracing::info!(item_id = %item.id, is_ban, "Deleting item as moderator");

        let target = item.clone();
        let gateway = Arc::clone(&self.gateway);
        let delete_token = token.clone();
        self.spawn("admin_delete", async move {
            let result = gateway.admin_delete(&target, &delete_token).await;
            Outcome::Removed {
                item: target,
                admin: true,
                result,
            }
        });

        if is_ban {
            let target = item.clone();
            let gateway = Arc::clone(&self.gateway);
            self.spawn("shadow_ban", async move {
                let result = gateway.shadow_ban(&target, &token).await;
                Outcome::Banned {
                    item_id: target.id,
                    result,
                }
            });
        }
    }

    /// Report an item. Failures are only logged.
    pub fn report_item(&mut self, item: &FeedItem, description: &str) {
        let body = ReportBody {
            feed_item_id: item.id,
            report_creator_uuid: self.config.device_id.clone(),
            report_description: description.to_string(),
        };
        let gateway = Arc::clone(&self.gateway);
        self.spawn("report_item", async move {
            let result = gateway.report_item(&body).await;
            Outcome::Reported {
                item_id: body.feed_item_id,
                result,
            }
        });
    }

    // ========================================================================
    // Overlays
    // ========================================================================

    /// Open the lightbox on an item and resolve it across all sources.
    pub fn open_lightbox(&mut self, item_id: ItemId) -> LightboxTarget<'_> {
        self.apply(Command::LightboxOpened(item_id));
        lightbox_target(&self.state, item_id)
    }

    pub fn close_lightbox(&mut self) {
        self.apply(Command::LightboxClosed);
    }

    pub fn open_report_dialog(&mut self, item: &FeedItem) {
        self.apply(Command::ReportDialogOpened(item.clone()));
    }

    pub fn close_report_dialog(&mut self) {
        self.apply(Command::ReportDialogClosed);
    }

    pub fn store_closed_thread_height(&mut self, height: f32) {
        self.apply(Command::ClosedThreadHeightStored(height));
    }

    pub fn store_input_position(&mut self, position: f32) {
        self.apply(Command::InputPositionStored(position));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayError;
    use crate::model::{Author, AuthorKind, ContentType, VoteReceipt};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use secrecy::SecretString;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    type Reply<T> = oneshot::Receiver<Result<T, GatewayError>>;

    /// Gateway whose list, comment and vote replies are released by the test.
    #[derive(Default)]
    struct ScriptedGateway {
        feed_replies: Mutex<VecDeque<Reply<Vec<FeedItem>>>>,
        more_replies: Mutex<VecDeque<Reply<Vec<FeedItem>>>>,
        comment_replies: Mutex<VecDeque<Reply<Vec<FeedItem>>>>,
        vote_replies: Mutex<VecDeque<Reply<VoteReceipt>>>,
        calls: AtomicUsize,
    }

    async fn scripted<T: Default>(queue: &Mutex<VecDeque<Reply<T>>>) -> Result<T, GatewayError> {
        let reply = queue.lock().unwrap().pop_front();
        match reply {
            Some(rx) => rx.await.unwrap_or(Err(GatewayError::Timeout)),
            None => Ok(T::default()),
        }
    }

    impl Gateway for ScriptedGateway {
        async fn fetch_models(&self, _resource: &str, _query: &FeedQuery) -> Result<Vec<FeedItem>, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            scripted(&self.feed_replies).await
        }

        async fn fetch_more_feed(&self, _last_id: ItemId, _query: &FeedQuery) -> Result<Vec<FeedItem>, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            scripted(&self.more_replies).await
        }

        async fn fetch_comments(
            &self,
            _parent_id: ItemId,
            _offset: usize,
            _query: &FeedQuery,
        ) -> Result<Vec<FeedItem>, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            scripted(&self.comment_replies).await
        }

        async fn post_action(
            &self,
            _payload: &PostPayload,
            _location: Option<Location>,
            _query: &FeedQuery,
        ) -> Result<(), GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn vote_feed_item(&self, _vote: Vote) -> Result<VoteReceipt, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            scripted(&self.vote_replies).await
        }

        async fn delete_feed_item(&self, _item: &FeedItem) -> Result<(), GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn admin_delete(&self, _item: &FeedItem, _token: &SecretString) -> Result<(), GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn report_item(&self, _body: &ReportBody) -> Result<(), GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn refresh_comment_count(&self, _parent_id: ItemId) -> Result<u32, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        }

        async fn shadow_ban(&self, _item: &FeedItem, _token: &SecretString) -> Result<(), GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn item(id: i64, votes: i64, user_vote: VoteValue) -> FeedItem {
        FeedItem {
            id: ItemId(id),
            author: Author {
                id: Some(1),
                name: "someone".to_string(),
                team: None,
                kind: AuthorKind::OtherUser,
            },
            content_type: ContentType::Text,
            text: Some("hello".to_string()),
            url: None,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap() + chrono::Duration::minutes(id),
            votes,
            user_vote,
            number_of_comments: 0,
            parent_id: None,
        }
    }

    fn comment(id: i64, parent: i64) -> FeedItem {
        FeedItem {
            parent_id: Some(ItemId(parent)),
            ..item(id, 0, VoteValue::None)
        }
    }

    fn thread_ids(state: &FeedState) -> Vec<i64> {
        state.thread.items.iter().map(|c| c.id.0).collect()
    }

    /// Open the thread under `parent` with a settled first page.
    async fn open_thread(dispatcher: &mut Dispatcher<ScriptedGateway>, parent: i64, page: Vec<FeedItem>) {
        let tx = reply(&dispatcher.gateway.comment_replies);
        dispatcher.load_comments(ItemId(parent), 0);
        tx.send(Ok(page)).unwrap();
        dispatcher.settle().await;
    }

    fn config(fence_completions: bool, rollback_failed_votes: bool) -> Config {
        Config {
            city_id: Some(2),
            fence_completions,
            rollback_failed_votes,
            ..Config::default()
        }
    }

    async fn dispatcher(gateway: ScriptedGateway, config: Config) -> Dispatcher<ScriptedGateway> {
        let db = Database::open(":memory:").await.unwrap();
        Dispatcher::new(gateway, db, config)
    }

    fn reply<T>(queue: &Mutex<VecDeque<Reply<T>>>) -> oneshot::Sender<Result<T, GatewayError>> {
        let (tx, rx) = oneshot::channel();
        queue.lock().unwrap().push_back(rx);
        tx
    }

    /// Seed the feed list through a settled fetch.
    async fn seed(dispatcher: &mut Dispatcher<ScriptedGateway>, items: Vec<FeedItem>) {
        let tx = reply(&dispatcher.gateway.feed_replies);
        dispatcher.fetch_feed();
        tx.send(Ok(items)).unwrap();
        dispatcher.settle().await;
    }

    fn ids(state: &FeedState) -> Vec<i64> {
        state.list.iter().map(|i| i.id.0).collect()
    }

    #[tokio::test]
    async fn test_stale_feed_response_is_discarded() {
        let mut d = dispatcher(ScriptedGateway::default(), config(true, true)).await;
        let first = reply(&d.gateway.feed_replies);
        let second = reply(&d.gateway.feed_replies);

        d.fetch_feed();
        d.set_sort(FeedSort::New);

        second.send(Ok(vec![item(2, 0, VoteValue::None)])).unwrap();
        assert!(d.process_next().await);
        first.send(Ok(vec![item(1, 0, VoteValue::None)])).unwrap();
        d.settle().await;

        assert_eq!(ids(d.state()), vec![2]);
        assert_eq!(d.state().sort, FeedSort::New);
    }

    #[tokio::test]
    async fn test_unfenced_last_callback_wins() {
        let mut d = dispatcher(ScriptedGateway::default(), config(false, true)).await;
        let first = reply(&d.gateway.feed_replies);
        let second = reply(&d.gateway.feed_replies);

        d.fetch_feed();
        d.fetch_feed();

        second.send(Ok(vec![item(2, 0, VoteValue::None)])).unwrap();
        assert!(d.process_next().await);
        first.send(Ok(vec![item(1, 0, VoteValue::None)])).unwrap();
        d.settle().await;

        assert_eq!(ids(d.state()), vec![1]);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_list() {
        let mut d = dispatcher(ScriptedGateway::default(), config(true, true)).await;
        seed(&mut d, vec![item(1, 0, VoteValue::None)]).await;

        let tx = reply(&d.gateway.feed_replies);
        d.refresh_feed();
        assert!(d.state().is_refreshing);
        tx.send(Err(GatewayError::HttpStatus(500))).unwrap();
        d.settle().await;

        assert_eq!(ids(d.state()), vec![1]);
        assert_eq!(d.state().list_state, crate::model::LoadingState::Failed);
        assert!(!d.state().is_refreshing);
    }

    #[tokio::test]
    async fn test_no_city_skips_fetch() {
        let config = Config {
            city_id: None,
            ..config(true, true)
        };
        let mut d = dispatcher(ScriptedGateway::default(), config).await;
        d.fetch_feed();
        assert_eq!(d.pending(), 0);
        assert_eq!(d.gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_vote_is_applied_before_request_settles() {
        let mut d = dispatcher(ScriptedGateway::default(), config(true, true)).await;
        seed(&mut d, vec![item(1, 11, VoteValue::Up)]).await;

        let tx = reply(&d.gateway.vote_replies);
        d.vote(ItemId(1), VoteValue::Down);
        assert_eq!(d.state().list[0].votes, 9);
        assert_eq!(d.state().list[0].user_vote, VoteValue::Down);

        tx.send(Ok(VoteReceipt::default())).unwrap();
        d.settle().await;
        assert_eq!(d.state().list[0].votes, 9);
    }

    #[tokio::test]
    async fn test_authoritative_delta_is_added() {
        let mut d = dispatcher(ScriptedGateway::default(), config(true, true)).await;
        seed(&mut d, vec![item(1, 10, VoteValue::None)]).await;

        let tx = reply(&d.gateway.vote_replies);
        d.vote(ItemId(1), VoteValue::Up);
        tx.send(Ok(VoteReceipt { delta: 1 })).unwrap();
        d.settle().await;

        assert_eq!(d.state().list[0].votes, 12);
    }

    #[tokio::test]
    async fn test_failed_vote_rolls_back() {
        let mut d = dispatcher(ScriptedGateway::default(), config(true, true)).await;
        seed(&mut d, vec![item(1, 10, VoteValue::None)]).await;
        let before = d.snapshot();

        let tx = reply(&d.gateway.vote_replies);
        d.vote(ItemId(1), VoteValue::Up);
        tx.send(Err(GatewayError::HttpStatus(500))).unwrap();
        d.settle().await;

        assert_eq!(d.state().list, before.list);
    }

    #[tokio::test]
    async fn test_failed_vote_kept_without_rollback() {
        let mut d = dispatcher(ScriptedGateway::default(), config(true, false)).await;
        seed(&mut d, vec![item(1, 10, VoteValue::None)]).await;

        let tx = reply(&d.gateway.vote_replies);
        d.vote(ItemId(1), VoteValue::Up);
        tx.send(Err(GatewayError::Timeout)).unwrap();
        d.settle().await;

        assert_eq!(d.state().list[0].votes, 11);
        assert_eq!(d.state().list[0].user_vote, VoteValue::Up);
    }

    #[tokio::test]
    async fn test_superseded_vote_failure_is_not_rolled_back() {
        let mut d = dispatcher(ScriptedGateway::default(), config(true, true)).await;
        seed(&mut d, vec![item(1, 10, VoteValue::None)]).await;

        let first = reply(&d.gateway.vote_replies);
        let second = reply(&d.gateway.vote_replies);
        d.vote(ItemId(1), VoteValue::Up);
        d.vote(ItemId(1), VoteValue::Down);
        assert_eq!(d.state().list[0].votes, 9);

        first.send(Err(GatewayError::Timeout)).unwrap();
        second.send(Ok(VoteReceipt::default())).unwrap();
        d.settle().await;

        assert_eq!(d.state().list[0].votes, 9);
        assert_eq!(d.state().list[0].user_vote, VoteValue::Down);
    }

    #[tokio::test]
    async fn test_failed_vote_after_reload_keeps_server_values() {
        let mut d = dispatcher(ScriptedGateway::default(), config(true, true)).await;
        seed(&mut d, vec![item(1, 10, VoteValue::None)]).await;

        let vote = reply(&d.gateway.vote_replies);
        d.vote(ItemId(1), VoteValue::Up);
        assert_eq!(d.state().list[0].votes, 11);

        let feed = reply(&d.gateway.feed_replies);
        d.refresh_feed();
        feed.send(Ok(vec![item(1, 10, VoteValue::None)])).unwrap();
        assert!(d.process_next().await);
        assert_eq!(d.state().list[0].votes, 10);

        vote.send(Err(GatewayError::HttpStatus(500))).unwrap();
        d.settle().await;

        assert_eq!(d.state().list[0].votes, 10);
        assert_eq!(d.state().list[0].user_vote, VoteValue::None);
    }

    #[tokio::test]
    async fn test_vote_on_unknown_item_is_noop() {
        let mut d = dispatcher(ScriptedGateway::default(), config(true, true)).await;
        let before = d.snapshot();
        d.vote(ItemId(404), VoteValue::Up);

        assert_eq!(d.pending(), 0);
        assert_eq!(d.snapshot(), before);
    }

    #[tokio::test]
    async fn test_snapshot_is_not_affected_by_later_transitions() {
        let mut d = dispatcher(ScriptedGateway::default(), config(true, true)).await;
        seed(&mut d, vec![item(1, 10, VoteValue::None)]).await;
        let snapshot = d.snapshot();

        let tx = reply(&d.gateway.vote_replies);
        d.vote(ItemId(1), VoteValue::Up);
        tx.send(Ok(VoteReceipt::default())).unwrap();
        d.settle().await;

        assert_eq!(snapshot.list[0].votes, 10);
        assert_eq!(d.state().list[0].votes, 11);
    }

    #[tokio::test]
    async fn test_load_more_is_single_flight_and_dedups() {
        let mut d = dispatcher(ScriptedGateway::default(), config(true, true)).await;
        seed(&mut d, vec![item(3, 0, VoteValue::None), item(2, 0, VoteValue::None)]).await;

        let tx = reply(&d.gateway.more_replies);
        d.load_more();
        d.load_more();
        assert_eq!(d.pending(), 1);

        tx.send(Ok(vec![item(2, 0, VoteValue::None), item(1, 0, VoteValue::None)]))
            .unwrap();
        d.settle().await;

        assert_eq!(ids(d.state()), vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_load_more_discarded_after_feed_replaced() {
        let mut d = dispatcher(ScriptedGateway::default(), config(true, true)).await;
        seed(&mut d, vec![item(5, 0, VoteValue::None)]).await;

        let more = reply(&d.gateway.more_replies);
        d.load_more();
        let feed = reply(&d.gateway.feed_replies);
        d.refresh_feed();

        feed.send(Ok(vec![item(9, 0, VoteValue::None)])).unwrap();
        more.send(Ok(vec![item(4, 0, VoteValue::None)])).unwrap();
        d.settle().await;

        assert_eq!(ids(d.state()), vec![9]);
    }

    #[tokio::test]
    async fn test_load_more_skipped_while_refreshing() {
        let mut d = dispatcher(ScriptedGateway::default(), config(true, true)).await;
        seed(&mut d, vec![item(5, 0, VoteValue::None)]).await;

        let feed = reply(&d.gateway.feed_replies);
        d.refresh_feed();
        d.load_more();
        assert_eq!(d.pending(), 1);

        feed.send(Ok(vec![item(5, 0, VoteValue::None)])).unwrap();
        d.settle().await;
        assert_eq!(ids(d.state()), vec![5]);
    }

    #[tokio::test]
    async fn test_comment_page_is_single_flight() {
        let mut d = dispatcher(ScriptedGateway::default(), config(true, true)).await;
        open_thread(&mut d, 1, vec![comment(10, 1)]).await;

        let tx = reply(&d.gateway.comment_replies);
        d.load_comments(ItemId(1), 1);
        d.load_comments(ItemId(1), 1);
        assert_eq!(d.pending(), 1);

        tx.send(Ok(vec![comment(11, 1)])).unwrap();
        d.settle().await;

        assert_eq!(thread_ids(d.state()), vec![10, 11]);
        assert_eq!(d.state().thread.offset, 2);

        // The page can be requested again once settled
        d.load_comments(ItemId(1), 1);
        assert_eq!(d.pending(), 1);
        d.settle().await;
    }

    #[tokio::test]
    async fn test_comment_page_drops_listed_comments() {
        let mut d = dispatcher(ScriptedGateway::default(), config(true, true)).await;
        open_thread(&mut d, 1, vec![comment(10, 1), comment(11, 1)]).await;

        let tx = reply(&d.gateway.comment_replies);
        d.load_comments(ItemId(1), 2);
        tx.send(Ok(vec![comment(11, 1), comment(12, 1)])).unwrap();
        d.settle().await;

        assert_eq!(thread_ids(d.state()), vec![10, 11, 12]);
        assert_eq!(d.state().thread.offset, 3);
    }

    #[tokio::test]
    async fn test_admin_delete_without_session_notifies() {
        let mut d = dispatcher(ScriptedGateway::default(), config(true, true)).await;
        d.remove_item_as_admin(&item(1, 0, VoteValue::None), true);

        assert_eq!(d.pending(), 0);
        assert_eq!(d.state().notification.message.as_deref(), Some(MSG_UNAUTHORIZED));
        assert_eq!(d.state().notification.duration, ADMIN_NOTIFICATION_DURATION);
    }

    #[tokio::test]
    async fn test_open_lightbox_reports_missing_target() {
        let mut d = dispatcher(ScriptedGateway::default(), config(true, true)).await;
        assert_eq!(d.open_lightbox(ItemId(7)), LightboxTarget::NotFound(ItemId(7)));
        assert_eq!(d.state().overlay.lightbox_item_id, Some(ItemId(7)));
        d.close_lightbox();
        assert_eq!(d.state().overlay.lightbox_item_id, None);
    }

    #[tokio::test]
    async fn test_store_moderator_then_restore() {
        let mut d = dispatcher(ScriptedGateway::default(), config(true, true)).await;
        d.store_moderator(Moderator {
            name: None,
            token: SecretString::from("tok"),
        })
        .await
        .unwrap();
        assert!(d.is_moderator());

        d.restore_session().await;
        assert!(d.is_moderator());
        assert_eq!(d.state().session.role, crate::store::Role::Moderator);
    }
}
