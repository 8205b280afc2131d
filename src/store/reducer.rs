//! The sole mutator of [`FeedState`].
//!
//! `reduce` never touches its input. Lists are replaced copy-on-write, so a
//! snapshot taken before a reduction keeps observing the old contents.

use std::sync::Arc;

use super::command::{Command, ItemSource};
use super::state::{CommentThread, FeedState, Role};
use crate::model::{FeedItem, ItemId, LoadingState};

/// Apply `command` to `state`, producing the next state.
pub fn reduce(state: &FeedState, command: Command) -> FeedState {
    let mut next = state.clone();
    apply(&mut next, command);
    next
}

fn apply(state: &mut FeedState, command: Command) {
    match command {
        // --------------------------------------------------------------------
        // Feed list
        // --------------------------------------------------------------------
        Command::FeedRequested => {
            state.list_state = LoadingState::Loading;
        }
        Command::RefreshStarted => {
            state.is_refreshing = true;
        }
        Command::FeedLoaded { items } => {
            state.list = Arc::new(items);
            state.list_state = LoadingState::Ready;
            state.is_refreshing = false;
        }
        Command::FeedLoadFailed => {
            // Keep the previous list so a retry recovers without data loss
            state.list_state = LoadingState::Failed;
            state.is_refreshing = false;
        }
        Command::FeedAppended { items } => {
            if !items.is_empty() {
                Arc::make_mut(&mut state.list).extend(items);
            }
        }
        Command::SortChanged(sort) => {
            state.sort = sort;
        }
        Command::SourceLoaded { source, items } => match source {
            ItemSource::User(_) => state.user_items = Arc::new(items),
            ItemSource::Event(_) => state.event_items = Arc::new(items),
        },

        // --------------------------------------------------------------------
        // Comment thread
        // --------------------------------------------------------------------
        Command::CommentsRequested { parent_id } => {
            open_thread(state, parent_id);
            state.comment_state = LoadingState::Loading;
        }
        Command::CommentsLoaded { parent_id, items } => {
            open_thread(state, parent_id);
            state.thread.offset = items.len();
            state.thread.items = Arc::new(items);
            state.comment_state = LoadingState::Ready;
        }
        Command::CommentsAppended { parent_id, items } => {
            if state.thread.parent_id != Some(parent_id) {
                tracing::debug!(parent_id = %parent_id, "Comment page for a closed thread, ignoring");
                return;
            }
            if !items.is_empty() {
                state.thread.offset += items.len();
                Arc::make_mut(&mut state.thread.items).extend(items);
            }
            state.comment_state = LoadingState::Ready;
        }
        Command::CommentsFailed { parent_id } => {
            if state.thread.parent_id == Some(parent_id) {
                state.comment_state = LoadingState::Failed;
            }
        }
        Command::CommentsClosed => {
            state.thread = CommentThread::default();
            state.comment_state = LoadingState::None;
        }
        Command::CommentCountUpdated { parent_id, count } => {
            let is_open = state.thread.parent_id == Some(parent_id);
            if is_open {
                state.thread.total = Some(count);
            }
            let patched = patch_item(state, parent_id, |item| item.number_of_comments = count);
            if patched == 0 && !is_open {
                tracing::debug!(item_id = %parent_id, "Comment count for unknown item, ignoring");
            }
        }

        // --------------------------------------------------------------------
        // Votes
        // --------------------------------------------------------------------
        Command::VoteApplied {
            item_id,
            value,
            delta,
        } => {
            let patched = patch_item(state, item_id, |item| {
                item.votes += delta;
                item.user_vote = value;
            });
            log_missing(patched, item_id, "vote");
        }
        Command::VoteConfirmed { item_id, delta } => {
            let patched = patch_item(state, item_id, |item| item.votes += delta);
            log_missing(patched, item_id, "vote confirmation");
        }
        Command::VoteReverted {
            item_id,
            delta,
            previous,
        } => {
            let patched = patch_item(state, item_id, |item| {
                item.votes -= delta;
                item.user_vote = previous;
            });
            log_missing(patched, item_id, "vote rollback");
        }

        Command::ItemRemoved { item_id } => remove_item(state, item_id),

        // --------------------------------------------------------------------
        // Submission
        // --------------------------------------------------------------------
        Command::PostStarted => state.post_state = LoadingState::Loading,
        Command::PostSucceeded => state.post_state = LoadingState::Ready,
        Command::PostFailed => state.post_state = LoadingState::Failed,

        // --------------------------------------------------------------------
        // Notification
        // --------------------------------------------------------------------
        Command::NotificationShown {
            message,
            seq,
            duration,
            deadline,
        } => {
            let slot = &mut state.notification;
            slot.message = Some(message);
            slot.visible = true;
            slot.seq = seq;
            slot.duration = duration;
            slot.deadline = Some(deadline);
        }
        Command::NotificationHidden { seq } => {
            let slot = &mut state.notification;
            if slot.seq != seq {
                tracing::debug!(seq, current = slot.seq, "Stale notification dismissal, ignoring");
                return;
            }
            slot.visible = false;
            slot.deadline = None;
        }

        // --------------------------------------------------------------------
        // Overlays
        // --------------------------------------------------------------------
        Command::LightboxOpened(id) => state.overlay.lightbox_item_id = Some(id),
        Command::LightboxClosed => state.overlay.lightbox_item_id = None,
        Command::ReportDialogOpened(item) => state.overlay.report_target = Some(item),
        Command::ReportDialogClosed => state.overlay.report_target = None,
        Command::ClosedThreadHeightStored(height) => state.overlay.closed_thread_height = height,
        Command::InputPositionStored(position) => state.overlay.input_position = position,

        // --------------------------------------------------------------------
        // Session
        // --------------------------------------------------------------------
        Command::SessionRestored { moderator } => {
            state.session.role = if moderator { Role::Moderator } else { Role::User };
            state.session.forced_logout = false;
        }
        Command::ForcedLogout => {
            state.session.role = Role::User;
            state.session.forced_logout = true;
        }
    }
}

/// Make `parent_id` the open thread. Switching parents discards the previous
/// thread's contents.
fn open_thread(state: &mut FeedState, parent_id: ItemId) {
    if state.thread.parent_id != Some(parent_id) {
        state.thread = CommentThread {
            parent_id: Some(parent_id),
            ..CommentThread::default()
        };
    }
}

/// Apply `patch` to every copy of `id` across all item lists.
///
/// Lists that don't hold the id are left shared. Returns the number of
/// patched copies.
fn patch_item<F>(state: &mut FeedState, id: ItemId, patch: F) -> usize
where
    F: Fn(&mut FeedItem),
{
    let mut patched = 0;
    for list in [
        &mut state.list,
        &mut state.thread.items,
        &mut state.user_items,
        &mut state.event_items,
    ] {
        if !list.iter().any(|item| item.id == id) {
            continue;
        }
        for item in Arc::make_mut(list).iter_mut().filter(|item| item.id == id) {
            patch(item);
            patched += 1;
        }
    }
    patched
}

fn log_missing(patched: usize, item_id: ItemId, what: &str) {
    if patched == 0 {
        tracing::debug!(item_id = %item_id, what, "Patch target not in store, ignoring");
    }
}

/// Remove a confirmed-deleted item: first match in the feed list, else in
/// the open thread. Auxiliary lists drop every copy afterwards.
fn remove_item(state: &mut FeedState, item_id: ItemId) {
    let mut removed = false;

    if let Some(pos) = state.list.iter().position(|item| item.id == item_id) {
        Arc::make_mut(&mut state.list).remove(pos);
        removed = true;
    } else if let Some(pos) = state.thread.items.iter().position(|item| item.id == item_id) {
        Arc::make_mut(&mut state.thread.items).remove(pos);
        state.thread.offset = state.thread.offset.saturating_sub(1);
        removed = true;
    }

    for list in [&mut state.user_items, &mut state.event_items] {
        if list.iter().any(|item| item.id == item_id) {
            Arc::make_mut(list).retain(|item| item.id != item_id);
            removed = true;
        }
    }

    if !removed {
        tracing::debug!(item_id = %item_id, "Deleted item not in store, ignoring");
        return;
    }

    if state.thread.parent_id == Some(item_id) {
        state.thread = CommentThread::default();
        state.comment_state = LoadingState::None;
    }
    if state.overlay.lightbox_item_id == Some(item_id) {
        state.overlay.lightbox_item_id = None;
    }
}
