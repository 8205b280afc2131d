//! Read-only projections over [`FeedState`].

use std::collections::HashSet;

use super::state::FeedState;
use crate::model::{FeedItem, ItemId};

/// Every known item keyed by id: the feed list first, then user items,
/// event items and the open thread. The first copy of an id wins.
pub fn merged_items(state: &FeedState) -> Vec<&FeedItem> {
    let mut seen = HashSet::new();
    state
        .list
        .iter()
        .chain(state.user_items.iter())
        .chain(state.event_items.iter())
        .chain(state.thread.items.iter())
        .filter(|item| seen.insert(item.id))
        .collect()
}

/// Resolve an id wherever it lives.
pub fn find_item(state: &FeedState, id: ItemId) -> Option<&FeedItem> {
    state
        .list
        .iter()
        .chain(state.user_items.iter())
        .chain(state.event_items.iter())
        .chain(state.thread.items.iter())
        .find(|item| item.id == id)
}

/// Result of resolving the lightbox overlay's item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightboxTarget<'a> {
    Found(&'a FeedItem),
    NotFound(ItemId),
}

pub fn lightbox_target(state: &FeedState, id: ItemId) -> LightboxTarget<'_> {
    match find_item(state, id) {
        Some(item) => LightboxTarget::Found(item),
        None => LightboxTarget::NotFound(id),
    }
}

/// The item the open lightbox shows, if any is open.
pub fn open_lightbox(state: &FeedState) -> Option<LightboxTarget<'_>> {
    state
        .overlay
        .lightbox_item_id
        .map(|id| lightbox_target(state, id))
}

/// Cursor for the next older feed page: the oldest non-system item.
pub fn load_more_cursor(state: &FeedState) -> Option<ItemId> {
    state
        .list
        .iter()
        .filter(|item| !item.is_system())
        .min_by_key(|item| item.created_at)
        .map(|item| item.id)
}
