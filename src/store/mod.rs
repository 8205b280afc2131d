//! Canonical feed store: state value, commands, reducer and projections.

mod command;
mod reducer;
mod selectors;
mod state;
mod vote;

pub use command::{Command, ItemSource};
pub use reducer::reduce;
pub use selectors::{find_item, lightbox_target, load_more_cursor, merged_items, open_lightbox, LightboxTarget};
pub use state::{CommentThread, FeedState, Notification, OverlayState, Role, Session};
pub use vote::{compute_vote, vote_delta, VoteChange};
