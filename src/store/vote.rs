//! Vote tally arithmetic.
//!
//! Switching between opposite votes moves the tally by 2 (undo old, apply
//! new), a first vote moves it by 1, and reasserting the current value is a
//! no-op. Re-clicking the current value therefore never removes a vote.

use crate::model::VoteValue;

/// Outcome of requesting `requested` on an item currently at
/// (`votes`, `user_vote`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteChange {
    pub delta: i64,
    pub votes: i64,
    pub user_vote: VoteValue,
}

pub fn vote_delta(user_vote: VoteValue, requested: VoteValue) -> i64 {
    let was_voted = user_vote != VoteValue::None;
    let changed = user_vote != requested;
    let multiplier = if was_voted { 2 } else { 1 };
    if changed {
        requested.as_i64() * multiplier
    } else {
        0
    }
}

pub fn compute_vote(votes: i64, user_vote: VoteValue, requested: VoteValue) -> VoteChange {
    let delta = vote_delta(user_vote, requested);
    VoteChange {
        delta,
        votes: votes + delta,
        user_vote: requested,
    }
}
