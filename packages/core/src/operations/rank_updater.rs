//! Sibling ranking
//!
//! Children of one parent carry integer ranks that are unique and contiguous
//! from 1. Moving or inserting a sibling shifts the others instead of leaving
//! holes or duplicates.
//!
//! The functions here are pure: they take the current siblings and return the
//! rank changes to apply. Only siblings whose rank actually changes are
//! reported, so applying the result twice is a no-op.
//!
//! # Examples
//!
//! ```rust
//! use taxonomy_core::operations::rank_updater::{rank_connections, Rankable};
//! use taxonomy_core::models::PublicId;
//!
//! struct Sibling(PublicId, i32);
//!
//! impl Rankable for Sibling {
//!     fn rank_id(&self) -> &PublicId { &self.0 }
//!     fn rank(&self) -> i32 { self.1 }
//! }
//!
//! let id = |n: u32| PublicId::from_parts("node-connection", n).unwrap();
//! let siblings = vec![Sibling(id(1), 1), Sibling(id(2), 2), Sibling(id(3), 3), Sibling(id(4), 4)];
//!
//! // Move the last sibling to the front
//! let changes = rank_connections(&siblings, &id(4), 1);
//! assert_eq!(changes.len(), 4);
//! ```

use crate::models::node::PublicId;

/// Anything that carries a sibling rank
pub trait Rankable {
    fn rank_id(&self) -> &PublicId;
    fn rank(&self) -> i32;
}

impl<T: Rankable + ?Sized> Rankable for &T {
    fn rank_id(&self) -> &PublicId {
        (**self).rank_id()
    }

    fn rank(&self) -> i32 {
        (**self).rank()
    }
}

/// One rank change to apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankChange {
    pub connection_id: PublicId,
    pub old_rank: i32,
    pub new_rank: i32,
}

fn ordered<T: Rankable>(siblings: &[T]) -> Vec<&T> {
    let mut sorted: Vec<&T> = siblings.iter().collect();
    sorted.sort_by(|a, b| a.rank().cmp(&b.rank()).then_with(|| a.rank_id().cmp(b.rank_id())));
    sorted
}

fn renumber<'a, T: Rankable + 'a>(sequence: impl IntoIterator<Item = &'a T>) -> Vec<RankChange> {
    sequence
        .into_iter()
        .enumerate()
        .filter_map(|(index, sibling)| {
            let new_rank = index as i32 + 1;
            (sibling.rank() != new_rank).then(|| RankChange {
                connection_id: sibling.rank_id().clone(),
                old_rank: sibling.rank(),
                new_rank,
            })
        })
        .collect()
}

/// Rank for a sibling appended after all existing ones (`max + 1`, or 1 when empty)
pub fn next_rank<T: Rankable>(siblings: &[T]) -> i32 {
    siblings.iter().map(Rankable::rank).max().map_or(1, |max| max.max(0) + 1)
}

/// Move `target` to `desired_rank` among `siblings` and renumber 1..N.
///
/// `siblings` must contain `target`. `desired_rank` is clamped to `1..=N`.
/// Ties in the current ranks are broken by id, so the result is deterministic
/// even for inconsistent input. Returns an empty list when `target` is not
/// among `siblings`.
pub fn rank_connections<T: Rankable>(
    siblings: &[T],
    target: &PublicId,
    desired_rank: i32,
) -> Vec<RankChange> {
    let mut sequence = ordered(siblings);
    let Some(position) = sequence.iter().position(|s| s.rank_id() == target) else {
        return Vec::new();
    };
    let moved = sequence.remove(position);

    let max_rank = sequence.len() as i32 + 1;
    let index = (desired_rank.clamp(1, max_rank) - 1) as usize;
    sequence.insert(index, moved);

    renumber(sequence)
}

/// Renumber `siblings` 1..N in their current order (after a removal)
pub fn close_gaps<T: Rankable>(siblings: &[T]) -> Vec<RankChange> {
    renumber(ordered(siblings))
}
