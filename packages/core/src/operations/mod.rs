//! Graph Operations
//!
//! Pure algorithms over sibling and tree structure, with no store access:
//!
//! - [`rank_updater`] - keeps sibling ranks unique and contiguous from 1
//! - [`tree_sorter`] - flattens (id, parent, rank) elements into pre-order
//!
//! Services call these inside a transaction and persist the results.

pub mod error;
pub mod rank_updater;
pub mod tree_sorter;

pub use error::OperationError;
pub use rank_updater::{close_gaps, next_rank, rank_connections, RankChange, Rankable};
pub use tree_sorter::{sort_list, Sortable};
