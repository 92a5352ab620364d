//! Tree sorting
//!
//! Turns a flat list of (id, parent id, rank) elements into a pre-order
//! sequence: each element is followed by its children, siblings ordered by
//! rank then id.
//!
//! ```text
//! subject:1
//! ├── topic:2   (rank 2)
//! └── topic:1   (rank 1)
//!     └── resource:1
//!
//! => subject:1, topic:1, resource:1, topic:2
//! ```
//!
//! Elements whose parent is not in the list start their own root group.
//! On a DAG the same child id can appear once per path; each parent
//! occurrence takes the next unconsumed element per child id, so every input
//! element is emitted exactly once.

use crate::models::node::PublicId;
use crate::operations::error::OperationError;
use std::collections::{HashMap, HashSet};

/// An element that can be placed in a tree listing
pub trait Sortable {
    fn sortable_id(&self) -> &PublicId;
    fn sortable_parent_id(&self) -> Option<&PublicId>;
    fn sortable_rank(&self) -> i32;
}

struct Frame {
    children: Vec<usize>,
    next: usize,
}

/// Take the next unconsumed element per distinct child id from a group
fn take_children(
    group: Option<&Vec<usize>>,
    ids: &[PublicId],
    consumed: &mut [bool],
) -> Vec<usize> {
    let mut taken_ids: HashSet<&PublicId> = HashSet::new();
    let mut selected = Vec::new();
    for &index in group.map(Vec::as_slice).unwrap_or_default() {
        if consumed[index] || taken_ids.contains(&ids[index]) {
            continue;
        }
        taken_ids.insert(&ids[index]);
        consumed[index] = true;
        selected.push(index);
    }
    selected
}

/// Sort `elements` into pre-order.
///
/// # Errors
///
/// - `CycleDetected` if an element is reached below itself
/// - `Unreachable` if some elements only hang off a parent cycle and are never emitted
pub fn sort_list<T: Sortable>(elements: Vec<T>) -> Result<Vec<T>, OperationError> {
    let ids: Vec<PublicId> = elements.iter().map(|e| e.sortable_id().clone()).collect();
    let known: HashSet<&PublicId> = ids.iter().collect();

    let mut groups: HashMap<Option<PublicId>, Vec<usize>> = HashMap::new();
    for (index, element) in elements.iter().enumerate() {
        let parent = element
            .sortable_parent_id()
            .filter(|parent| known.contains(parent))
            .cloned();
        groups.entry(parent).or_default().push(index);
    }
    for group in groups.values_mut() {
        group.sort_by(|&a, &b| {
            elements[a]
                .sortable_rank()
                .cmp(&elements[b].sortable_rank())
                .then_with(|| ids[a].cmp(&ids[b]))
                .then_with(|| a.cmp(&b))
        });
    }

    let mut consumed = vec![false; elements.len()];
    let mut order: Vec<usize> = Vec::with_capacity(elements.len());
    let mut path: Vec<&PublicId> = Vec::new();
    let mut frames = vec![Frame {
        children: take_children(groups.get(&None), &ids, &mut consumed),
        next: 0,
    }];

    while let Some(frame) = frames.last_mut() {
        if frame.next >= frame.children.len() {
            frames.pop();
            path.pop();
            continue;
        }
        let index = frame.children[frame.next];
        frame.next += 1;

        let id = &ids[index];
        if path.contains(&id) {
            let mut cycle: Vec<String> = path.iter().map(|p| p.to_string()).collect();
            cycle.push(id.to_string());
            return Err(OperationError::CycleDetected {
                node_id: id.to_string(),
                path: cycle,
            });
        }
        order.push(index);
        path.push(id);
        let children = take_children(groups.get(&Some(id.clone())), &ids, &mut consumed);
        frames.push(Frame { children, next: 0 });
    }

    let leftovers: Vec<String> = consumed
        .iter()
        .enumerate()
        .filter(|(_, done)| !**done)
        .map(|(index, _)| ids[index].to_string())
        .collect();
    if !leftovers.is_empty() {
        return Err(OperationError::Unreachable { ids: leftovers });
    }

    let mut slots: Vec<Option<T>> = elements.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect())
}
