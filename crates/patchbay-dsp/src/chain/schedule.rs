//! Ordering and compiled schedule types for the DSP chain.
//!
//! [`resolve()`] turns a possibly cyclic set of processors and connections into
//! an evaluation order:
//!
//! 1. The processors are split into cycle groups (strongly connected
//!    components). Within each group, a depth-first search starts at the
//!    group's lowest slot and follows the group's own connections in
//!    connection insertion order. Every edge that reaches a processor still on
//!    the DFS stack (a back-edge) is marked **delayed**: its consumer reads
//!    the producer's output from the previous block. For a simple cycle this is
//!    exactly the edge entering the cycle's first inserted processor, however
//!    the cycle is entered from outside.
//! 2. The remaining edges form a DAG, which Kahn's algorithm sorts. Among the
//!    processors that are ready at the same time, the one inserted first wins.
//!
//! For a back-edge `u → v`, the DFS tree holds a path `v → … → u`, so `v` is
//! always ordered before `u`. The consumer therefore runs before the producer
//! within the block, and the producer's persistent output buffer still holds the
//! previous block when the consumer reads it. No extra delay storage is needed.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::connection::{ConnectionId, ProcessorId};

/// An edge between two processor slots, used only during resolution.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Edge {
    pub id: ConnectionId,
    pub from: usize,
    pub to: usize,
}

/// Evaluation order plus the connections treated as one-block delays.
#[derive(Debug, Default)]
pub(crate) struct Resolution {
    pub order: Vec<usize>,
    pub delayed: Vec<ConnectionId>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Resolves an evaluation order over `members` (slot indices, ascending).
///
/// Edges must be given in connection insertion order and must only reference
/// slots in `members`.
pub(crate) fn resolve(slot_count: usize, members: &[usize], edges: &[Edge]) -> Resolution {
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); slot_count];
    for (i, edge) in edges.iter().enumerate() {
        adjacency[edge.from].push(i);
    }

    // Phase 1: back-edges of a DFS inside each cycle group. Members are
    // ascending, so the first member seen of a group is its lowest slot.
    let group = cycle_groups(slot_count, members, edges, &adjacency);
    let mut mark = vec![Mark::Unvisited; slot_count];
    let mut back = vec![false; edges.len()];
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for &root in members {
        if mark[root] != Mark::Unvisited {
            continue;
        }
        mark[root] = Mark::OnStack;
        stack.push((root, 0));

        while let Some(top) = stack.last_mut() {
            let (node, pos) = *top;
            if let Some(&edge_idx) = adjacency[node].get(pos) {
                top.1 += 1;
                let to = edges[edge_idx].to;
                if group[to] != group[node] {
                    continue;
                }
                match mark[to] {
                    Mark::Unvisited => {
                        mark[to] = Mark::OnStack;
                        stack.push((to, 0));
                    }
                    Mark::OnStack => back[edge_idx] = true,
                    Mark::Done => {}
                }
            } else {
                mark[node] = Mark::Done;
                stack.pop();
            }
        }
    }

    // Phase 2: Kahn over forward edges, lowest slot first.
    let mut in_degree = vec![0usize; slot_count];
    for (i, edge) in edges.iter().enumerate() {
        if !back[i] {
            in_degree[edge.to] += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = members
        .iter()
        .copied()
        .filter(|&slot| in_degree[slot] == 0)
        .map(Reverse)
        .collect();

    let mut order = Vec::with_capacity(members.len());
    while let Some(Reverse(slot)) = ready.pop() {
        order.push(slot);
        for &edge_idx in &adjacency[slot] {
            if back[edge_idx] {
                continue;
            }
            let to = edges[edge_idx].to;
            in_degree[to] -= 1;
            if in_degree[to] == 0 {
                ready.push(Reverse(to));
            }
        }
    }
    debug_assert_eq!(order.len(), members.len(), "forward edges must be acyclic");

    let delayed = edges
        .iter()
        .zip(back.iter())
        .filter(|(_, b)| **b)
        .map(|(e, _)| e.id)
        .collect();

    Resolution { order, delayed }
}

const UNSEEN: usize = usize::MAX;

/// Labels each member slot with its strongly connected component (Tarjan,
/// iterative). Slots outside `members` keep [`UNSEEN`].
fn cycle_groups(
    slot_count: usize,
    members: &[usize],
    edges: &[Edge],
    adjacency: &[Vec<usize>],
) -> Vec<usize> {
    let mut index = vec![UNSEEN; slot_count];
    let mut low = vec![0usize; slot_count];
    let mut on_stack = vec![false; slot_count];
    let mut group = vec![UNSEEN; slot_count];
    let mut pending: Vec<usize> = Vec::new();
    let mut calls: Vec<(usize, usize)> = Vec::new();
    let mut next_index = 0;
    let mut next_group = 0;

    for &root in members {
        if index[root] != UNSEEN {
            continue;
        }
        index[root] = next_index;
        low[root] = next_index;
        next_index += 1;
        pending.push(root);
        on_stack[root] = true;
        calls.push((root, 0));

        while let Some(top) = calls.last_mut() {
            let (node, pos) = *top;
            if let Some(&edge_idx) = adjacency[node].get(pos) {
                top.1 += 1;
                let to = edges[edge_idx].to;
                if index[to] == UNSEEN {
                    index[to] = next_index;
                    low[to] = next_index;
                    next_index += 1;
                    pending.push(to);
                    on_stack[to] = true;
                    calls.push((to, 0));
                } else if on_stack[to] {
                    low[node] = low[node].min(index[to]);
                }
                continue;
            }

            calls.pop();
            if let Some(&(parent, _)) = calls.last() {
                low[parent] = low[parent].min(low[node]);
            }
            if low[node] == index[node] {
                while let Some(member) = pending.pop() {
                    on_stack[member] = false;
                    group[member] = next_group;
                    if member == node {
                        break;
                    }
                }
                next_group += 1;
            }
        }
    }
    group
}

/// One input accumulation: add `source.outlet` into the step's `inlet`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Feed {
    pub source: usize,
    pub outlet: usize,
    pub inlet: usize,
}

/// One processor evaluation in the compiled schedule.
#[derive(Debug, Clone)]
pub(crate) struct Step {
    pub slot: usize,
    pub feeds: Vec<Feed>,
}

/// Immutable result of [`Chain::compile()`](super::Chain::compile).
///
/// Holds the flat list of steps the audio thread executes plus the order in
/// which processors were prepared (released in reverse).
#[derive(Debug, Default)]
pub struct Schedule {
    pub(crate) steps: Vec<Step>,
    pub(crate) prepared: Vec<usize>,
    pub(crate) delayed: Vec<ConnectionId>,
}

impl Schedule {
    /// Returns the number of processors executed per tick.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Returns the execution order of active processors.
    pub fn order(&self) -> Vec<ProcessorId> {
        self.steps
            .iter()
            .map(|s| ProcessorId(s.slot as u32))
            .collect()
    }

    /// Returns the connections read with a one-block delay.
    pub fn delayed_connections(&self) -> &[ConnectionId] {
        &self.delayed
    }
}
