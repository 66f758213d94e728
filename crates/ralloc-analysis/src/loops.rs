//! Natural loop detection: back edges found via dominance, bodies grown by backward
//! reachability, nesting resolved by body containment of headers.

use std::collections::{BTreeMap, BTreeSet};

use ralloc_ir::{BlockId, Function, Loop, LoopId};

use crate::dominance::dominates;

/// Find every natural loop in `function`, writing the result into `Function::loops` and
/// each block's `loop_id`. `order` need not be any particular order; dominance must
/// already have been computed.
pub fn find_loops(function: &mut Function, order: &[BlockId]) {
    let mut bodies: BTreeMap<BlockId, BTreeSet<BlockId>> = BTreeMap::new();
    let mut tails: BTreeMap<BlockId, BlockId> = BTreeMap::new();

    for &u in order {
        for &v in &function.block(u).successors.clone() {
            if dominates(function, v, u) {
                let body = grow_body(function, v, u);
                let entry = bodies.entry(v).or_insert_with(BTreeSet::new);
                entry.extend(body);
                tails.insert(v, u);
            }
        }
    }

    let headers: Vec<BlockId> = bodies.keys().copied().collect();
    let mut loops: Vec<Loop> = headers
        .iter()
        .enumerate()
        .map(|(i, &header)| Loop {
            id: LoopId::new(i as u32),
            header,
            tail: tails[&header],
            body: bodies[&header].clone(),
            parent: None,
            depth: 1,
        })
        .collect();

    // A loop L is nested in loop M (M != L) when M's body contains L's header. The
    // parent is the smallest such enclosing body.
    for i in 0..loops.len() {
        let header = loops[i].header;
        let mut best: Option<(usize, usize)> = None; // (loop index, body size)
        for (j, other) in loops.iter().enumerate() {
            if i == j {
                continue;
            }
            if other.body.contains(&header) {
                let size = other.body.len();
                if best.map_or(true, |(_, best_size)| size < best_size) {
                    best = Some((j, size));
                }
            }
        }
        loops[i].parent = best.map(|(j, _)| loops[j].id);
    }

    // Depths follow parent chains; resolve in order of increasing body size so a
    // parent's depth is always settled before its children's.
    let mut order_by_size: Vec<usize> = (0..loops.len()).collect();
    order_by_size.sort_by_key(|&i| loops[i].body.len());
    for &i in &order_by_size {
        loops[i].depth = match loops[i].parent {
            None => 1,
            Some(parent_id) => {
                let parent_idx = loops.iter().position(|l| l.id == parent_id).unwrap();
                loops[parent_idx].depth + 1
            }
        };
    }

    for block in &mut function.blocks {
        block.loop_id = loops
            .iter()
            .filter(|l| l.contains(block.id))
            .max_by_key(|l| l.depth)
            .map(|l| l.id);
    }

    function.loops = loops;
}

fn grow_body(function: &Function, header: BlockId, tail: BlockId) -> BTreeSet<BlockId> {
    let mut body = BTreeSet::new();
    body.insert(header);
    if header == tail {
        return body;
    }
    let mut worklist = vec![tail];
    body.insert(tail);
    while let Some(b) = worklist.pop() {
        for &pred in &function.block(b).predecessors {
            if body.insert(pred) {
                worklist.push(pred);
            }
        }
    }
    body
}
