//! The interference graph, and the chordality witness the graph-coloring allocator
//! relies on, built directly from the dataflow facts `ralloc-analysis` already computes.

use std::collections::{BTreeMap, BTreeSet};

use ralloc_ir::{Function, VarId};

/// A symmetric adjacency map over non-spilled variables.
#[derive(Debug, Clone, Default)]
pub struct InterferenceGraph {
    adjacency: BTreeMap<VarId, BTreeSet<VarId>>,
}

impl InterferenceGraph {
    fn add_edge(&mut self, a: VarId, b: VarId) {
        if a == b {
            return;
        }
        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
    }

    pub fn neighbors(&self, v: VarId) -> impl Iterator<Item = VarId> + '_ {
        self.adjacency.get(&v).into_iter().flatten().copied()
    }

    pub fn vertices(&self) -> impl Iterator<Item = VarId> + '_ {
        self.adjacency.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }
}

fn is_spilled(function: &Function, v: VarId) -> bool {
    function.variable(v).allocation.is_slot()
}

/// Build the interference graph: a clique over each block's live-in set, plus edges
/// from each definition to every other variable simultaneously live-out at that point.
pub fn build_interference_graph(function: &Function) -> InterferenceGraph {
    let mut graph = InterferenceGraph::default();

    for block in &function.blocks {
        let live_in: Vec<VarId> = block.live_in.iter().copied().filter(|&v| !is_spilled(function, v)).collect();
        for i in 0..live_in.len() {
            for j in (i + 1)..live_in.len() {
                graph.add_edge(live_in[i], live_in[j]);
            }
        }

        for inst in &block.insts {
            let Some(def) = inst.def else { continue };
            if is_spilled(function, def) || !inst.live_out.contains(&def) {
                continue;
            }
            for &other in &inst.live_out {
                if other != def && !is_spilled(function, other) {
                    graph.add_edge(def, other);
                }
            }
        }
    }

    graph
}

/// A lexicographic breadth-first search, producing a perfect elimination order for a
/// chordal graph (the order the graph-coloring allocator colors greedily over).
pub fn lex_bfs_order(graph: &InterferenceGraph) -> Vec<VarId> {
    let mut labels: BTreeMap<VarId, Vec<u32>> = graph.vertices().map(|v| (v, Vec::new())).collect();
    let mut remaining: BTreeSet<VarId> = graph.vertices().collect();
    let mut order = Vec::with_capacity(remaining.len());
    let mut rank = remaining.len() as u32;

    while !remaining.is_empty() {
        let &next = remaining
            .iter()
            .max_by(|&&a, &&b| labels[&a].cmp(&labels[&b]).then(b.cmp(&a)))
            .unwrap();
        remaining.remove(&next);
        order.push(next);
        for neighbor in graph.neighbors(next) {
            if remaining.contains(&neighbor) {
                labels.get_mut(&neighbor).unwrap().push(rank);
            }
        }
        rank -= 1;
    }

    order
}

/// Verify a lex-BFS order is a perfect elimination order: for each vertex in reverse
/// order, all of its later neighbors must themselves be mutually adjacent to the
/// earliest of those later neighbors.
pub fn is_chordal(graph: &InterferenceGraph, order: &[VarId]) -> bool {
    let position: BTreeMap<VarId, usize> = order.iter().enumerate().map(|(i, &v)| (v, i)).collect();

    for (i, &v) in order.iter().enumerate() {
        let mut later_neighbors: Vec<VarId> =
            graph.neighbors(v).filter(|n| position[n] > i).collect();
        if later_neighbors.is_empty() {
            continue;
        }
        later_neighbors.sort_by_key(|n| position[n]);
        let earliest = later_neighbors[0];
        let earliest_neighbors: BTreeSet<VarId> = graph.neighbors(earliest).collect();
        for &other in &later_neighbors[1..] {
            if !earliest_neighbors.contains(&other) {
                return false;
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use ralloc_analysis::{liveness::compute_liveness, numbering::number_instructions, rpo::reverse_postorder};
    use ralloc_ir::builder::FunctionBuilder;

    #[test]
    fn straight_line_has_no_interference_when_lifetimes_dont_overlap() {
        let mut builder = FunctionBuilder::new("f");
        let entry = builder.create_block();
        builder.set_entry(entry);
        let v0 = builder.new_variable();
        let v1 = builder.new_variable();
        {
            let mut bb = builder.block_builder(entry);
            bb.op("iconst", Some(v0), vec![]);
            bb.op("iconst", Some(v1), vec![v0]);
            bb.op("ret", None, vec![v1]);
        }
        let mut f = builder.finish();
        let order = reverse_postorder(&f);
        number_instructions(&mut f, &order);
        compute_liveness(&mut f, &order).unwrap();
        let graph = build_interference_graph(&f);
        assert!(graph.is_empty() || graph.neighbors(v0).next().is_none());
    }

    #[test]
    fn simultaneously_live_values_interfere() {
        let mut builder = FunctionBuilder::new("f");
        let entry = builder.create_block();
        builder.set_entry(entry);
        let v0 = builder.new_variable();
        let v1 = builder.new_variable();
        let v2 = builder.new_variable();
        {
            let mut bb = builder.block_builder(entry);
            bb.op("iconst", Some(v0), vec![]);
            bb.op("iconst", Some(v1), vec![]);
            bb.op("iadd", Some(v2), vec![v0, v1]);
            bb.op("ret", None, vec![v2]);
        }
        let mut f = builder.finish();
        let order = reverse_postorder(&f);
        number_instructions(&mut f, &order);
        compute_liveness(&mut f, &order).unwrap();
        let graph = build_interference_graph(&f);
        assert!(graph.neighbors(v0).any(|n| n == v1));
    }

    #[test]
    fn interference_graph_from_ssa_is_chordal() {
        let mut builder = FunctionBuilder::new("f");
        let entry = builder.create_block();
        builder.set_entry(entry);
        let then_blk = builder.create_block();
        let join = builder.create_block();
        builder.connect(entry, then_blk);
        builder.connect(entry, join);
        builder.connect(then_blk, join);

        let v0 = builder.new_variable();
        let v1 = builder.new_variable();
        let v2 = builder.new_variable();
        {
            let mut bb = builder.block_builder(entry);
            bb.op("iconst", Some(v0), vec![]);
            bb.branch(vec![]);
        }
        {
            let mut bb = builder.block_builder(then_blk);
            bb.op("iconst", Some(v1), vec![v0]);
            bb.branch(vec![]);
        }
        {
            let mut bb = builder.block_builder(join);
            let mut incoming = std::collections::BTreeMap::new();
            incoming.insert(entry, v0);
            incoming.insert(then_blk, v1);
            bb.phi(v2, incoming);
            bb.op("ret", None, vec![v2]);
        }

        let mut f = builder.finish();
        let order = reverse_postorder(&f);
        number_instructions(&mut f, &order);
        compute_liveness(&mut f, &order).unwrap();
        let graph = build_interference_graph(&f);
        let elim_order = lex_bfs_order(&graph);
        assert!(is_chordal(&graph, &elim_order));
    }

    #[test]
    fn a_four_cycle_with_no_chord_is_not_chordal() {
        // v0-v1-v2-v3-v0 and nothing else. No straight-line liveness construction
        // produces this: one value ends up live across the whole block and becomes a
        // hub connected to everything, which chords any cycle through it. Build the
        // graph directly instead of going through a function.
        let v0 = VarId::new(0);
        let v1 = VarId::new(1);
        let v2 = VarId::new(2);
        let v3 = VarId::new(3);

        let mut graph = InterferenceGraph::default();
        graph.add_edge(v0, v1);
        graph.add_edge(v1, v2);
        graph.add_edge(v2, v3);
        graph.add_edge(v3, v0);

        let order = lex_bfs_order(&graph);
        assert!(!is_chordal(&graph, &order));
    }
}
