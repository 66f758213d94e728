//! Lifetime intervals built over block-level liveness: a basic contiguous `[fr, to]`
//! range per variable, and an extended variant with the subinterval/hole machinery the
//! basic range omits.

use std::collections::HashMap;

use ralloc_ir::{BlockId, Function, VarId};

/// A contiguous lifetime range with no holes: used by the basic linear-scan allocator.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicInterval {
    pub var: VarId,
    pub fr: f64,
    pub to: f64,
    pub defn: Option<u32>,
    /// Instruction ids that use this variable, in increasing `num` order.
    pub uses: Vec<u32>,
}

impl BasicInterval {
    pub fn len(&self) -> usize {
        self.uses.len()
    }
}

struct RawBuild {
    fr: f64,
    to: f64,
    defn: Option<u32>,
    uses: Vec<(f64, u32)>,
}

impl RawBuild {
    fn new() -> Self {
        Self { fr: f64::INFINITY, to: f64::NEG_INFINITY, defn: None, uses: Vec::new() }
    }
}

/// Build one contiguous interval per live variable, per the construction described for
/// the basic (no-holes) variant: live-out ranges seed a whole-block span, a definition
/// trims the start back to the def point, and uses extend the end outward.
pub fn build_basic_intervals(function: &Function, order: &[BlockId]) -> Vec<BasicInterval> {
    let mut raw: HashMap<VarId, RawBuild> = HashMap::new();

    for &block in order.iter().rev() {
        let b = function.block(block);
        if let (Some(first), Some(last)) = (b.first_num(), b.last_num()) {
            for &v in &b.live_out {
                let entry = raw.entry(v).or_insert_with(RawBuild::new);
                entry.fr = entry.fr.min(first - 0.5);
                entry.to = entry.to.max(last + 0.5);
            }
        }

        for inst in b.insts.iter().rev() {
            if inst.is_phi() {
                if let Some(d) = inst.def {
                    if let Some(first) = b.first_num() {
                        let entry = raw.entry(d).or_insert_with(RawBuild::new);
                        entry.fr = entry.fr.min(first - 0.5);
                    }
                }
                if let ralloc_ir::Uses::Phi(map) = &inst.uses {
                    for (&pred, &v) in map {
                        if let Some(pred_last) = function.block(pred).last_num() {
                            let entry = raw.entry(v).or_insert_with(RawBuild::new);
                            entry.to = entry.to.max(pred_last + 0.5);
                            entry.uses.push((pred_last + 0.5, inst.id));
                        }
                    }
                }
                continue;
            }

            let num = inst.num.unwrap_or(0.0);
            if let Some(d) = inst.def {
                let entry = raw.entry(d).or_insert_with(RawBuild::new);
                entry.fr = num;
                entry.defn = Some(inst.id);
            }
            for used in inst.uses.variables() {
                let entry = raw.entry(used).or_insert_with(RawBuild::new);
                entry.to = entry.to.max(num);
                entry.uses.push((num, inst.id));
            }
        }
    }

    raw.into_iter()
        .filter(|(_, b)| !b.uses.is_empty())
        .map(|(var, mut b)| {
            b.uses.sort_by(|a, c| a.0.partial_cmp(&c.0).unwrap());
            BasicInterval { var, fr: b.fr, to: b.to, defn: b.defn, uses: b.uses.into_iter().map(|(_, id)| id).collect() }
        })
        .collect()
}

/// A lifetime interval with holes: a sorted, non-touching list of subintervals that
/// together describe when the variable is live.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedInterval {
    pub var: VarId,
    pub fr: f64,
    pub to: f64,
    pub defn: Option<u32>,
    pub uses: Vec<(f64, u32)>,
    pub subintervals: Vec<(f64, f64)>,
    next_use_cursor: usize,
}

impl ExtendedInterval {
    /// `intersection`: the first point, if any, at which this interval's subintervals
    /// overlap `other`'s.
    pub fn intersection(&self, other: &ExtendedInterval) -> Option<f64> {
        let mut earliest: Option<f64> = None;
        for &(a_fr, a_to) in &self.subintervals {
            for &(b_fr, b_to) in &other.subintervals {
                let start = a_fr.max(b_fr);
                let end = a_to.min(b_to);
                if start <= end {
                    earliest = Some(earliest.map_or(start, |e: f64| e.min(start)));
                }
            }
        }
        earliest
    }

    /// The position of the next use at or after `pos`, advancing an internal cursor so
    /// repeated calls with monotonically increasing `pos` are amortized O(1).
    pub fn next_use(&mut self, pos: f64) -> Option<f64> {
        while self.next_use_cursor < self.uses.len() && self.uses[self.next_use_cursor].0 < pos {
            self.next_use_cursor += 1;
        }
        self.uses.get(self.next_use_cursor).map(|&(p, _)| p)
    }

    /// Split this interval at `pos`: everything strictly before `pos` stays in `self`;
    /// everything at or after becomes the returned tail. Uses and the `defn` are
    /// reassigned to whichever half their instruction's number falls into; the caller
    /// decides separately how each half gets allocated.
    pub fn split_at(mut self, pos: f64) -> (ExtendedInterval, ExtendedInterval) {
        let mut head_subintervals = Vec::new();
        let mut tail_subintervals = Vec::new();
        for (fr, to) in self.subintervals.drain(..) {
            if to <= pos {
                head_subintervals.push((fr, to));
            } else if fr >= pos {
                tail_subintervals.push((fr, to));
            } else {
                head_subintervals.push((fr, pos));
                tail_subintervals.push((pos, to));
            }
        }

        let mut head_uses = Vec::new();
        let mut tail_uses = Vec::new();
        for (p, id) in self.uses.drain(..) {
            if p < pos {
                head_uses.push((p, id));
            } else {
                tail_uses.push((p, id));
            }
        }

        let head_to = head_subintervals.iter().map(|&(_, to)| to).fold(f64::NEG_INFINITY, f64::max);
        let tail_fr = tail_subintervals.iter().map(|&(fr, _)| fr).fold(f64::INFINITY, f64::min);

        let head = ExtendedInterval {
            var: self.var,
            fr: self.fr,
            to: head_to,
            defn: self.defn,
            uses: head_uses,
            subintervals: head_subintervals,
            next_use_cursor: 0,
        };
        let tail = ExtendedInterval {
            var: self.var,
            fr: tail_fr,
            to: self.to,
            defn: None,
            uses: tail_uses,
            subintervals: tail_subintervals,
            next_use_cursor: 0,
        };
        (head, tail)
    }
}

/// Merge a variable's raw touch ranges into the final sorted, non-touching subinterval
/// list: two ranges merge when they overlap or the gap between them is at most 1 (one
/// instruction slot), matching how interval endpoints use `±0.5` offsets.
fn merge_ranges(mut ranges: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
    ranges.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
    let mut merged: Vec<(f64, f64)> = Vec::new();
    for (fr, to) in ranges {
        if let Some(last) = merged.last_mut() {
            if fr - last.1 <= 1.0 {
                last.1 = last.1.max(to);
                continue;
            }
        }
        merged.push((fr, to));
    }
    merged
}

struct ExtendedRawBuild {
    defn: Option<u32>,
    uses: Vec<(f64, u32)>,
    ranges: Vec<(f64, f64)>,
}

impl ExtendedRawBuild {
    fn new() -> Self {
        Self { defn: None, uses: Vec::new(), ranges: Vec::new() }
    }
}

/// Build one hole-aware interval per live variable.
pub fn build_extended_intervals(function: &Function, order: &[BlockId]) -> Vec<ExtendedInterval> {
    let mut raw: HashMap<VarId, ExtendedRawBuild> = HashMap::new();

    for &block in order.iter().rev() {
        let b = function.block(block);
        if let (Some(first), Some(last)) = (b.first_num(), b.last_num()) {
            for &v in &b.live_out {
                raw.entry(v).or_insert_with(ExtendedRawBuild::new).ranges.push((first - 0.5, last + 0.5));
            }
        }

        for inst in b.insts.iter().rev() {
            if inst.is_phi() {
                if let Some(d) = inst.def {
                    if let Some(first) = b.first_num() {
                        raw.entry(d).or_insert_with(ExtendedRawBuild::new).ranges.push((first - 0.5, first - 0.5));
                    }
                }
                if let ralloc_ir::Uses::Phi(map) = &inst.uses {
                    for (&pred, &v) in map {
                        if let Some(pred_last) = function.block(pred).last_num() {
                            let entry = raw.entry(v).or_insert_with(ExtendedRawBuild::new);
                            entry.ranges.push((pred_last + 0.5, pred_last + 0.5));
                            entry.uses.push((pred_last + 0.5, inst.id));
                        }
                    }
                }
                continue;
            }

            let num = inst.num.unwrap_or(0.0);
            if let Some(d) = inst.def {
                let entry = raw.entry(d).or_insert_with(ExtendedRawBuild::new);
                entry.ranges.push((num, num));
                entry.defn = Some(inst.id);
            }
            for used in inst.uses.variables() {
                let entry = raw.entry(used).or_insert_with(ExtendedRawBuild::new);
                entry.ranges.push((num, num));
                entry.uses.push((num, inst.id));
            }
        }
    }

    raw.into_iter()
        .filter(|(_, b)| !b.uses.is_empty())
        .map(|(var, mut b)| {
            b.uses.sort_by(|a, c| a.0.partial_cmp(&c.0).unwrap());
            let subintervals = merge_ranges(b.ranges);
            let fr = subintervals.first().map(|&(fr, _)| fr).unwrap_or(f64::INFINITY);
            let to = subintervals.last().map(|&(_, to)| to).unwrap_or(f64::NEG_INFINITY);
            ExtendedInterval { var, fr, to, defn: b.defn, uses: b.uses, subintervals, next_use_cursor: 0 }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ralloc_analysis::{liveness::compute_liveness, numbering::number_instructions, rpo::reverse_postorder};
    use ralloc_ir::builder::FunctionBuilder;

    fn straight_line() -> (Function, Vec<BlockId>) {
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
        (f, order)
    }

    /// The textbook GCD function: an `if` feeding a `while` loop whose header carries two
    /// φs. Builds the exact block/instruction shape so numbering (and therefore every
    /// interval endpoint below) lines up one-to-one with a hand-worked derivation.
    fn gcd() -> (Function, Vec<BlockId>, VarId, VarId, VarId, VarId) {
        let mut builder = FunctionBuilder::new("gcd");
        let bb1 = builder.create_block();
        builder.set_entry(bb1);
        let bb2 = builder.create_block();
        let bb3 = builder.create_block();
        let bb4 = builder.create_block();
        let bb5 = builder.create_block();
        let bb6 = builder.create_block();
        builder.connect(bb1, bb2);
        builder.connect(bb1, bb3);
        builder.connect(bb2, bb3);
        builder.connect(bb3, bb4);
        builder.connect(bb4, bb5);
        builder.connect(bb4, bb6);
        builder.connect(bb5, bb4);

        let v1 = builder.new_variable();
        let v2 = builder.new_variable();
        let v3 = builder.new_variable();
        let v5 = builder.new_variable();
        let v6 = builder.new_variable();
        let v7 = builder.new_variable();
        let v9 = builder.new_variable();
        let v10 = builder.new_variable();
        let v12 = builder.new_variable();
        let v14 = builder.new_variable();
        let v15 = builder.new_variable();
        let v13 = builder.new_variable();

        {
            let mut bb = builder.block_builder(bb1);
            bb.op("icmp", Some(v1), vec![v2, v3]);
            bb.branch(vec![v1]);
        }
        {
            let mut bb = builder.block_builder(bb2);
            bb.op("xor", Some(v5), vec![v2, v3]);
            bb.op("xor", Some(v6), vec![v3, v5]);
            bb.op("xor", Some(v7), vec![v5, v6]);
            bb.branch(vec![]);
        }
        {
            let mut bb = builder.block_builder(bb3);
            let mut incoming9 = std::collections::BTreeMap::new();
            incoming9.insert(bb2, v6);
            incoming9.insert(bb1, v3);
            bb.phi(v9, incoming9);
            let mut incoming10 = std::collections::BTreeMap::new();
            incoming10.insert(bb2, v7);
            incoming10.insert(bb1, v2);
            bb.phi(v10, incoming10);
            bb.branch(vec![]);
        }
        {
            let mut bb = builder.block_builder(bb4);
            let mut incoming12 = std::collections::BTreeMap::new();
            incoming12.insert(bb3, v9);
            incoming12.insert(bb5, v13);
            bb.phi(v12, incoming12);
            let mut incoming14 = std::collections::BTreeMap::new();
            incoming14.insert(bb3, v10);
            incoming14.insert(bb5, v12);
            bb.phi(v14, incoming14);
            bb.op("icmp", Some(v15), vec![v12]);
            bb.branch(vec![v15]);
        }
        {
            let mut bb = builder.block_builder(bb5);
            bb.op("srem", Some(v13), vec![v14, v12]);
            bb.branch(vec![]);
        }
        {
            let mut bb = builder.block_builder(bb6);
            bb.op("ret", None, vec![v14]);
        }

        let mut f = builder.finish();
        let order = reverse_postorder(&f);
        number_instructions(&mut f, &order);
        compute_liveness(&mut f, &order).unwrap();
        (f, order, v12, v13, v14, v15)
    }

    #[test]
    fn gcd_loop_header_phis_get_the_textbook_interval_endpoints() {
        let (f, order, v12, v13, v14, v15) = gcd();
        let intervals = build_basic_intervals(&f, &order);
        let find = |v: VarId| intervals.iter().find(|i| i.var == v).unwrap();

        let iv12 = find(v12);
        assert_eq!((iv12.fr, iv12.to), (8.5, 14.5));

        let iv14 = find(v14);
        assert_eq!((iv14.fr, iv14.to), (8.5, 15.0));

        let iv15 = find(v15);
        assert_eq!((iv15.fr, iv15.to), (11.0, 12.0));

        let iv13 = find(v13);
        assert_eq!((iv13.fr, iv13.to), (13.0, 14.5));
    }

    #[test]
    fn basic_interval_spans_def_to_last_use() {
        let (f, order) = straight_line();
        let intervals = build_basic_intervals(&f, &order);
        let v0_id = f.block(f.entry).insts[0].def.unwrap();
        let iv = intervals.iter().find(|i| i.var == v0_id).unwrap();
        assert_eq!(iv.fr, 0.0);
        assert_eq!(iv.to, 2.0);
        assert_eq!(iv.uses.len(), 1);
    }

    #[test]
    fn intervals_with_no_uses_are_discarded() {
        let mut builder = FunctionBuilder::new("f");
        let entry = builder.create_block();
        builder.set_entry(entry);
        let v0 = builder.new_variable();
        {
            let mut bb = builder.block_builder(entry);
            bb.op("iconst", Some(v0), vec![]);
            bb.op("ret", None, vec![]);
        }
        let mut f = builder.finish();
        let order = reverse_postorder(&f);
        number_instructions(&mut f, &order);
        compute_liveness(&mut f, &order).unwrap();
        let intervals = build_basic_intervals(&f, &order);
        assert!(intervals.iter().all(|i| i.var != v0));
    }

    #[test]
    fn extended_interval_next_use_advances_monotonically() {
        let (f, order) = straight_line();
        let mut intervals = build_extended_intervals(&f, &order);
        let v0_id = f.block(f.entry).insts[0].def.unwrap();
        let iv = intervals.iter_mut().find(|i| i.var == v0_id).unwrap();
        assert_eq!(iv.next_use(0.0), Some(2.0));
        assert_eq!(iv.next_use(2.0), Some(2.0));
        assert_eq!(iv.next_use(3.0), None);
    }

    #[test]
    fn split_at_partitions_subintervals_and_uses() {
        let (f, order) = straight_line();
        let intervals = build_extended_intervals(&f, &order);
        let v0_id = f.block(f.entry).insts[0].def.unwrap();
        let iv = intervals.into_iter().find(|i| i.var == v0_id).unwrap();
        let (head, tail) = iv.split_at(1.0);
        assert!(head.subintervals.iter().all(|&(_, to)| to <= 1.0));
        assert!(tail.subintervals.iter().all(|&(fr, _)| fr >= 1.0));
        assert_eq!(head.uses.len() + tail.uses.len(), 1);
    }
}
