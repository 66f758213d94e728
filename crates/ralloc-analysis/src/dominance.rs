//! Dominators, computed with the iterative intersection algorithm (Cooper, Harvey &
//! Kennedy) over a reverse-postorder numbering, rather than the classical Lengauer–Tarjan
//! algorithm: it's a few dozen lines against the arena representation here and converges
//! in a handful of passes on the bounded-size CFGs this framework allocates over.

use std::collections::HashMap;

use ralloc_ir::{BlockId, Function};

use crate::error::AnalysisError;

/// Compute each reachable block's immediate dominator and write the full dominator set
/// (including itself) into `BasicBlock::dominators`.
pub fn compute_dominators(function: &mut Function, order: &[BlockId]) -> Result<(), AnalysisError> {
    let position: HashMap<BlockId, usize> = order.iter().enumerate().map(|(i, &b)| (b, i)).collect();
    let entry = function.entry;

    let mut idom: HashMap<BlockId, BlockId> = HashMap::new();
    idom.insert(entry, entry);

    let mut changed = true;
    while changed {
        changed = false;
        for &block in order.iter() {
            if block == entry {
                continue;
            }
            let preds: Vec<BlockId> = function
                .block(block)
                .predecessors
                .iter()
                .copied()
                .filter(|p| idom.contains_key(p))
                .collect();
            let Some((&first, rest)) = preds.split_first() else {
                continue;
            };
            let mut new_idom = first;
            for &pred in rest {
                new_idom = intersect(&idom, &position, new_idom, pred);
            }
            if idom.get(&block) != Some(&new_idom) {
                idom.insert(block, new_idom);
                changed = true;
            }
        }
    }

    for &block in order {
        if block != entry && !idom.contains_key(&block) {
            return Err(AnalysisError::MissingDominator(block));
        }
        let mut doms = std::collections::BTreeSet::new();
        let mut cursor = block;
        loop {
            doms.insert(cursor);
            if cursor == entry {
                break;
            }
            match idom.get(&cursor) {
                Some(&next) if next != cursor => cursor = next,
                _ => break,
            }
        }
        function.block_mut(block).dominators = doms;
    }

    Ok(())
}

fn intersect(
    idom: &HashMap<BlockId, BlockId>,
    position: &HashMap<BlockId, usize>,
    mut a: BlockId,
    mut b: BlockId,
) -> BlockId {
    while a != b {
        while position[&a] > position[&b] {
            a = idom[&a];
        }
        while position[&b] > position[&a] {
            b = idom[&b];
        }
    }
    a
}

/// Whether `dominator` dominates `block` (reflexive: a block dominates itself).
pub fn dominates(function: &Function, dominator: BlockId, block: BlockId) -> bool {
    function.block(block).dominators.contains(&dominator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpo::reverse_postorder;

    #[test]
    fn diamond_join_is_dominated_only_by_entry_and_itself() {
        let mut f = Function::new("f");
        let then_blk = f.add_block();
        let else_blk = f.add_block();
        let join = f.add_block();
        f.connect(f.entry, then_blk);
        f.connect(f.entry, else_blk);
        f.connect(then_blk, join);
        f.connect(else_blk, join);

        let order = reverse_postorder(&f);
        compute_dominators(&mut f, &order).unwrap();

        assert!(dominates(&f, f.entry, join));
        assert!(!dominates(&f, then_blk, join));
        assert!(!dominates(&f, else_blk, join));
        assert!(dominates(&f, join, join));
    }

    #[test]
    fn loop_header_dominates_its_body() {
        let mut f = Function::new("f");
        let header = f.add_block();
        let body = f.add_block();
        f.connect(f.entry, header);
        f.connect(header, body);
        f.connect(body, header);

        let order = reverse_postorder(&f);
        compute_dominators(&mut f, &order).unwrap();

        assert!(dominates(&f, header, body));
        assert!(!dominates(&f, body, header));
    }
}
