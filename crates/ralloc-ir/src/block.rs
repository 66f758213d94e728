//! Basic blocks: a flat instruction list plus explicit CFG edges and the dataflow caches
//! (`live_in`/`live_out`) analyses fill in later. φ-nodes are represented as ordinary
//! leading instructions rather than block parameters.

use std::collections::BTreeSet;
use std::fmt;

use crate::{inst::Inst, loops::LoopId, value::VarId};

/// A basic block identifier, `bb<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// A basic block: a φ-prefixed instruction list plus its CFG neighborhood and the
/// dataflow caches analyses populate.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    /// Instructions in listing order; any `PHI`s are a prefix.
    pub insts: Vec<Inst>,
    /// Predecessor blocks, in the order φ operands reference them.
    pub predecessors: Vec<BlockId>,
    /// Successor blocks, in branch-target order (`Br`'s true-target first).
    pub successors: Vec<BlockId>,
    /// Upward-exposed variables used before any local definition.
    pub uevs: BTreeSet<VarId>,
    /// Variables defined somewhere in this block (including φ-defined ones).
    pub defs: BTreeSet<VarId>,
    pub live_in: BTreeSet<VarId>,
    pub live_out: BTreeSet<VarId>,
    /// Blocks that dominate this one (including itself).
    pub dominators: BTreeSet<BlockId>,
    /// The smallest (deepest) loop enclosing this block, if any.
    pub loop_id: Option<LoopId>,
}

impl BasicBlock {
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            insts: Vec::new(),
            predecessors: Vec::new(),
            successors: Vec::new(),
            uevs: BTreeSet::new(),
            defs: BTreeSet::new(),
            live_in: BTreeSet::new(),
            live_out: BTreeSet::new(),
            dominators: BTreeSet::new(),
            loop_id: None,
        }
    }

    /// Instructions that are φs, i.e. the block's prefix.
    pub fn phis(&self) -> impl Iterator<Item = &Inst> {
        self.insts.iter().take_while(|i| i.is_phi())
    }

    /// Instructions that are not φs.
    pub fn non_phis(&self) -> impl Iterator<Item = &Inst> {
        self.insts.iter().skip_while(|i| i.is_phi())
    }

    pub fn first_num(&self) -> Option<f64> {
        self.insts.first().and_then(|i| i.num)
    }

    pub fn last_num(&self) -> Option<f64> {
        self.insts.last().and_then(|i| i.num)
    }
}
