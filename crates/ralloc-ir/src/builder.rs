//! `FunctionBuilder`/`BlockBuilder`: imperative construction helpers for building
//! explicit-φ SSA functions by hand, mainly for tests and the JSON ingest path.
//! `append_phi` takes a predecessor-to-variable map directly rather than threading
//! block parameters through block creation.

use std::collections::BTreeMap;

use crate::{
    alloc::Operand,
    block::BlockId,
    function::Function,
    inst::{Inst, Opcode, Uses},
    value::VarId,
};

/// Builder for constructing a function's blocks and instructions.
pub struct FunctionBuilder {
    function: Function,
    /// `Function::new` pre-allocates one empty block so a bare `Function` is always
    /// valid; the first `create_block()` call claims that block instead of adding a
    /// second one, so a fully builder-constructed function has no orphan block left over.
    claimed_default_block: bool,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { function: Function::new(name), claimed_default_block: false }
    }

    pub fn create_block(&mut self) -> BlockId {
        if !self.claimed_default_block {
            self.claimed_default_block = true;
            return self.function.entry;
        }
        self.function.add_block()
    }

    pub fn set_entry(&mut self, block: BlockId) {
        self.function.entry = block;
    }

    pub fn new_variable(&mut self) -> VarId {
        self.function.fresh_variable()
    }

    pub fn connect(&mut self, from: BlockId, to: BlockId) {
        self.function.connect(from, to);
    }

    /// Begin appending instructions to `block`.
    pub fn block_builder(&mut self, block: BlockId) -> BlockBuilder<'_> {
        BlockBuilder { function: &mut self.function, block }
    }

    pub fn finish(self) -> Function {
        self.function
    }
}

/// Appends instructions to one block of a [`FunctionBuilder`] in listing order.
pub struct BlockBuilder<'f> {
    function: &'f mut Function,
    block: BlockId,
}

impl<'f> BlockBuilder<'f> {
    fn push(&mut self, opcode: Opcode, def: Option<VarId>, uses: Uses) -> u32 {
        let id = self.function.next_inst_id();
        let inst = Inst::new(id, self.block, opcode, def, uses);
        self.function.block_mut(self.block).insts.push(inst);
        id
    }

    /// Append a φ defining `def`, with one incoming variable per predecessor. Must be
    /// called before any non-φ instruction in this block: φs are the block's prefix.
    pub fn phi(&mut self, def: VarId, incoming: BTreeMap<BlockId, VarId>) -> u32 {
        self.push(Opcode::Phi, Some(def), Uses::Phi(incoming))
    }

    /// Append an ordinary opcode with a definition and ordered use list.
    pub fn op(&mut self, name: impl Into<String>, def: Option<VarId>, uses: Vec<VarId>) -> u32 {
        self.push(Opcode::Op(name.into()), def, Uses::List(uses))
    }

    /// Append an opcode along with non-allocable debug operands (constants, labels).
    pub fn op_with_debug(
        &mut self,
        name: impl Into<String>,
        def: Option<VarId>,
        uses: Vec<VarId>,
        debug_uses: Vec<Operand>,
    ) -> u32 {
        let id = self.op(name, def, uses);
        self.function.block_mut(self.block).insts.last_mut().unwrap().debug_uses = debug_uses;
        id
    }

    /// Append an unconditional or conditional branch, using `uses` for any tested
    /// condition variable(s).
    pub fn branch(&mut self, uses: Vec<VarId>) -> u32 {
        self.push(Opcode::Branch, None, Uses::List(uses))
    }
}
