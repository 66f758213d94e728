//! Reverse postorder, computed with an explicit stack (not recursion) so arbitrarily
//! deep CFGs don't blow the native stack, matching the corpus's preference for explicit
//! work-stacks over recursive graph walks.

use std::collections::HashSet;

use ralloc_ir::{BlockId, Function};

enum Frame {
    Enter(BlockId),
    Finish(BlockId),
}

/// A DFS from the entry block, reversed: every block's dominators precede it.
///
/// Blocks unreachable from the entry are omitted.
pub fn reverse_postorder(function: &Function) -> Vec<BlockId> {
    let mut postorder = Vec::with_capacity(function.blocks.len());
    let mut visited = HashSet::with_capacity(function.blocks.len());
    let mut stack = vec![Frame::Enter(function.entry)];

    while let Some(frame) = stack.pop() {
        match frame {
            Frame::Enter(block) => {
                if !visited.insert(block) {
                    continue;
                }
                stack.push(Frame::Finish(block));
                for &succ in function.block(block).successors.iter().rev() {
                    if !visited.contains(&succ) {
                        stack.push(Frame::Enter(succ));
                    }
                }
            }
            Frame::Finish(block) => postorder.push(block),
        }
    }

    postorder.reverse();
    postorder
}
