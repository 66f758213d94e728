//! SSA value identifiers and their allocation slot.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::alloc::Allocation;

/// An SSA value identifier, `v<n>`. The index doubles as the identifier, so there is no
/// separate name table to keep in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VarId(pub u32);

impl VarId {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A variable: an identifier plus its post-allocation slot.
///
/// A variable is "spilled" exactly when `allocation` is `Allocation::Slot(_)`. Equality
/// and hashing on `Variable` itself are not provided; use `VarId` for that, since two
/// `Variable` values for the same id must never disagree in practice (allocators and
/// resolution mutate `Function::variable_mut` in place, so there's only ever one copy
/// of each variable's state to go stale).
#[derive(Debug, Clone)]
pub struct Variable {
    pub id: VarId,
    pub allocation: Allocation,
    /// An optional debug label carried through from the input (`v<n>/label`).
    pub label: Option<String>,
}

impl Variable {
    pub fn new(id: VarId) -> Self {
        Self {
            id,
            allocation: Allocation::Unallocated,
            label: None,
        }
    }

    pub fn is_spilled(&self) -> bool {
        matches!(self.allocation, Allocation::Slot(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_identifier_syntax() {
        assert_eq!(VarId::new(12).to_string(), "v12");
    }

    #[test]
    fn fresh_variable_is_unallocated_and_unspilled() {
        let v = Variable::new(VarId::new(0));
        assert_eq!(v.allocation, Allocation::Unallocated);
        assert!(!v.is_spilled());
    }
}
