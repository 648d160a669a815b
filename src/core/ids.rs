//! Identifier types threaded through the core pipeline. Each is a thin
//! newtype over `u32` (or `usize` for block ids) so that HIR, LIR, and
//! register numbers can never be mixed up at a call boundary.

use derive_more::Display;

pub type BlockId = usize;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[display("%{_0}")]
pub struct HirId(pub u32);

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[display("l{_0}")]
pub struct LirId(pub u32);

/// A register number: `0..=15` are the physical registers, `16..` are
/// virtual registers awaiting allocation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[display("r{_0}")]
pub struct RegId(pub u32);

/// First virtual-register number; `0..FIRST_VIRTUAL` are physical slots.
pub const FIRST_VIRTUAL: u32 = 16;

impl RegId {
    pub fn is_physical(self) -> bool {
        self.0 < FIRST_VIRTUAL
    }

    pub fn is_virtual(self) -> bool {
        self.0 >= FIRST_VIRTUAL
    }
}
