//! Register allocation.
//!
//! The default allocator is deliberately naive: a circular queue cycles
//! through the twelve temporaries `R0..=R11`, handing out the next one in
//! round-robin order every time a value needs a home. When that forces out
//! a value that [`crate::core::liveness`] says is still needed later, the
//! evicted value is spilled to a frame slot first and reloaded from it on
//! its next use. A method with more than twelve simultaneously live values
//! forces at least one such spill.
//!
//! `-g`/`--graph-alloc` is reserved for a real interference-graph coloring
//! allocator; it is not implemented here (see `graph_color` below), matching
//! the front end's own CLI surface which accepts the flag and reports it as
//! unsupported rather than silently falling back to the default allocator.

use crate::common::Map;
use crate::core::ids::{BlockId, RegId};
use crate::core::lir::{LirBlock, LirFunction, LirInsn, LirTerminator};
use crate::core::liveness::LivenessInfo;

pub const NUM_PHYSICAL: u32 = crate::marvin::NUM_TEMPS;

struct Ring {
    /// The virtual register currently resident in each physical slot, if any.
    slots: Vec<Option<RegId>>,
    /// Reverse lookup: which physical slot a still-resident virtual
    /// register occupies.
    resident: Map<RegId, usize>,
    /// Frame slot index assigned to a virtual register once it has been
    /// spilled at least once; reused on every subsequent spill of the same
    /// value so it never needs two homes.
    spill_slot: Map<RegId, i32>,
    next_spill_slot: i32,
    cursor: usize,
    /// Every physical temporary this method has handed out, in the order it
    /// was first assigned, no duplicates. [`crate::core::frame`] saves and
    /// restores exactly these across the method's own call frame so that a
    /// callee reusing the same physical slots never clobbers a caller's
    /// value that is still live across the call site.
    used: Vec<RegId>,
}

impl Ring {
    fn new() -> Self {
        Ring {
            slots: vec![None; NUM_PHYSICAL as usize],
            resident: Map::new(),
            spill_slot: Map::new(),
            next_spill_slot: 0,
            cursor: 0,
            used: Vec::new(),
        }
    }

    fn mark_used(&mut self, slot: usize) {
        let reg = RegId(slot as u32);
        if !self.used.contains(&reg) {
            self.used.push(reg);
        }
    }

    fn spill_slot_for(&mut self, vreg: RegId) -> i32 {
        *self.spill_slot.entry(vreg).or_insert_with(|| {
            let slot = self.next_spill_slot;
            self.next_spill_slot += 1;
            slot
        })
    }

    /// Pick the next victim physical slot that isn't in `protect`.
    fn next_victim(&mut self, protect: &[usize]) -> usize {
        for _ in 0..self.slots.len() {
            let candidate = self.cursor;
            self.cursor = (self.cursor + 1) % self.slots.len();
            if !protect.contains(&candidate) {
                return candidate;
            }
        }
        unreachable!("fewer live operands than physical registers")
    }

    /// Ensure `vreg` is resident in a physical register, emitting a spill of
    /// whatever it evicts (if that value is still live past `pos`) and a
    /// reload of `vreg` itself (if it was previously spilled and this is a
    /// read, not a fresh definition). Returns the physical register and any
    /// instructions that must be emitted immediately before the current one.
    fn ensure(
        &mut self,
        vreg: RegId,
        pos: u32,
        is_def: bool,
        protect: &mut Vec<usize>,
        liveness: &LivenessInfo,
    ) -> (RegId, Vec<LirInsn>) {
        if let Some(&slot) = self.resident.get(&vreg) {
            protect.push(slot);
            return (RegId(slot as u32), Vec::new());
        }

        let slot = self.next_victim(protect);
        let mut preamble = Vec::new();

        if let Some(victim) = self.slots[slot].take() {
            self.resident.remove(&victim);
            let still_live = liveness
                .intervals
                .get(&victim)
                .is_some_and(|interval| interval.end().is_some_and(|end| end > pos));
            if still_live && victim != vreg {
                let spill_slot = self.spill_slot_for(victim);
                preamble.push(LirInsn::StoreSpill {
                    slot: spill_slot,
                    src: RegId(slot as u32),
                });
            }
        }

        self.slots[slot] = Some(vreg);
        self.resident.insert(vreg, slot);
        self.mark_used(slot);
        protect.push(slot);

        if !is_def {
            if let Some(&spill_slot) = self.spill_slot.get(&vreg) {
                preamble.push(LirInsn::LoadSpill {
                    dst: RegId(slot as u32),
                    slot: spill_slot,
                });
            }
        }

        (RegId(slot as u32), preamble)
    }
}

/// Naive circular allocator: walks every block's instructions in order,
/// assigning physical registers on demand and splicing in spill/reload
/// instructions exactly where the round-robin eviction forces them.
///
/// Returns the allocated [`LirFunction`] alongside the ascending set of
/// physical temporaries it used, which [`crate::core::frame`] saves and
/// restores around the method's own call frame.
pub fn allocate(lir: &LirFunction, liveness: &LivenessInfo) -> (LirFunction, Vec<RegId>) {
    let mut ring = Ring::new();
    let mut blocks: Map<BlockId, LirBlock> = Map::new();

    for (&block_id, block) in &lir.blocks {
        let mut out = Vec::with_capacity(block.insns.len());
        for &(id, ref insn) in &block.insns {
            let mut protect = Vec::new();
            let insn = allocate_insn(&mut ring, id.0, insn, &mut protect, liveness, &mut out);
            out.push((id, insn));
        }

        let terminator_pos = block.insns.last().map(|&(id, _)| id.0 + 1).unwrap_or(0);
        let mut protect = Vec::new();
        let terminator = allocate_terminator(
            &mut ring,
            terminator_pos,
            &block.terminator,
            &mut protect,
            liveness,
            &mut out,
        );

        blocks.insert(
            block_id,
            LirBlock {
                id: block_id,
                insns: out,
                terminator,
            },
        );
    }

    let mut used = ring.used.clone();
    used.sort_by_key(|r| r.0);

    (
        LirFunction {
            method: lir.method.clone(),
            max_locals: lir.max_locals,
            blocks,
            entry_block: lir.entry_block,
        },
        used,
    )
}

fn use_reg(
    ring: &mut Ring,
    pos: u32,
    v: RegId,
    protect: &mut Vec<usize>,
    liveness: &LivenessInfo,
    out: &mut Vec<(crate::core::ids::LirId, LirInsn)>,
) -> RegId {
    let (phys, pre) = ring.ensure(v, pos, false, protect, liveness);
    emit_preamble(out, pos, pre);
    phys
}

fn allocate_insn(
    ring: &mut Ring,
    pos: u32,
    insn: &LirInsn,
    protect: &mut Vec<usize>,
    liveness: &LivenessInfo,
    out: &mut Vec<(crate::core::ids::LirId, LirInsn)>,
) -> LirInsn {
    let allocated = match insn {
        LirInsn::Const { dst, imm } => LirInsn::Const {
            dst: *dst,
            imm: *imm,
        },
        LirInsn::Param { dst, index } => LirInsn::Param {
            dst: *dst,
            index: *index,
        },
        LirInsn::Copy { dst, src } => {
            let src = use_reg(ring, pos, *src, protect, liveness, out);
            LirInsn::Copy { dst: *dst, src }
        }
        LirInsn::Neg { dst, src } => {
            let src = use_reg(ring, pos, *src, protect, liveness, out);
            LirInsn::Neg { dst: *dst, src }
        }
        LirInsn::Bin { op, dst, lhs, rhs } => {
            let lhs = use_reg(ring, pos, *lhs, protect, liveness, out);
            let rhs = use_reg(ring, pos, *rhs, protect, liveness, out);
            LirInsn::Bin {
                op: *op,
                dst: *dst,
                lhs,
                rhs,
            }
        }
        LirInsn::Call { dst, callee, args } => {
            let args = args
                .iter()
                .map(|&a| use_reg(ring, pos, a, protect, liveness, out))
                .collect();
            LirInsn::Call {
                dst: *dst,
                callee: callee.clone(),
                args,
            }
        }
        LirInsn::StoreSpill { .. } | LirInsn::LoadSpill { .. } => insn.clone(),
    };

    // Definitions are resolved last so their home slot never steps on an
    // operand we just loaded for this same instruction.
    if let Some(dst) = allocated.def() {
        let (phys, pre) = ring.ensure(dst, pos, true, protect, liveness);
        emit_preamble(out, pos, pre);
        rebind_dst(allocated, phys)
    } else {
        allocated
    }
}

fn rebind_dst(insn: LirInsn, phys: RegId) -> LirInsn {
    match insn {
        LirInsn::Const { imm, .. } => LirInsn::Const { dst: phys, imm },
        LirInsn::Param { index, .. } => LirInsn::Param { dst: phys, index },
        LirInsn::Copy { src, .. } => LirInsn::Copy { dst: phys, src },
        LirInsn::Neg { src, .. } => LirInsn::Neg { dst: phys, src },
        LirInsn::Bin { op, lhs, rhs, .. } => LirInsn::Bin {
            op,
            dst: phys,
            lhs,
            rhs,
        },
        LirInsn::Call { callee, args, .. } => LirInsn::Call {
            dst: Some(phys),
            callee,
            args,
        },
        other @ (LirInsn::StoreSpill { .. } | LirInsn::LoadSpill { .. }) => other,
    }
}

fn allocate_terminator(
    ring: &mut Ring,
    pos: u32,
    terminator: &LirTerminator,
    protect: &mut Vec<usize>,
    liveness: &LivenessInfo,
    out: &mut Vec<(crate::core::ids::LirId, LirInsn)>,
) -> LirTerminator {
    match terminator {
        LirTerminator::Jump(b) => LirTerminator::Jump(*b),
        LirTerminator::Branch {
            cond,
            lhs,
            rhs,
            if_true,
            if_false,
        } => {
            let lhs = use_reg(ring, pos, *lhs, protect, liveness, out);
            let rhs = use_reg(ring, pos, *rhs, protect, liveness, out);
            LirTerminator::Branch {
                cond: *cond,
                lhs,
                rhs,
                if_true: *if_true,
                if_false: *if_false,
            }
        }
        LirTerminator::Return(None) => LirTerminator::Return(None),
        LirTerminator::Return(Some(v)) => {
            LirTerminator::Return(Some(use_reg(ring, pos, *v, protect, liveness, out)))
        }
    }
}

fn emit_preamble(
    out: &mut Vec<(crate::core::ids::LirId, LirInsn)>,
    pos: u32,
    preamble: Vec<LirInsn>,
) {
    for insn in preamble {
        out.push((crate::core::ids::LirId(pos), insn));
    }
}

/// The interference-graph coloring allocator selectable with `-g`. Left
/// unimplemented deliberately; the CLI rejects `-g` before ever reaching here.
pub fn graph_color(_lir: &LirFunction, _liveness: &LivenessInfo) -> (LirFunction, Vec<RegId>) {
    unimplemented!("graph-coloring allocation is not implemented; pass --graph-alloc only to see the CLI's rejection path")
}
