//! HIR→LIR lowering: replaces SSA values with virtual
//! registers and φ-functions with explicit copies inserted at the tail of
//! each predecessor block, then renumbers every LIR instruction on a
//! stride of 5 so later passes (spill/reload insertion, see
//! [`crate::core::regalloc`]) have id space to splice new instructions in
//! without a full renumbering pass of their own.

use crate::common::Map;
use crate::core::hir::{BinOp, Cond, HirFunction, HirInsn, Terminator};
use crate::core::ids::{BlockId, LirId, RegId};

pub const RENUMBER_STRIDE: u32 = 5;

#[derive(Clone, Debug)]
pub enum LirInsn {
    Const {
        dst: RegId,
        imm: i32,
    },
    Copy {
        dst: RegId,
        src: RegId,
    },
    Neg {
        dst: RegId,
        src: RegId,
    },
    Bin {
        op: BinOp,
        dst: RegId,
        lhs: RegId,
        rhs: RegId,
    },
    Param {
        dst: RegId,
        index: u16,
    },
    Call {
        dst: Option<RegId>,
        callee: crate::common::MethodKey,
        args: Vec<RegId>,
    },
    /// Inserted by [`crate::core::regalloc`] when a still-live value is
    /// evicted from its physical register by the circular allocator.
    StoreSpill {
        slot: i32,
        src: RegId,
    },
    /// Inserted by [`crate::core::regalloc`] to bring a spilled value back
    /// into a physical register before a use.
    LoadSpill {
        dst: RegId,
        slot: i32,
    },
}

impl LirInsn {
    pub fn def(&self) -> Option<RegId> {
        match self {
            LirInsn::Const { dst, .. }
            | LirInsn::Copy { dst, .. }
            | LirInsn::Neg { dst, .. }
            | LirInsn::Bin { dst, .. }
            | LirInsn::Param { dst, .. }
            | LirInsn::LoadSpill { dst, .. } => Some(*dst),
            LirInsn::Call { dst, .. } => *dst,
            LirInsn::StoreSpill { .. } => None,
        }
    }

    pub fn uses(&self) -> Vec<RegId> {
        match self {
            LirInsn::Const { .. } | LirInsn::Param { .. } | LirInsn::LoadSpill { .. } => vec![],
            LirInsn::Copy { src, .. } | LirInsn::Neg { src, .. } => vec![*src],
            LirInsn::Bin { lhs, rhs, .. } => vec![*lhs, *rhs],
            LirInsn::Call { args, .. } => args.clone(),
            LirInsn::StoreSpill { src, .. } => vec![*src],
        }
    }
}

#[derive(Clone, Debug)]
pub enum LirTerminator {
    Jump(BlockId),
    Branch {
        cond: Cond,
        lhs: RegId,
        rhs: RegId,
        if_true: BlockId,
        if_false: BlockId,
    },
    Return(Option<RegId>),
}

impl LirTerminator {
    pub fn uses(&self) -> Vec<RegId> {
        match self {
            LirTerminator::Jump(_) => vec![],
            LirTerminator::Branch { lhs, rhs, .. } => vec![*lhs, *rhs],
            LirTerminator::Return(v) => v.iter().copied().collect(),
        }
    }

    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            LirTerminator::Jump(b) => vec![*b],
            LirTerminator::Branch {
                if_true, if_false, ..
            } => vec![*if_true, *if_false],
            LirTerminator::Return(_) => vec![],
        }
    }
}

#[derive(Clone, Debug)]
pub struct LirBlock {
    pub id: BlockId,
    /// `(id, insn)` pairs in execution order; copies resolving incoming
    /// φ-functions are appended to the tail of the *predecessor* block that
    /// contributed them, never inserted at the head of this block, so that
    /// a value live on only one incoming edge is never computed on the
    /// other.
    pub insns: Vec<(LirId, LirInsn)>,
    pub terminator: LirTerminator,
}

#[derive(Clone, Debug)]
pub struct LirFunction {
    pub method: crate::common::MethodKey,
    pub max_locals: u16,
    pub blocks: Map<BlockId, LirBlock>,
    pub entry_block: BlockId,
}

struct Lowering<'a> {
    hir: &'a HirFunction,
    next_reg: u32,
    reg_of: Map<crate::core::ids::HirId, RegId>,
    next_lir: u32,
}

impl<'a> Lowering<'a> {
    fn reg_for(&mut self, hir_id: crate::core::ids::HirId) -> RegId {
        let canonical = self.hir.resolve(hir_id);
        *self.reg_of.entry(canonical).or_insert_with(|| {
            let r = RegId(self.next_reg);
            self.next_reg += 1;
            r
        })
    }

    fn fresh_lir_id(&mut self) -> LirId {
        let id = LirId(self.next_lir);
        self.next_lir += RENUMBER_STRIDE;
        id
    }
}

/// Lower a method's HIR into LIR over virtual registers, with φ-functions
/// already resolved into predecessor-tail copies.
pub fn lower(hir: &HirFunction) -> LirFunction {
    let mut lowering = Lowering {
        hir,
        next_reg: crate::core::ids::FIRST_VIRTUAL,
        reg_of: Map::new(),
        next_lir: 0,
    };

    // Pre-assign a register to every live HIR value (including phis) so
    // that predecessor-tail copies inserted below can reference a
    // successor's phi register before that block's own body is lowered.
    for block in hir.blocks.values() {
        for &id in &block.insns {
            lowering.reg_for(id);
        }
    }

    let mut blocks: Map<BlockId, LirBlock> = Map::new();
    for (&block_id, block) in &hir.blocks {
        let mut insns = Vec::new();
        for &hir_id in &block.insns {
            if lowering.hir.resolve(hir_id) != hir_id {
                // redirected (trivial or self-referential) phi: no
                // instruction of its own, its register is simply never
                // written here.
                continue;
            }
            let Some(insn) = lower_insn(&mut lowering, hir_id) else {
                continue;
            };
            let id = lowering.fresh_lir_id();
            insns.push((id, insn));
        }

        let terminator = match &block.terminator {
            Terminator::Fallthrough(target) => LirTerminator::Jump(*target),
            Terminator::Branch {
                cond,
                lhs,
                rhs,
                if_true,
                if_false,
            } => LirTerminator::Branch {
                cond: *cond,
                lhs: lowering.reg_for(*lhs),
                rhs: lowering.reg_for(*rhs),
                if_true: *if_true,
                if_false: *if_false,
            },
            Terminator::Return(v) => LirTerminator::Return(v.map(|v| lowering.reg_for(v))),
        };

        blocks.insert(
            block_id,
            LirBlock {
                id: block_id,
                insns,
                terminator,
            },
        );
    }

    insert_phi_copies(hir, &mut lowering, &mut blocks);

    LirFunction {
        method: hir.method.clone(),
        max_locals: hir.max_locals,
        blocks,
        entry_block: 1,
    }
}

fn lower_insn(lowering: &mut Lowering, hir_id: crate::core::ids::HirId) -> Option<LirInsn> {
    let dst = lowering.reg_for(hir_id);
    let insn = match lowering.hir.insn(hir_id) {
        HirInsn::Const(v) => LirInsn::Const { dst, imm: *v },
        HirInsn::Param(index) => LirInsn::Param { dst, index: *index },
        HirInsn::Neg(src) => LirInsn::Neg {
            dst,
            src: lowering.reg_for(*src),
        },
        HirInsn::Bin(op, lhs, rhs) => LirInsn::Bin {
            op: *op,
            dst,
            lhs: lowering.reg_for(*lhs),
            rhs: lowering.reg_for(*rhs),
        },
        HirInsn::Call(callee, args) => {
            let args: Vec<RegId> = args.iter().map(|&a| lowering.reg_for(a)).collect();
            let has_result = callee.descriptor.ret != crate::common::Type::Void;
            LirInsn::Call {
                dst: if has_result { Some(dst) } else { None },
                callee: callee.clone(),
                args,
            }
        }
        // Phis never lower to an instruction: their value arrives via
        // predecessor-tail copies inserted by `insert_phi_copies`.
        HirInsn::Phi(_) => return None,
    };
    Some(insn)
}

/// For every φ at the head of a block, insert a copy into the tail of each
/// contributing predecessor writing the φ's register from that
/// predecessor's operand register.
fn insert_phi_copies(hir: &HirFunction, lowering: &mut Lowering, blocks: &mut Map<BlockId, LirBlock>) {
    let mut tail_copies: Map<BlockId, Vec<(LirId, LirInsn)>> = Map::new();
    for hir_block in hir.blocks.values() {
        for &hir_id in &hir_block.insns {
            if hir.resolve(hir_id) != hir_id {
                continue;
            }
            let HirInsn::Phi(operands) = hir.insn(hir_id) else {
                continue;
            };
            let phi_reg = lowering.reg_for(hir_id);
            for &(pred, value) in operands {
                let src_reg = lowering.reg_for(value);
                if src_reg == phi_reg {
                    continue;
                }
                let id = lowering.fresh_lir_id();
                tail_copies.entry(pred).or_default().push((
                    id,
                    LirInsn::Copy {
                        dst: phi_reg,
                        src: src_reg,
                    },
                ));
            }
        }
    }
    for (pred, copies) in tail_copies {
        if let Some(block) = blocks.get_mut(&pred) {
            block.insns.extend(copies);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::Op;
    use crate::common::{Descriptor, MethodKey, Type};
    use crate::core::cfg::ControlFlowGraph;

    #[test]
    fn straight_line_lowers_in_order() {
        let code = vec![Op::Iconst0, Op::Istore(0), Op::Iload(0), Op::Ireturn];
        let method = MethodKey {
            name: internment::Intern::new("m".to_string()),
            descriptor: Descriptor {
                params: vec![],
                ret: Type::Int,
            },
        };
        let cfg = ControlFlowGraph::build(method, 1, &code);
        let hir = crate::core::hir::build(&cfg, &[]).unwrap();
        let lir = lower(&hir);
        let block = &lir.blocks[&1];
        assert!(!block.insns.is_empty());
        assert!(matches!(block.terminator, LirTerminator::Return(Some(_))));
    }
}
