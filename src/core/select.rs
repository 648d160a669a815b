//! Instruction selection: a purely mechanical rewrite of
//! fully register-allocated LIR into Marvin instructions. No control-flow
//! decisions are made here — jump and call targets are left as
//! placeholders ([`crate::core::frame`] resolves them during linking) — and
//! no prologue/epilogue is emitted; that is also `frame`'s job, once it
//! knows how many spill slots this method actually used.

use crate::common::Map;
use crate::core::hir::{BinOp, Cond};
use crate::core::ids::BlockId;
use crate::core::lir::{LirFunction, LirInsn, LirTerminator};
use crate::marvin::{ArithOp, Instruction};

/// A block's selected body, in the same block-id space as the LIR it came
/// from. Jump/branch targets here are still raw [`BlockId`]s cast to `u32`
/// — never real PCs — until [`crate::core::frame`] lays the method out.
/// What shape a block's terminator has, without the operands (already
/// baked into `insns` by the time this is read) — `frame::build` needs this
/// to know which blocks require the method epilogue appended after them.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TerminatorKind {
    Jump,
    Branch,
    Return,
}

#[derive(Clone, Debug)]
pub struct SelectedBlock {
    pub id: BlockId,
    pub insns: Vec<Instruction>,
    pub terminator_kind: TerminatorKind,
}

#[derive(Clone, Debug)]
pub struct SelectedFunction {
    pub method: crate::common::MethodKey,
    pub blocks: Map<BlockId, SelectedBlock>,
    pub entry_block: BlockId,
    /// One past the highest spill slot index used; the number of frame
    /// words `frame::build` must reserve.
    pub spill_slots: usize,
    /// Physical temporaries this method's body actually reads or writes, in
    /// ascending order; `frame::build` saves and restores exactly these.
    pub used_registers: Vec<crate::core::ids::RegId>,
}

fn arith_op(op: BinOp) -> ArithOp {
    match op {
        BinOp::Add => ArithOp::Add,
        BinOp::Sub => ArithOp::Sub,
        BinOp::Mul => ArithOp::Mul,
        BinOp::Div => ArithOp::Div,
        BinOp::Mod => ArithOp::Mod,
    }
}

fn marvin_cond(cond: Cond) -> crate::marvin::Cond {
    match cond {
        Cond::Eq => crate::marvin::Cond::Eq,
        Cond::Ne => crate::marvin::Cond::Ne,
        Cond::Lt => crate::marvin::Cond::Lt,
        Cond::Le => crate::marvin::Cond::Le,
        Cond::Gt => crate::marvin::Cond::Gt,
        Cond::Ge => crate::marvin::Cond::Ge,
    }
}

fn set_const(dst: crate::core::ids::RegId, imm: i32, out: &mut Vec<Instruction>) {
    match imm {
        0 => out.push(Instruction::Set0 { dst }),
        1 => out.push(Instruction::Set1 { dst }),
        _ => out.push(Instruction::SetN { dst, imm }),
    }
}

/// The stack offset (relative to `FP`) of parameter `index` of an
/// `nparams`-parameter method, given the prologue pushes `RA` then `FP`
/// before taking the new frame pointer, and arguments are pushed
/// left-to-right by the caller (see [`crate::core::frame`] for the full
/// frame layout this mirrors).
pub fn param_offset(index: u16, nparams: usize) -> i32 {
    index as i32 - (nparams as i32 + 2)
}

pub fn select(
    lir: &LirFunction,
    nparams: usize,
    used_registers: Vec<crate::core::ids::RegId>,
) -> SelectedFunction {
    let mut blocks = Map::new();
    let mut max_spill_slot: i32 = -1;

    for (&block_id, block) in &lir.blocks {
        let mut out = Vec::new();
        for (_, insn) in &block.insns {
            select_insn(insn, nparams, &mut out, &mut max_spill_slot);
        }
        select_terminator(&block.terminator, &mut out);
        let terminator_kind = match block.terminator {
            LirTerminator::Jump(_) => TerminatorKind::Jump,
            LirTerminator::Branch { .. } => TerminatorKind::Branch,
            LirTerminator::Return(_) => TerminatorKind::Return,
        };
        blocks.insert(
            block_id,
            SelectedBlock {
                id: block_id,
                insns: out,
                terminator_kind,
            },
        );
    }

    SelectedFunction {
        method: lir.method.clone(),
        blocks,
        entry_block: lir.entry_block,
        spill_slots: (max_spill_slot + 1).max(0) as usize,
        used_registers,
    }
}

fn select_insn(
    insn: &LirInsn,
    nparams: usize,
    out: &mut Vec<Instruction>,
    max_spill_slot: &mut i32,
) {
    match insn {
        LirInsn::Const { dst, imm } => set_const(*dst, *imm, out),
        LirInsn::Copy { dst, src } => out.push(Instruction::Copy { dst: *dst, src: *src }),
        LirInsn::Neg { dst, src } => {
            // Marvin has no dedicated negate opcode: materialize `dst = 0`
            // then subtract, same as the front end's own `ineg` is a
            // software idiom in the JVM's own instruction set comment.
            out.push(Instruction::Set0 { dst: *dst });
            out.push(Instruction::Arith {
                op: ArithOp::Sub,
                dst: *dst,
                lhs: *dst,
                rhs: *src,
            });
        }
        LirInsn::Bin { op, dst, lhs, rhs } => out.push(Instruction::Arith {
            op: arith_op(*op),
            dst: *dst,
            lhs: *lhs,
            rhs: *rhs,
        }),
        LirInsn::Param { dst, index } => out.push(Instruction::LoadN {
            dst: *dst,
            base: crate::marvin::FP,
            offset: param_offset(*index, nparams),
        }),
        LirInsn::Call { dst, callee, args } => {
            if callee.is_read_builtin() {
                if let Some(dst) = dst {
                    out.push(Instruction::Read { dst: *dst });
                }
                return;
            }
            if callee.is_write_builtin() {
                out.push(Instruction::Write { src: args[0] });
                return;
            }
            for &arg in args {
                out.push(Instruction::PushR { src: arg });
            }
            out.push(Instruction::CallN {
                target: 0, // resolved by frame::link
                callee: format!("{callee}"),
            });
            if !args.is_empty() {
                out.push(Instruction::AddN {
                    dst: crate::marvin::SP,
                    imm: -(args.len() as i32),
                });
            }
            if let Some(dst) = dst {
                out.push(Instruction::Copy {
                    dst: *dst,
                    src: crate::marvin::RV,
                });
            }
        }
        LirInsn::StoreSpill { slot, src } => {
            *max_spill_slot = (*max_spill_slot).max(*slot);
            out.push(Instruction::StoreN {
                base: crate::marvin::FP,
                offset: *slot,
                src: *src,
            });
        }
        LirInsn::LoadSpill { dst, slot } => {
            *max_spill_slot = (*max_spill_slot).max(*slot);
            out.push(Instruction::LoadN {
                dst: *dst,
                base: crate::marvin::FP,
                offset: *slot,
            });
        }
    }
}

fn select_terminator(terminator: &LirTerminator, out: &mut Vec<Instruction>) {
    match terminator {
        LirTerminator::Jump(target) => out.push(Instruction::JumpN {
            target: *target as u32,
        }),
        LirTerminator::Branch {
            cond,
            lhs,
            rhs,
            if_true,
            if_false,
        } => {
            out.push(Instruction::CondJumpN {
                cond: marvin_cond(*cond),
                lhs: *lhs,
                rhs: *rhs,
                target: *if_true as u32,
            });
            out.push(Instruction::JumpN {
                target: *if_false as u32,
            });
        }
        LirTerminator::Return(v) => {
            if let Some(v) = v {
                out.push(Instruction::Copy {
                    dst: crate::marvin::RV,
                    src: *v,
                });
            }
            // the actual `jumpr RA` is appended by frame::build, which also
            // knows whether a spill frame needs tearing down first.
        }
    }
}
