//! HIR construction: lowers each block's tuples into an SSA-style
//! instruction list by simulating the JVM-like operand stack, then resolves
//! eager φ-functions placed at every block with more than one predecessor.
//!
//! The simulation assumes the operand stack is empty at every block
//! boundary — true of any bytecode the front-end emitter produces, since it
//! never leaves partial expressions spanning a branch. A comparison
//! (`ifeq`/`if_icmplt`/...) never becomes an HIR value in its own right: the
//! front end only ever uses a comparison to drive a branch, so it is folded
//! directly into the block's [`Terminator`] instead of being materialized
//! as a boolean, mirroring how `javac` itself never reifies a comparison
//! outside of a conditional jump or an explicit ternary lowering.

use crate::classfile::Op;
use crate::common::{Map, MethodKey, Set};
use crate::core::cfg::ControlFlowGraph;
use crate::core::ids::{BlockId, HirId};
use crate::diagnostics::{CompileError, Result};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Clone, Debug)]
pub enum HirInsn {
    Const(i32),
    /// The value of method parameter `n`, materialized once at the start of
    /// the method's first real block.
    Param(u16),
    Neg(HirId),
    Bin(BinOp, HirId, HirId),
    Call(MethodKey, Vec<HirId>),
    /// One operand per predecessor block, in `cfg.predecessors` order.
    Phi(Vec<(BlockId, HirId)>),
}

#[derive(Clone, Debug)]
pub enum Terminator {
    Fallthrough(BlockId),
    Branch {
        cond: Cond,
        lhs: HirId,
        rhs: HirId,
        if_true: BlockId,
        if_false: BlockId,
    },
    Return(Option<HirId>),
}

#[derive(Clone, Debug)]
pub struct HirBlock {
    pub id: BlockId,
    pub entry_locals: Vec<Option<HirId>>,
    /// Instruction order for this block, phis first, including `Call`s whose
    /// result (if any) is unused.
    pub insns: Vec<HirId>,
    pub terminator: Terminator,
}

#[derive(Clone, Debug)]
pub struct HirFunction {
    pub method: MethodKey,
    pub max_locals: u16,
    pub blocks: Map<BlockId, HirBlock>,
    pub values: Map<HirId, HirInsn>,
    /// Trivial-phi and loop-self-reference redirects: look up through
    /// [`HirFunction::resolve`], never index `values` directly with an id
    /// that might have been redirected.
    redirects: Map<HirId, HirId>,
}

impl HirFunction {
    /// Follow redirects to the canonical id for a value. Safe on any id,
    /// including ones that were never redirected.
    pub fn resolve(&self, mut id: HirId) -> HirId {
        let mut steps = 0;
        while let Some(&next) = self.redirects.get(&id) {
            id = next;
            steps += 1;
            if steps > self.redirects.len() + 1 {
                // A cycle would mean every phi in it is self-referential
                // with no real value reaching it from outside — dead code
                // the CFG's reachability pruning should already have
                // removed. Stop rather than loop forever.
                break;
            }
        }
        id
    }

    pub fn insn(&self, id: HirId) -> &HirInsn {
        &self.values[&self.resolve(id)]
    }
}

struct Builder<'a> {
    cfg: &'a ControlFlowGraph,
    next_id: u32,
    values: Map<HirId, HirInsn>,
    exit_locals: Map<BlockId, Vec<Option<HirId>>>,
    phi_slots: Vec<(BlockId, usize, HirId)>,
}

impl<'a> Builder<'a> {
    fn fresh(&mut self) -> HirId {
        let id = HirId(self.next_id);
        self.next_id += 1;
        id
    }

    fn push(&mut self, insns: &mut Vec<HirId>, insn: HirInsn) -> HirId {
        let id = self.fresh();
        self.values.insert(id, insn);
        insns.push(id);
        id
    }
}

/// Build the SSA-style HIR for one method's control-flow graph.
pub fn build(cfg: &ControlFlowGraph, param_types: &[crate::common::Type]) -> Result<HirFunction> {
    let mut b = Builder {
        cfg,
        next_id: 0,
        values: Map::new(),
        exit_locals: Map::new(),
        phi_slots: Vec::new(),
    };

    let max_locals = cfg.max_locals as usize;
    let mut entry_exit = vec![None; max_locals];
    let mut param_ids = Vec::with_capacity(param_types.len());
    for (slot, _) in param_types.iter().enumerate() {
        let id = b.fresh();
        b.values.insert(id, HirInsn::Param(slot as u16));
        entry_exit[slot] = Some(id);
        param_ids.push(id);
    }
    b.exit_locals.insert(crate::core::cfg::ENTRY, entry_exit);

    let mut blocks: Map<BlockId, HirBlock> = Map::new();
    for id in 1..cfg.blocks.len() {
        // Block 1 is always the method's single real entry point (its sole
        // predecessor is the synthetic entry block), so its parameters are
        // materialized at the head of its instruction list rather than
        // wherever their first use happens to fall.
        let prologue: &[HirId] = if id == 1 { &param_ids } else { &[] };
        tracing::trace!(method = %cfg.method, block = id, "building HIR for block");
        let block = build_block(&mut b, id, max_locals, prologue)?;
        b.exit_locals.insert(id, block_exit_locals(&block, &b));
        blocks.insert(id, block);
    }

    resolve_phis(&mut b);
    let redirects = cleanup_phis(&mut b);

    Ok(HirFunction {
        method: cfg.method.clone(),
        max_locals: cfg.max_locals,
        blocks,
        values: b.values,
        redirects,
    })
}

fn block_exit_locals(block: &HirBlock, _b: &Builder) -> Vec<Option<HirId>> {
    block.entry_locals.clone()
}

fn build_block(
    b: &mut Builder,
    id: BlockId,
    max_locals: usize,
    prologue: &[HirId],
) -> Result<HirBlock> {
    let cfg_block = &b.cfg.blocks[id];
    let mut insns: Vec<HirId> = prologue.to_vec();

    let mut locals: Vec<Option<HirId>> = if cfg_block.predecessors.len() > 1 {
        let mut locals = vec![None; max_locals];
        for slot in 0..max_locals {
            let phi_id = b.push(&mut insns, HirInsn::Phi(Vec::new()));
            b.phi_slots.push((id, slot, phi_id));
            locals[slot] = Some(phi_id);
        }
        locals
    } else {
        let pred = *cfg_block.predecessors.first().ok_or_else(|| {
            CompileError::internal(b.cfg.method.name, "unreachable block with no predecessor")
        })?;
        b.exit_locals
            .get(&pred)
            .cloned()
            .ok_or_else(|| CompileError::internal(b.cfg.method.name, "predecessor not yet built"))?
    };

    let mut stack: Vec<HirId> = Vec::new();
    let mut terminator = None;

    for tuple in &cfg_block.tuples {
        match &tuple.op {
            Op::Iconst0 => stack.push(b.push(&mut insns, HirInsn::Const(0))),
            Op::Iconst1 => stack.push(b.push(&mut insns, HirInsn::Const(1))),
            Op::Ldc(v) => stack.push(b.push(&mut insns, HirInsn::Const(*v))),
            Op::Iload(slot) => {
                let v = locals[*slot as usize].ok_or_else(|| {
                    CompileError::internal(b.cfg.method.name, "load of unset local")
                })?;
                stack.push(v);
            }
            Op::Istore(slot) => {
                let v = pop(&mut stack, b.cfg.method.name)?;
                locals[*slot as usize] = Some(v);
            }
            Op::Dup => {
                let top = *stack
                    .last()
                    .ok_or_else(|| CompileError::internal(b.cfg.method.name, "dup on empty stack"))?;
                stack.push(top);
            }
            Op::Pop => {
                pop(&mut stack, b.cfg.method.name)?;
            }
            Op::Ineg => {
                let v = pop(&mut stack, b.cfg.method.name)?;
                stack.push(b.push(&mut insns, HirInsn::Neg(v)));
            }
            Op::Iadd | Op::Isub | Op::Imul | Op::Idiv | Op::Irem => {
                let rhs = pop(&mut stack, b.cfg.method.name)?;
                let lhs = pop(&mut stack, b.cfg.method.name)?;
                let op = match tuple.op {
                    Op::Iadd => BinOp::Add,
                    Op::Isub => BinOp::Sub,
                    Op::Imul => BinOp::Mul,
                    Op::Idiv => BinOp::Div,
                    Op::Irem => BinOp::Mod,
                    _ => unreachable!(),
                };
                stack.push(b.push(&mut insns, HirInsn::Bin(op, lhs, rhs)));
            }
            Op::Invokestatic(key) => {
                let argc = key.descriptor.params.len();
                let mut args = Vec::with_capacity(argc);
                for _ in 0..argc {
                    args.push(pop(&mut stack, b.cfg.method.name)?);
                }
                args.reverse();
                let result = b.push(&mut insns, HirInsn::Call(key.clone(), args));
                if key.descriptor.ret != crate::common::Type::Void {
                    stack.push(result);
                }
            }
            Op::Goto(_) => {
                terminator = Some(Terminator::Fallthrough(cfg_block.successors[0]));
            }
            Op::Ifeq(_) | Op::Ifne(_) => {
                let lhs = pop(&mut stack, b.cfg.method.name)?;
                let rhs = b.push(&mut insns, HirInsn::Const(0));
                let cond = if matches!(tuple.op, Op::Ifeq(_)) {
                    Cond::Eq
                } else {
                    Cond::Ne
                };
                terminator = Some(Terminator::Branch {
                    cond,
                    lhs,
                    rhs,
                    if_true: cfg_block.successors[0],
                    if_false: cfg_block.successors[1],
                });
            }
            Op::IfIcmpeq(_)
            | Op::IfIcmpne(_)
            | Op::IfIcmplt(_)
            | Op::IfIcmpge(_)
            | Op::IfIcmpgt(_)
            | Op::IfIcmple(_) => {
                let rhs = pop(&mut stack, b.cfg.method.name)?;
                let lhs = pop(&mut stack, b.cfg.method.name)?;
                let cond = match tuple.op {
                    Op::IfIcmpeq(_) => Cond::Eq,
                    Op::IfIcmpne(_) => Cond::Ne,
                    Op::IfIcmplt(_) => Cond::Lt,
                    Op::IfIcmpge(_) => Cond::Ge,
                    Op::IfIcmpgt(_) => Cond::Gt,
                    Op::IfIcmple(_) => Cond::Le,
                    _ => unreachable!(),
                };
                terminator = Some(Terminator::Branch {
                    cond,
                    lhs,
                    rhs,
                    if_true: cfg_block.successors[0],
                    if_false: cfg_block.successors[1],
                });
            }
            Op::Ireturn => {
                let v = pop(&mut stack, b.cfg.method.name)?;
                terminator = Some(Terminator::Return(Some(v)));
            }
            Op::Return => {
                terminator = Some(Terminator::Return(None));
            }
        }
    }

    let terminator = match terminator {
        Some(t) => t,
        None => match cfg_block.successors.first() {
            Some(&succ) => Terminator::Fallthrough(succ),
            None => Terminator::Return(None),
        },
    };

    Ok(HirBlock {
        id,
        entry_locals: locals,
        insns,
        terminator,
    })
}

fn pop(stack: &mut Vec<HirId>, method: crate::common::Id) -> Result<HirId> {
    stack
        .pop()
        .ok_or_else(|| CompileError::internal(method, "operand stack underflow"))
}

/// Fill in every eager phi's operand list now that every block's exit-local
/// state (including loop bodies discovered after their header) is known.
fn resolve_phis(b: &mut Builder) {
    let phi_slots = std::mem::take(&mut b.phi_slots);
    for (block_id, slot, phi_id) in phi_slots {
        let mut operands = Vec::new();
        for &pred in &b.cfg.blocks[block_id].predecessors {
            if let Some(v) = b.exit_locals.get(&pred).and_then(|locals| locals[slot]) {
                operands.push((pred, v));
            }
        }
        b.values.insert(phi_id, HirInsn::Phi(operands));
    }
}

/// Iteratively collapse phis whose operands (after following existing
/// redirects and dropping self-references) resolve to a single distinct
/// value: the trivial-constant and loop-self-reference rules.
fn cleanup_phis(b: &mut Builder) -> Map<HirId, HirId> {
    let mut redirects: Map<HirId, HirId> = Map::new();
    let resolve = |redirects: &Map<HirId, HirId>, mut id: HirId| -> HirId {
        let mut steps = 0;
        while let Some(&next) = redirects.get(&id) {
            id = next;
            steps += 1;
            if steps > redirects.len() + 1 {
                break;
            }
        }
        id
    };

    loop {
        let mut changed = false;
        let ids: Vec<HirId> = b.values.keys().copied().collect();
        for id in ids {
            if redirects.contains_key(&id) {
                continue;
            }
            let HirInsn::Phi(operands) = &b.values[&id] else {
                continue;
            };
            let distinct: Set<HirId> = operands
                .iter()
                .map(|&(_, v)| resolve(&redirects, v))
                .filter(|&v| v != id)
                .collect();
            if distinct.len() == 1 {
                let target = *distinct.iter().next().unwrap();
                redirects.insert(id, target);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    redirects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::Op;
    use crate::common::{Descriptor, Type};

    fn key() -> MethodKey {
        MethodKey {
            name: internment::Intern::new("m".to_string()),
            descriptor: Descriptor {
                params: vec![],
                ret: Type::Void,
            },
        }
    }

    #[test]
    fn straight_line_builds_one_block_with_no_phis() {
        let code = vec![
            Op::Iconst0,
            Op::Istore(0),
            Op::Iload(0),
            Op::Iconst1,
            Op::Iadd,
            Op::Istore(0),
            Op::Return,
        ];
        let cfg = ControlFlowGraph::build(key(), 1, &code);
        let hir = build(&cfg, &[]).unwrap();
        assert_eq!(hir.blocks.len(), 1);
        let block = &hir.blocks[&1];
        assert!(!block.insns.iter().any(|id| matches!(hir.insn(*id), HirInsn::Phi(_))));
        assert!(matches!(block.terminator, Terminator::Return(Some(_))));
    }

    #[test]
    fn merge_block_gets_a_phi_per_local() {
        // int m(int p0) { int x; if (p0) { x = 1; } else { x = 0; } return x; }
        let code = vec![
            Op::Iload(0),  // pc 0, width 3
            Op::Ifeq(13),  // pc 3, width 3 -> else branch at pc 13
            Op::Iconst1,   // pc 6, width 1
            Op::Istore(1), // pc 7, width 3
            Op::Goto(17),  // pc 10, width 3 -> merge at pc 17
            Op::Iconst0,   // pc 13, width 1
            Op::Istore(1), // pc 14, width 3
            Op::Iload(1),  // pc 17, width 3
            Op::Ireturn,   // pc 20, width 1
        ];
        let method = MethodKey {
            name: internment::Intern::new("m".to_string()),
            descriptor: Descriptor {
                params: vec![Type::Int],
                ret: Type::Int,
            },
        };
        let cfg = ControlFlowGraph::build(method, 2, &code);
        let merge_id = cfg
            .blocks
            .iter()
            .find(|b| b.predecessors.len() > 1)
            .expect("merge block exists")
            .id;
        let hir = build(&cfg, &[Type::Int]).unwrap();
        let merge = &hir.blocks[&merge_id];
        let phi_count = merge
            .insns
            .iter()
            .filter(|id| matches!(hir.insn(**id), HirInsn::Phi(_)))
            .count();
        assert_eq!(phi_count, 2); // one per local slot, eagerly
        assert!(matches!(merge.terminator, Terminator::Return(Some(_))));
    }
}
