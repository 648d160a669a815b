//! Textual dumps of intermediate pipeline state, enabled by `-v`/`--verbose`.
//! Each function renders one stage for one method; the `iotac` binary is
//! responsible for deciding where the text goes (stderr, alongside the
//! `.marv` file, etc).

use std::fmt::Write as _;

use crate::core::cfg::ControlFlowGraph;
use crate::core::hir::{HirFunction, HirInsn, Terminator};
use crate::core::lir::{LirFunction, LirTerminator};
use crate::core::liveness::LivenessInfo;
use crate::core::tuple::Tuple;

pub fn dump_tuples(method: &str, tuples: &[Tuple]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# tuples: {method}");
    for t in tuples {
        let _ = writeln!(out, "{:>4}  {:?}{}", t.pc, t.op, if t.is_leader { "  <- leader" } else { "" });
    }
    out
}

pub fn dump_cfg(cfg: &ControlFlowGraph) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Bk: {}", cfg.method);
    for block in &cfg.blocks {
        let _ = writeln!(
            out,
            "B{} preds={:?} succs={:?}{}{}",
            block.id,
            block.predecessors,
            block.successors,
            if block.is_loop_head { " loop_head" } else { "" },
            if block.is_loop_tail { " loop_tail" } else { "" },
        );
    }
    out
}

pub fn dump_hir(hir: &HirFunction) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# hir: {}", hir.method);
    for (&id, block) in &hir.blocks {
        let _ = writeln!(out, "B{id}:");
        for &v in &block.insns {
            if hir.resolve(v) != v {
                continue;
            }
            let _ = writeln!(out, "  {v} = {}", describe_hir(hir, v));
        }
        let _ = writeln!(out, "  {}", describe_terminator(&block.terminator));
    }
    out
}

fn describe_hir(hir: &HirFunction, id: crate::core::ids::HirId) -> String {
    match hir.insn(id) {
        HirInsn::Const(v) => format!("const {v}"),
        HirInsn::Param(i) => format!("param {i}"),
        HirInsn::Neg(v) => format!("neg {v}"),
        HirInsn::Bin(op, l, r) => format!("{op:?} {l}, {r}"),
        HirInsn::Call(key, args) => format!("call {key} {args:?}"),
        HirInsn::Phi(operands) => format!("phi {operands:?}"),
    }
}

fn describe_terminator(t: &Terminator) -> String {
    match t {
        Terminator::Fallthrough(b) => format!("jump B{b}"),
        Terminator::Branch {
            cond,
            lhs,
            rhs,
            if_true,
            if_false,
        } => format!("branch {cond:?} {lhs}, {rhs} -> B{if_true} else B{if_false}"),
        Terminator::Return(v) => format!("return {v:?}"),
    }
}

pub fn dump_lir(lir: &LirFunction) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# lir: {}", lir.method);
    for (&id, block) in &lir.blocks {
        let _ = writeln!(out, "B{id}:");
        for (lir_id, insn) in &block.insns {
            let _ = writeln!(out, "  {lir_id}: {insn:?}");
        }
        let _ = writeln!(out, "  {}", describe_lir_terminator(&block.terminator));
    }
    out
}

fn describe_lir_terminator(t: &LirTerminator) -> String {
    match t {
        LirTerminator::Jump(b) => format!("jump B{b}"),
        LirTerminator::Branch {
            cond,
            lhs,
            rhs,
            if_true,
            if_false,
        } => format!("branch {cond:?} {lhs}, {rhs} -> B{if_true} else B{if_false}"),
        LirTerminator::Return(v) => format!("return {v:?}"),
    }
}

pub fn dump_liveness(lir: &LirFunction, info: &LivenessInfo) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# liveness: {}", lir.method);
    for &id in lir.blocks.keys() {
        let _ = writeln!(
            out,
            "B{id}: in={:?} out={:?}",
            info.live_in.get(&id).cloned().unwrap_or_default(),
            info.live_out.get(&id).cloned().unwrap_or_default()
        );
    }
    for (reg, interval) in &info.intervals {
        let _ = writeln!(out, "{reg}: {:?}", interval.ranges);
    }
    out
}
