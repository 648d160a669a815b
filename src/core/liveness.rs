//! Liveness analysis: local use/def sets per block, global live-in/live-out
//! via iterated backward dataflow to a fixpoint, and
//! per-register live intervals built by walking each block backward once
//! more and merging the resulting ranges across blocks.

use crate::common::{Map, Set};
use crate::core::ids::{BlockId, RegId};
use crate::core::lir::LirFunction;

/// The set of program points (LIR ids, with the terminator counted one past
/// the last real instruction) over which a register holds a value someone
/// will still read. Usually a single contiguous range; more than one when
/// the register dies and is redefined with a gap of dead code in between
/// (e.g. on either side of an unrelated loop).
#[derive(Clone, Debug, Default)]
pub struct Interval {
    pub ranges: Vec<(u32, u32)>,
}

impl Interval {
    pub fn covers(&self, pos: u32) -> bool {
        self.ranges.iter().any(|&(s, e)| pos >= s && pos <= e)
    }

    pub fn start(&self) -> Option<u32> {
        self.ranges.iter().map(|&(s, _)| s).min()
    }

    pub fn end(&self) -> Option<u32> {
        self.ranges.iter().map(|&(_, e)| e).max()
    }

    fn push_and_merge(&mut self, range: (u32, u32)) {
        self.ranges.push(range);
        self.ranges.sort_unstable();
        let mut merged: Vec<(u32, u32)> = Vec::with_capacity(self.ranges.len());
        for &(s, e) in &self.ranges {
            match merged.last_mut() {
                Some(&mut (_, last_e)) if s <= last_e + 1 => {
                    let last = merged.last_mut().unwrap();
                    last.1 = last.1.max(e);
                }
                _ => merged.push((s, e)),
            }
        }
        self.ranges = merged;
    }
}

#[derive(Clone, Debug)]
pub struct LivenessInfo {
    pub live_in: Map<BlockId, Set<RegId>>,
    pub live_out: Map<BlockId, Set<RegId>>,
    pub intervals: Map<RegId, Interval>,
}

fn block_use_def(lir: &LirFunction, block_id: BlockId) -> (Set<RegId>, Set<RegId>) {
    let block = &lir.blocks[&block_id];
    let mut use_set = Set::new();
    let mut def_set = Set::new();
    for (_, insn) in &block.insns {
        for r in insn.uses() {
            if !def_set.contains(&r) {
                use_set.insert(r);
            }
        }
        if let Some(d) = insn.def() {
            def_set.insert(d);
        }
    }
    for r in block.terminator.uses() {
        if !def_set.contains(&r) {
            use_set.insert(r);
        }
    }
    (use_set, def_set)
}

/// Iterated backward dataflow to a fixpoint: `out[b] = ∪ in[succ]`,
/// `in[b] = use[b] ∪ (out[b] − def[b])`.
pub fn analyze(lir: &LirFunction) -> LivenessInfo {
    let block_ids: Vec<BlockId> = lir.blocks.keys().copied().collect();
    let mut use_def: Map<BlockId, (Set<RegId>, Set<RegId>)> = Map::new();
    for &id in &block_ids {
        use_def.insert(id, block_use_def(lir, id));
    }

    let mut live_in: Map<BlockId, Set<RegId>> = block_ids.iter().map(|&id| (id, Set::new())).collect();
    let mut live_out: Map<BlockId, Set<RegId>> = block_ids.iter().map(|&id| (id, Set::new())).collect();

    loop {
        let mut changed = false;
        for &id in block_ids.iter().rev() {
            let successors = lir.blocks[&id].terminator.successors();
            let mut out: Set<RegId> = Set::new();
            for succ in successors {
                if let Some(succ_in) = live_in.get(&succ) {
                    out.extend(succ_in.iter().copied());
                }
            }
            let (use_set, def_set) = &use_def[&id];
            let mut new_in = use_set.clone();
            new_in.extend(out.difference(def_set).copied());

            if out != live_out[&id] {
                live_out.insert(id, out);
                changed = true;
            }
            if new_in != live_in[&id] {
                live_in.insert(id, new_in);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let intervals = build_intervals(lir, &live_in, &live_out);

    LivenessInfo {
        live_in,
        live_out,
        intervals,
    }
}

fn build_intervals(
    lir: &LirFunction,
    live_in: &Map<BlockId, Set<RegId>>,
    live_out: &Map<BlockId, Set<RegId>>,
) -> Map<RegId, Interval> {
    let mut intervals: Map<RegId, Interval> = Map::new();

    for (&block_id, block) in &lir.blocks {
        let block_start = block
            .insns
            .first()
            .map(|&(id, _)| id.0)
            .unwrap_or(block_id as u32);
        let terminator_pos = block
            .insns
            .last()
            .map(|&(id, _)| id.0 + 1)
            .unwrap_or(block_start);

        let mut live: Set<RegId> = live_out[&block_id].clone();
        let mut open: Map<RegId, u32> = live.iter().map(|&r| (r, terminator_pos)).collect();

        for r in block.terminator.uses() {
            if !live.contains(&r) {
                live.insert(r);
                open.insert(r, terminator_pos);
            }
        }

        for &(id, ref insn) in block.insns.iter().rev() {
            if let Some(d) = insn.def() {
                if let Some(end) = open.remove(&d) {
                    intervals.entry(d).or_default().push_and_merge((id.0, end));
                }
                live.remove(&d);
            }
            for r in insn.uses() {
                if !live.contains(&r) {
                    live.insert(r);
                    open.insert(r, id.0);
                }
            }
        }

        // Whatever is left open is live-in to this block: its range starts
        // at the block's first instruction (or, for an empty block, at a
        // synthetic position derived from the block id, which is fine since
        // it is never used to index actual instructions).
        for (r, end) in open {
            debug_assert!(live_in[&block_id].contains(&r) || live.contains(&r));
            intervals
                .entry(r)
                .or_default()
                .push_and_merge((block_start, end));
        }
    }

    intervals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::Op;
    use crate::common::{Descriptor, MethodKey, Type};
    use crate::core::cfg::ControlFlowGraph;

    #[test]
    fn value_used_across_a_loop_stays_live_through_it() {
        // int m(int p0) { int acc = 0; while (p0 != 0) { acc = acc + p0; } return acc; }
        let code = vec![
            Op::Iconst0,   // pc 0,  width 1: acc = 0
            Op::Istore(1), // pc 1,  width 3
            Op::Iload(0),  // pc 4,  width 3: loop head, p0 != 0 ?
            Op::Ifeq(23),  // pc 7,  width 3 -> exit at pc 23
            Op::Iload(1),  // pc 10, width 3: body, acc + p0
            Op::Iload(0),  // pc 13, width 3
            Op::Iadd,      // pc 16, width 1
            Op::Istore(1), // pc 17, width 3
            Op::Goto(4),   // pc 20, width 3 -> back to loop head
            Op::Iload(1),  // pc 23, width 3: return acc
            Op::Ireturn,   // pc 26, width 1
        ];
        let method = MethodKey {
            name: internment::Intern::new("m".to_string()),
            descriptor: Descriptor {
                params: vec![Type::Int],
                ret: Type::Int,
            },
        };
        let cfg = ControlFlowGraph::build(method, 2, &code);
        let hir = crate::core::hir::build(&cfg, &[Type::Int]).unwrap();
        let lir = crate::core::lir::lower(&hir);
        let info = analyze(&lir);
        // the loop header block must have a non-empty live-in set: the
        // phi-resolved accumulator and parameter both cross the back edge.
        let header = cfg
            .blocks
            .iter()
            .find(|b| b.is_loop_head)
            .expect("loop head exists");
        assert!(!info.live_in[&header.id].is_empty());
    }
}
