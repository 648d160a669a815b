//! Control-flow graph construction from a method's linear bytecode.
//!
//! Built the way a Move stackless-bytecode CFG builder does it: leaders
//! first, then a single linear pass splitting the tuple stream into blocks
//! at each leader, then an edge-wiring pass that reads only the last tuple
//! of each block. Loop detection and reachability pruning are separate
//! passes over the resulting block list, keeping "find blocks" and "find
//! loops" as distinct stages rather than one monolithic walk.

use crate::common::{Map, MethodKey};
use crate::core::ids::BlockId;
use crate::core::tuple::{self, Tuple};

#[derive(Clone, Debug)]
pub struct BasicBlock {
    pub id: BlockId,
    pub tuples: Vec<Tuple>,
    pub predecessors: Vec<BlockId>,
    pub successors: Vec<BlockId>,
    pub is_loop_head: bool,
    pub is_loop_tail: bool,
}

impl BasicBlock {
    fn empty(id: BlockId) -> Self {
        BasicBlock {
            id,
            tuples: Vec::new(),
            predecessors: Vec::new(),
            successors: Vec::new(),
            is_loop_head: false,
            is_loop_tail: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ControlFlowGraph {
    pub method: MethodKey,
    pub max_locals: u16,
    pub blocks: Vec<BasicBlock>,
}

/// Block 0 is always the synthetic empty entry point: it carries no tuples
/// and falls through unconditionally to block 1, the first block built from
/// the method's actual bytecode.
pub const ENTRY: BlockId = 0;

impl ControlFlowGraph {
    pub fn build(method: MethodKey, max_locals: u16, code: &[crate::classfile::Op]) -> Self {
        let tuples = tuple::decode(code);
        let leader_pcs = find_leaders(&tuples);

        let mut blocks = vec![BasicBlock::empty(ENTRY)];
        let mut pc_to_block: Map<u32, BlockId> = Map::new();
        let mut current: Vec<Tuple> = Vec::new();
        for t in &tuples {
            if leader_pcs.contains(&t.pc) && !current.is_empty() {
                flush_block(&mut blocks, &mut pc_to_block, &mut current);
            }
            let mut t = t.clone();
            t.is_leader = leader_pcs.contains(&t.pc);
            current.push(t);
        }
        if !current.is_empty() {
            flush_block(&mut blocks, &mut pc_to_block, &mut current);
        }

        if blocks.len() > 1 {
            blocks[ENTRY].successors.push(1);
            blocks[1].predecessors.push(ENTRY);
        }

        wire_edges(&mut blocks, &pc_to_block);

        let mut cfg = ControlFlowGraph {
            method,
            max_locals,
            blocks,
        };
        cfg.mark_loops();
        cfg.prune_unreachable();
        tracing::trace!(method = %cfg.method, blocks = cfg.blocks.len(), "built control-flow graph");
        cfg
    }

    /// DFS from the entry block, marking the target of any edge to a block
    /// already on the DFS stack as a loop head, and its source as the loop
    /// tail (back edge). Mirrors the visited/active two-flag scheme from the
    /// Move CFG builder, adapted from its SCC-based loop test to a direct
    /// active-stack check since Marvin programs have no irreducible loops.
    fn mark_loops(&mut self) {
        let mut visited = vec![false; self.blocks.len()];
        let mut active = vec![false; self.blocks.len()];
        let mut back_edges = Vec::new();
        self.dfs_mark(ENTRY, &mut visited, &mut active, &mut back_edges);
        for (tail, head) in back_edges {
            self.blocks[tail].is_loop_tail = true;
            self.blocks[head].is_loop_head = true;
        }
    }

    fn dfs_mark(
        &self,
        block: BlockId,
        visited: &mut [bool],
        active: &mut [bool],
        back_edges: &mut Vec<(BlockId, BlockId)>,
    ) {
        visited[block] = true;
        active[block] = true;
        for &succ in &self.blocks[block].successors {
            if active[succ] {
                back_edges.push((block, succ));
            } else if !visited[succ] {
                self.dfs_mark(succ, visited, active, back_edges);
            }
        }
        active[block] = false;
    }

    /// Remove blocks unreachable from the entry point and remap remaining
    /// block ids to a dense `0..n` range. Bytecode following an unconditional
    /// return or goto that no branch targets is simply never visited here,
    /// including any synthetic tail the emitter left behind for a label to
    /// resolve against.
    fn prune_unreachable(&mut self) {
        let mut reachable = vec![false; self.blocks.len()];
        let mut stack = vec![ENTRY];
        reachable[ENTRY] = true;
        while let Some(b) = stack.pop() {
            for &succ in &self.blocks[b].successors {
                if !reachable[succ] {
                    reachable[succ] = true;
                    stack.push(succ);
                }
            }
        }

        if reachable.iter().all(|&r| r) {
            return;
        }

        let mut remap: Map<BlockId, BlockId> = Map::new();
        let mut next = 0;
        for (old, &keep) in reachable.iter().enumerate() {
            if keep {
                remap.insert(old, next);
                next += 1;
            }
        }

        let mut kept: Vec<BasicBlock> = Vec::with_capacity(next);
        for (old, block) in std::mem::take(&mut self.blocks).into_iter().enumerate() {
            if !reachable[old] {
                continue;
            }
            let mut block = block;
            block.id = remap[&old];
            block.predecessors = block
                .predecessors
                .into_iter()
                .filter_map(|p| remap.get(&p).copied())
                .collect();
            block.successors = block
                .successors
                .into_iter()
                .filter_map(|s| remap.get(&s).copied())
                .collect();
            kept.push(block);
        }
        self.blocks = kept;
    }
}

/// A tuple is a leader when it is the first tuple of the method, the target
/// of some branch, or immediately follows a terminator (branch or return).
/// The last condition is needed beyond just branch targets: without it, the
/// tuple after a `return` would be silently fused onto the tail of the block
/// containing the `return`, violating the single-terminator-per-block
/// invariant the rest of the pipeline assumes holds for every block.
fn find_leaders(tuples: &[Tuple]) -> std::collections::BTreeSet<u32> {
    let mut leaders = std::collections::BTreeSet::new();
    if let Some(first) = tuples.first() {
        leaders.insert(first.pc);
    }
    for (i, t) in tuples.iter().enumerate() {
        if let Some(target) = t.branch_target() {
            leaders.insert(target);
        }
        if t.is_terminator() {
            if let Some(next) = tuples.get(i + 1) {
                leaders.insert(next.pc);
            }
        }
    }
    leaders
}

fn flush_block(
    blocks: &mut Vec<BasicBlock>,
    pc_to_block: &mut Map<u32, BlockId>,
    current: &mut Vec<Tuple>,
) {
    let id = blocks.len();
    pc_to_block.insert(current[0].pc, id);
    blocks.push(BasicBlock {
        id,
        tuples: std::mem::take(current),
        predecessors: Vec::new(),
        successors: Vec::new(),
        is_loop_head: false,
        is_loop_tail: false,
    });
}

/// Wire successor/predecessor edges for every non-entry block, reading only
/// its last tuple:
/// - unconditional branch: single successor, the branch target's block.
/// - conditional branch: two successors, branch target and fall-through.
/// - return: no successors — a true exit point, not a fall-through edge.
/// - otherwise: single successor, the textually-next block.
fn wire_edges(blocks: &mut [BasicBlock], pc_to_block: &Map<u32, BlockId>) {
    let n = blocks.len();
    for id in 1..n {
        let last = match blocks[id].tuples.last() {
            Some(t) => t.clone(),
            None => continue,
        };
        let mut successors = Vec::new();
        if last.is_return() {
            // no outgoing edges
        } else if last.is_unconditional_branch() {
            successors.push(pc_to_block[&last.branch_target().unwrap()]);
        } else if last.is_conditional_branch() {
            successors.push(pc_to_block[&last.branch_target().unwrap()]);
            if let Some(&fallthrough) = pc_to_block.get(&last.next_pc()) {
                successors.push(fallthrough);
            }
        } else if id + 1 < n {
            successors.push(id + 1);
        }
        blocks[id].successors = successors;
    }
    for id in 0..n {
        let succs = blocks[id].successors.clone();
        for succ in succs {
            blocks[succ].predecessors.push(id);
        }
    }
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
    fn straight_line_is_a_single_block() {
        let code = vec![Op::Iconst0, Op::Istore(0), Op::Return];
        let cfg = ControlFlowGraph::build(key(), 1, &code);
        // entry + one real block
        assert_eq!(cfg.blocks.len(), 2);
        assert_eq!(cfg.blocks[1].successors, Vec::<BlockId>::new());
    }

    #[test]
    fn only_each_blocks_first_tuple_is_marked_a_leader() {
        let code = vec![
            Op::Iconst0, // pc 0, width 1 -> leader
            Op::Ifeq(5), // pc 1, width 3
            Op::Iconst1, // pc 4, width 1 -> leader (fallthrough block)
            Op::Return,  // pc 5 -> leader (branch target block)
        ];
        let cfg = ControlFlowGraph::build(key(), 1, &code);
        for block in &cfg.blocks {
            for (i, t) in block.tuples.iter().enumerate() {
                assert_eq!(t.is_leader, i == 0, "block {} tuple {i}", block.id);
            }
        }
    }

    #[test]
    fn conditional_branch_produces_two_successors() {
        // 0: iconst_0 (1)  1: ifeq -> 5 (3)  4: iconst_1 (1, dead slot unused)
        // Use pcs that line up: ifeq target must equal a real leader pc.
        let code = vec![
            Op::Iconst0,    // pc 0, width 1
            Op::Ifeq(5),    // pc 1, width 3 -> target pc 5
            Op::Iconst1,    // pc 4, width 1 (fallthrough block)
            Op::Return,     // pc 5 (branch target block)
        ];
        let cfg = ControlFlowGraph::build(key(), 1, &code);
        // entry(0), [iconst0, ifeq](1), [iconst1](2), [return](3)
        assert_eq!(cfg.blocks.len(), 4);
        assert_eq!(cfg.blocks[1].successors.len(), 2);
    }

    #[test]
    fn dead_code_after_unconditional_return_is_pruned() {
        let code = vec![
            Op::Return,  // pc 0
            Op::Iconst0, // pc 1, unreachable
            Op::Return,  // pc 2, unreachable
        ];
        let cfg = ControlFlowGraph::build(key(), 1, &code);
        // entry + just the first real block; the dead tail never gets a block.
        assert_eq!(cfg.blocks.len(), 2);
        assert!(cfg.blocks[1].successors.is_empty());
    }

    #[test]
    fn back_edge_marks_loop_head_and_tail() {
        // 0: ifeq -> 6 (loop exit)   3: (body) goto 0   6: return
        let code = vec![
            Op::Ifeq(6), // pc 0, width 3, head of loop
            Op::Goto(0), // pc 3, width 3, tail of loop
            Op::Return,  // pc 6
        ];
        let cfg = ControlFlowGraph::build(key(), 1, &code);
        assert!(cfg.blocks.iter().any(|b| b.is_loop_head));
        assert!(cfg.blocks.iter().any(|b| b.is_loop_tail));
    }
}
