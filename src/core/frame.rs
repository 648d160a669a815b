//! Frame synthesis and linking: wraps a method's selected body in a
//! prologue/epilogue, lays every method out into one flat instruction
//! stream, and resolves every jump, branch, and call target to an absolute
//! PC. The program's entry point is the two-instruction trampoline at PC
//! 0-1 that calls `main` and halts.
//!
//! Frame layout, relative to a method's own `FP`: the caller pushes its `n`
//! arguments left-to-right, then `calln` jumps in with `RA` set to the
//! return address. The callee's prologue pushes `RA` then `FP`, and only
//! then takes `FP = SP`, so from the callee's new `FP`: `FP-1` is the saved
//! caller `FP`, `FP-2` the saved `RA`, and `FP-(2+n)..FP-2` are the `n`
//! incoming arguments in order. Above `FP`, the prologue first saves every
//! physical temporary the method's body actually touched, so a callee
//! reusing `R0..R11` never clobbers a caller's live value across a call;
//! spill slots are reserved just past that, at non-negative offsets
//! `FP+used.len(), FP+used.len()+1, ...`, by bumping `SP` once more after
//! the register saves.

use crate::classfile::ClassFile;
use crate::common::{Map, MethodKey};
use crate::core::select::{SelectedFunction, TerminatorKind};
use crate::marvin::{Instruction, PlacedInsn, FP, RA, SP};

const TRAMPOLINE_LEN: u32 = 2;

/// `pushr RA`, `pushr FP`, `copy FP, SP`, then `pushr` for every temporary
/// physical register this method's body actually used, in ascending order.
/// These are the callee-saved registers: without this, a callee reusing
/// `R0..R11` for its own locals would silently clobber a caller's still-live
/// value in the same physical slot across the call.
fn prologue(used_registers: &[crate::core::ids::RegId]) -> Vec<Instruction> {
    let mut out = vec![
        Instruction::PushR { src: RA },
        Instruction::PushR { src: FP },
        Instruction::Copy { dst: FP, src: SP },
    ];
    out.extend(
        used_registers
            .iter()
            .map(|&src| Instruction::PushR { src }),
    );
    out
}

fn reserve_spill_frame(spill_slots: usize) -> Vec<Instruction> {
    if spill_slots == 0 {
        Vec::new()
    } else {
        vec![Instruction::AddN {
            dst: SP,
            imm: spill_slots as i32,
        }]
    }
}

/// Mirror of [`prologue`] in reverse: unwind the spill frame, pop every
/// saved temporary (reverse of the order it was pushed), then the saved
/// `FP` and `RA`, then jump back through `RA`.
fn epilogue(spill_slots: usize, used_registers: &[crate::core::ids::RegId]) -> Vec<Instruction> {
    let mut out = Vec::new();
    if spill_slots > 0 {
        out.push(Instruction::AddN {
            dst: SP,
            imm: -(spill_slots as i32),
        });
    }
    out.extend(
        used_registers
            .iter()
            .rev()
            .map(|&dst| Instruction::PopR { dst }),
    );
    out.push(Instruction::PopR { dst: FP });
    out.push(Instruction::PopR { dst: RA });
    out.push(Instruction::JumpR { target: RA });
    out
}

/// One method's fully-assembled body, with jump/branch targets already
/// resolved to PCs local to this method (starting at 0) — only `calln`
/// targets and the final base-address shift remain for [`link_program`].
struct MethodBody {
    method: MethodKey,
    insns: Vec<Instruction>,
    /// Local PC (before the method's base-address shift) each block's first
    /// instruction lands at, used only to place `# Bk` headers when
    /// rendering `.marv` text.
    block_starts: Map<crate::core::ids::BlockId, u32>,
}

fn build_method_body(selected: &SelectedFunction) -> MethodBody {
    let prologue_insns = prologue(&selected.used_registers);
    let reserve = reserve_spill_frame(selected.spill_slots);
    let epilogue_insns = epilogue(selected.spill_slots, &selected.used_registers);

    // First pass: lay out blocks in id order, recording each block's local
    // PC, same two-pass label/backpatch shape the front-end bytecode
    // emitter uses for its own branch targets.
    let mut body: Vec<Instruction> = Vec::new();
    body.extend(prologue_insns);
    body.extend(reserve);

    // Spill slots were numbered from 0 by the allocator, unaware that the
    // saved-register block now also lives just above `FP`; shift every
    // spill-slot access down past it. Parameter loads (always negative
    // offsets from `FP`) are untouched.
    let spill_shift = selected.used_registers.len() as i32;

    let mut block_start: Map<crate::core::ids::BlockId, u32> = Map::new();
    for (&id, block) in &selected.blocks {
        block_start.insert(id, body.len() as u32);
        body.extend(block.insns.iter().cloned().map(|insn| shift_spill_offset(insn, spill_shift)));
        if block.terminator_kind == TerminatorKind::Return {
            body.extend(epilogue_insns.clone());
        }
    }

    for insn in &mut body {
        match insn {
            Instruction::JumpN { target } => {
                *target = block_start[&(*target as usize)];
            }
            Instruction::CondJumpN { target, .. } => {
                *target = block_start[&(*target as usize)];
            }
            _ => {}
        }
    }

    MethodBody {
        method: selected.method.clone(),
        insns: body,
        block_starts: block_start,
    }
}

/// Build every compiled method's body and its base-address layout, shared by
/// [`link_program`] and [`render_marv`]: `(main's key, bodies in declaration
/// order, each method's base PC, each method's base PC keyed by its
/// descriptor string for `calln` resolution)`.
fn layout_program(
    classfile: &ClassFile,
    selected_methods: &Map<MethodKey, SelectedFunction>,
) -> crate::diagnostics::Result<(MethodKey, Vec<MethodBody>, Map<MethodKey, u32>, Map<String, u32>)> {
    let main_key = classfile
        .compiled_methods()
        .find(|m| m.name.as_str() == "main")
        .map(|m| m.key())
        .ok_or_else(|| {
            crate::diagnostics::CompileError::Semantic(
                "program has no `main` method to serve as its entry point".to_string(),
            )
        })?;

    let mut bodies: Vec<MethodBody> = Vec::new();
    for method in classfile.compiled_methods() {
        let key = method.key();
        let selected = &selected_methods[&key];
        bodies.push(build_method_body(selected));
    }

    let mut base: Map<MethodKey, u32> = Map::new();
    let mut base_by_name: Map<String, u32> = Map::new();
    let mut cursor = TRAMPOLINE_LEN;
    for body in &bodies {
        base.insert(body.method.clone(), cursor);
        base_by_name.insert(format!("{}", body.method), cursor);
        cursor += body.insns.len() as u32;
    }

    Ok((main_key, bodies, base, base_by_name))
}

/// Lay out every compiled method into one flat, fully-linked instruction
/// stream: the trampoline at PC 0-1, followed by each method's body with
/// every jump/branch/call target resolved to an absolute PC.
pub fn link_program(
    classfile: &ClassFile,
    selected_methods: &Map<MethodKey, SelectedFunction>,
) -> crate::diagnostics::Result<Vec<PlacedInsn>> {
    let (main_key, bodies, base, base_by_name) = layout_program(classfile, selected_methods)?;

    let mut flat: Vec<Instruction> = vec![
        Instruction::CallN {
            target: base[&main_key],
            callee: format!("{main_key}"),
        },
        Instruction::Halt,
    ];

    for body in &bodies {
        let method_base = base[&body.method];
        for insn in &body.insns {
            flat.push(shift_and_link(insn, method_base, &base_by_name));
        }
    }

    Ok(flat
        .into_iter()
        .enumerate()
        .map(|(pc, insn)| PlacedInsn { pc: pc as u32, insn })
        .collect())
}

/// Render a linked program as `.marv` text: the two-line
/// trampoline, then each compiled method in declaration order, separated by
/// a blank line, each preceded by a `# name+desc` header and with a `# Bk`
/// header before every basic block it contains.
pub fn render_marv(
    classfile: &ClassFile,
    selected_methods: &Map<MethodKey, SelectedFunction>,
) -> crate::diagnostics::Result<String> {
    let (main_key, bodies, base, base_by_name) = layout_program(classfile, selected_methods)?;

    let mut out = String::new();
    out.push_str(&format!(
        "{}\n",
        PlacedInsn {
            pc: 0,
            insn: Instruction::CallN {
                target: base[&main_key],
                callee: format!("{main_key}"),
            },
        }
    ));
    out.push_str(&format!("{}\n", PlacedInsn { pc: 1, insn: Instruction::Halt }));

    for body in &bodies {
        out.push('\n');
        out.push_str(&format!("# {}\n", body.method));
        let method_base = base[&body.method];

        let mut block_header_at: Map<u32, crate::core::ids::BlockId> = Map::new();
        for (&block, &start) in &body.block_starts {
            block_header_at.insert(start, block);
        }

        for (local_pc, insn) in body.insns.iter().enumerate() {
            if let Some(&block) = block_header_at.get(&(local_pc as u32)) {
                out.push_str(&format!("# B{block}\n"));
            }
            let placed = PlacedInsn {
                pc: method_base + local_pc as u32,
                insn: shift_and_link(insn, method_base, &base_by_name),
            };
            out.push_str(&format!("{placed}\n"));
        }
    }

    Ok(out)
}

/// Push a spill-slot access (a non-negative `FP`-relative offset) down past
/// the saved-register block this method's prologue reserves above `FP`.
/// Parameter loads use negative offsets and are left alone.
fn shift_spill_offset(insn: Instruction, shift: i32) -> Instruction {
    match insn {
        Instruction::LoadN { dst, base: FP, offset } if offset >= 0 => Instruction::LoadN {
            dst,
            base: FP,
            offset: offset + shift,
        },
        Instruction::StoreN { base: FP, offset, src } if offset >= 0 => Instruction::StoreN {
            base: FP,
            offset: offset + shift,
            src,
        },
        other => other,
    }
}

fn shift_and_link(insn: &Instruction, method_base: u32, base_by_name: &Map<String, u32>) -> Instruction {
    match insn {
        Instruction::JumpN { target } => Instruction::JumpN {
            target: target + method_base,
        },
        Instruction::CondJumpN {
            cond,
            lhs,
            rhs,
            target,
        } => Instruction::CondJumpN {
            cond: *cond,
            lhs: *lhs,
            rhs: *rhs,
            target: target + method_base,
        },
        Instruction::CallN { callee, .. } => Instruction::CallN {
            target: base_by_name[callee],
            callee: callee.clone(),
        },
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::Op;
    use crate::common::{Descriptor, Type};
    use crate::core::{cfg::ControlFlowGraph, hir, lir, liveness, regalloc, select};

    fn compile_one(name: &str, max_locals: u16, code: Vec<Op>, params: Vec<Type>, ret: Type) -> SelectedFunction {
        let key = MethodKey {
            name: internment::Intern::new(name.to_string()),
            descriptor: Descriptor {
                params: params.clone(),
                ret,
            },
        };
        let cfg = ControlFlowGraph::build(key, max_locals, &code);
        let hir = hir::build(&cfg, &params).unwrap();
        let lir = lir::lower(&hir);
        let info = liveness::analyze(&lir);
        let (allocated, used_registers) = regalloc::allocate(&lir, &info);
        select::select(&allocated, params.len(), used_registers)
    }

    #[test]
    fn trampoline_calls_main_and_halts() {
        let selected = compile_one("main", 0, vec![Op::Return], vec![], Type::Void);
        let mut methods = Map::new();
        methods.insert(selected.method.clone(), selected);
        let mut cf = ClassFile::default();
        cf.methods.push(crate::classfile::MethodRecord {
            name: internment::Intern::new("main".to_string()),
            descriptor: Descriptor {
                params: vec![],
                ret: Type::Void,
            },
            max_locals: 0,
            code: vec![Op::Return],
        });
        let program = link_program(&cf, &methods).unwrap();
        assert!(matches!(program[0].insn, Instruction::CallN { target: 2, .. }));
        assert!(matches!(program[1].insn, Instruction::Halt));
    }
}
