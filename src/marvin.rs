//! The Marvin instruction set: the final form every method is lowered to.
//!
//! Modeled directly on a RISC-V backend's instruction representation
//! (`Instruction`/`Register`): a flat, `Copy`-able instruction
//! enum carrying already-assigned physical registers, plus a `Display` impl
//! that is also the textual assembly syntax. Marvin has sixteen registers
//! and a memory-mapped stack instead of RISC-V's thirty-two and a dedicated
//! stack pointer convention, so the register file and addressing modes
//! differ, but the shape of "one enum variant per instruction, read its
//! operands back out generically for liveness" carries over unchanged.

use derive_more::Display;

use crate::core::ids::RegId;

/// Number of general-purpose temporary registers (`R0..=R11`).
pub const NUM_TEMPS: u32 = 12;
pub const RA: RegId = RegId(12);
pub const RV: RegId = RegId(13);
pub const FP: RegId = RegId(14);
pub const SP: RegId = RegId(15);

/// The human-readable name of a physical register, as it appears in `.marv` output.
pub fn register_name(r: RegId) -> String {
    match r.0 {
        0..=11 => format!("R{}", r.0),
        12 => "RA".to_string(),
        13 => "RV".to_string(),
        14 => "FP".to_string(),
        15 => "SP".to_string(),
        other => format!("v{other}"), // should never reach emission unallocated
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum ArithOp {
    #[display("add")]
    Add,
    #[display("sub")]
    Sub,
    #[display("mul")]
    Mul,
    #[display("div")]
    Div,
    #[display("mod")]
    Mod,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum Cond {
    #[display("eq")]
    Eq,
    #[display("ge")]
    Ge,
    #[display("gt")]
    Gt,
    #[display("le")]
    Le,
    #[display("lt")]
    Lt,
    #[display("ne")]
    Ne,
}

/// One Marvin instruction. Jump/call targets are absolute PCs, resolved
/// during linking; before linking they are placeholders filled in by
/// [`crate::core::frame`].
#[derive(Clone, Debug)]
pub enum Instruction {
    Arith {
        op: ArithOp,
        dst: RegId,
        lhs: RegId,
        rhs: RegId,
    },
    Copy {
        dst: RegId,
        src: RegId,
    },
    /// `setn dst, N` — general constant load.
    SetN {
        dst: RegId,
        imm: i32,
    },
    /// `set0 dst` — small-constant fast path for zero.
    Set0 {
        dst: RegId,
    },
    /// `set1 dst` — small-constant fast path for one.
    Set1 {
        dst: RegId,
    },
    /// `addn dst, N` — increment a register by an immediate in place.
    AddN {
        dst: RegId,
        imm: i32,
    },
    /// `jumpr reg` — jump to the address held in a register (used for `jumpr RA`).
    JumpR {
        target: RegId,
    },
    /// `jumpn N` — unconditional jump to an absolute PC.
    JumpN {
        target: u32,
    },
    /// `j<cond>n lhs, rhs, N` — conditional jump to an absolute PC.
    CondJumpN {
        cond: Cond,
        lhs: RegId,
        rhs: RegId,
        target: u32,
    },
    /// `loadn dst, base, offset` — load from `[base + offset]`.
    LoadN {
        dst: RegId,
        base: RegId,
        offset: i32,
    },
    /// `storen base, offset, src` — store to `[base + offset]`.
    StoreN {
        base: RegId,
        offset: i32,
        src: RegId,
    },
    /// `pushr reg` — push a register onto the stack (`[SP] = reg; SP += 1`).
    PushR {
        src: RegId,
    },
    /// `popr reg` — pop the stack into a register (`SP -= 1; reg = [SP]`).
    PopR {
        dst: RegId,
    },
    /// `calln N` — call an absolute address, saving the return PC in `RA`.
    CallN {
        target: u32,
        callee: String,
    },
    Read {
        dst: RegId,
    },
    Write {
        src: RegId,
    },
    Halt,
}

impl Instruction {
    /// Registers this instruction reads, for liveness/selection bookkeeping
    /// after allocation.
    pub fn reads(&self) -> Vec<RegId> {
        use Instruction::*;
        match self {
            Arith { lhs, rhs, .. } => vec![*lhs, *rhs],
            Copy { src, .. } => vec![*src],
            SetN { .. } | Set0 { .. } | Set1 { .. } => vec![],
            AddN { dst, .. } => vec![*dst],
            JumpR { target } => vec![*target],
            JumpN { .. } => vec![],
            CondJumpN { lhs, rhs, .. } => vec![*lhs, *rhs],
            LoadN { base, .. } => vec![*base],
            StoreN { base, src, .. } => vec![*base, *src],
            PushR { src } => vec![*src],
            PopR { .. } => vec![],
            CallN { .. } => vec![],
            Read { .. } => vec![],
            Write { src } => vec![*src],
            Halt => vec![],
        }
    }

    fn comment(&self) -> String {
        use Instruction::*;
        match self {
            Arith { op, dst, lhs, rhs } => format!(
                "{} = {} {op} {}",
                register_name(*dst),
                register_name(*lhs),
                register_name(*rhs)
            ),
            Copy { dst, src } => format!("{} = {}", register_name(*dst), register_name(*src)),
            SetN { dst, imm } => format!("{} = {imm}", register_name(*dst)),
            Set0 { dst } => format!("{} = 0", register_name(*dst)),
            Set1 { dst } => format!("{} = 1", register_name(*dst)),
            AddN { dst, imm } => format!("{} += {imm}", register_name(*dst)),
            JumpR { target } => format!("jump to address in {}", register_name(*target)),
            JumpN { target } => format!("jump to {target}"),
            CondJumpN {
                cond,
                lhs,
                rhs,
                target,
            } => format!(
                "if {} {cond} {} jump to {target}",
                register_name(*lhs),
                register_name(*rhs)
            ),
            LoadN { dst, base, offset } => format!(
                "{} = [{} + {offset}]",
                register_name(*dst),
                register_name(*base)
            ),
            StoreN { base, offset, src } => format!(
                "[{} + {offset}] = {}",
                register_name(*base),
                register_name(*src)
            ),
            PushR { src } => format!("push {}", register_name(*src)),
            PopR { dst } => format!("pop into {}", register_name(*dst)),
            CallN { callee, .. } => format!("call {callee}"),
            Read { dst } => format!("{} = read()", register_name(*dst)),
            Write { src } => format!("write({})", register_name(*src)),
            Halt => "stop execution".to_string(),
        }
    }
}

/// A Marvin instruction together with the absolute PC assigned by linking.
#[derive(Clone, Debug)]
pub struct PlacedInsn {
    pub pc: u32,
    pub insn: Instruction,
}

impl std::fmt::Display for PlacedInsn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use Instruction::*;
        let mnemonic_and_operands = match &self.insn {
            Arith { op, dst, lhs, rhs } => format!(
                "{op} {}, {}, {}",
                register_name(*dst),
                register_name(*lhs),
                register_name(*rhs)
            ),
            Copy { dst, src } => format!("copy {}, {}", register_name(*dst), register_name(*src)),
            SetN { dst, imm } => format!("setn {}, {imm}", register_name(*dst)),
            Set0 { dst } => format!("set0 {}", register_name(*dst)),
            Set1 { dst } => format!("set1 {}", register_name(*dst)),
            AddN { dst, imm } => format!("addn {}, {imm}", register_name(*dst)),
            JumpR { target } => format!("jumpr {}", register_name(*target)),
            JumpN { target } => format!("jumpn {target}"),
            CondJumpN {
                cond,
                lhs,
                rhs,
                target,
            } => format!(
                "j{cond}n {}, {}, {target}",
                register_name(*lhs),
                register_name(*rhs)
            ),
            LoadN { dst, base, offset } => format!(
                "loadn {}, {}, {offset}",
                register_name(*dst),
                register_name(*base)
            ),
            StoreN { base, offset, src } => format!(
                "storen {}, {offset}, {}",
                register_name(*base),
                register_name(*src)
            ),
            PushR { src } => format!("pushr {}", register_name(*src)),
            PopR { dst } => format!("popr {}", register_name(*dst)),
            CallN { target, .. } => format!("calln {target}"),
            Read { dst } => format!("read {}", register_name(*dst)),
            Write { src } => format!("write {}", register_name(*src)),
            Halt => "halt".to_string(),
        };
        write!(
            f,
            "{:<6}{:<28}# {}",
            self.pc,
            mnemonic_and_operands,
            self.insn.comment()
        )
    }
}
