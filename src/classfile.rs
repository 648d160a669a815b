//! The class-file-like structure the back-end core consumes.
//!
//! This is deliberately the narrowest shape the core needs: an unordered
//! collection of method records, each a flat bytecode array plus the
//! metadata (name, descriptor, max-locals) the tuple decoder and CFG
//! builder read. The front end is the only producer; nothing downstream of
//! [`crate::front::bytecode::emit`] constructs one of these by hand except
//! tests.

use crate::common::{Descriptor, Id, MethodKey};

/// One JVM-bytecode-like instruction in a method's linear code array.
///
/// Branch targets are already resolved to absolute bytecode PCs by the
/// front-end emitter: there is no separate constant pool indirection for
/// jump offsets to resolve later.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Iconst0,
    Iconst1,
    /// `LDC` pushing an arbitrary pool constant.
    Ldc(i32),
    Iload(u16),
    Istore(u16),
    Dup,
    Pop,
    Ineg,
    Iadd,
    Isub,
    Imul,
    Idiv,
    Irem,
    Goto(u32),
    Ifeq(u32),
    Ifne(u32),
    IfIcmpeq(u32),
    IfIcmpne(u32),
    IfIcmplt(u32),
    IfIcmpge(u32),
    IfIcmpgt(u32),
    IfIcmple(u32),
    Invokestatic(MethodKey),
    Ireturn,
    Return,
}

impl Op {
    /// Number of bytes this opcode occupies in the linear bytecode array,
    /// including its own opcode byte. Branch and constant operands are
    /// encoded as a 2-byte big-endian field following the one-byte opcode,
    /// mirroring the JVM's own `u2` operand width for `goto`/`if*`/`ldc_w`.
    pub fn width(&self) -> u32 {
        match self {
            Op::Iconst0 | Op::Iconst1 | Op::Dup | Op::Pop | Op::Ineg | Op::Iadd | Op::Isub
            | Op::Imul | Op::Idiv | Op::Irem | Op::Ireturn | Op::Return => 1,
            Op::Ldc(_) | Op::Iload(_) | Op::Istore(_) => 3,
            Op::Goto(_)
            | Op::Ifeq(_)
            | Op::Ifne(_)
            | Op::IfIcmpeq(_)
            | Op::IfIcmpne(_)
            | Op::IfIcmplt(_)
            | Op::IfIcmpge(_)
            | Op::IfIcmpgt(_)
            | Op::IfIcmple(_) => 3,
            // Method reference is resolved to an index elsewhere; reserve
            // a fixed 3-byte encoding (opcode + u16 constant-pool index).
            Op::Invokestatic(_) => 3,
        }
    }
}

/// A single method's compiled-to-bytecode body.
#[derive(Clone, Debug)]
pub struct MethodRecord {
    pub name: Id,
    pub descriptor: Descriptor,
    pub max_locals: u16,
    /// Linear bytecode, one entry per instruction, in program order. The
    /// tuple decoder assigns PCs by summing `Op::width` over the prefix,
    /// exactly as a real JVM bytecode reader would walk the raw byte array.
    pub code: Vec<Op>,
}

impl MethodRecord {
    pub fn key(&self) -> MethodKey {
        MethodKey {
            name: self.name,
            descriptor: self.descriptor.clone(),
        }
    }
}

/// An unordered collection of methods, as consumed by the core.
#[derive(Clone, Debug, Default)]
pub struct ClassFile {
    pub methods: Vec<MethodRecord>,
}

impl ClassFile {
    /// Methods that the core actually compiles: everything except the two
    /// builtins, which are intrinsics the back end lowers directly instead
    /// of having bodies of their own.
    pub fn compiled_methods(&self) -> impl Iterator<Item = &MethodRecord> {
        self.methods.iter().filter(|m| !m.key().is_builtin())
    }
}
