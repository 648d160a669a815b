//! The front-end of the compiler: an external collaborator to the back-end
//! core. Its only job is to turn `.iota` source text into a well-formed
//! [`crate::classfile::ClassFile`] for the core to consume.

pub mod ast;
pub mod bytecode;
pub mod lex;
pub mod parse;
pub mod sema;

pub use ast::Program;
pub use parse::parse;

use crate::classfile::ClassFile;
use crate::diagnostics::CompileError;

/// Parse, check, and lower `source` all the way to a [`ClassFile`].
pub fn compile_to_classfile(source: &str) -> Result<ClassFile, CompileError> {
    let program = parse(source)?;
    sema::check(&program)?;
    bytecode::emit(&program)
}
