//! The core pipeline: everything from tuple decoding through Marvin
//! instruction selection and linking. Operates purely on
//! [`crate::classfile::ClassFile`] input; knows nothing about `iota` syntax.

pub mod cfg;
pub mod dump;
pub mod frame;
pub mod hir;
pub mod ids;
pub mod liveness;
pub mod lir;
pub mod regalloc;
pub mod select;
pub mod tuple;

use crate::classfile::ClassFile;
use crate::common::Map;
use crate::diagnostics::Result;
use crate::marvin::PlacedInsn;

/// Which register allocator a compile run uses, selected by `-g`/`--graph-alloc`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum AllocatorStrategy {
    #[default]
    Circular,
    Graph,
}

/// Every intermediate artifact produced for one method, kept around only so
/// [`-v`/`--verbose`](dump) can render them; nothing downstream reads this
/// struct back in.
pub struct MethodDumps {
    pub method: crate::common::MethodKey,
    pub tuples: String,
    pub cfg: String,
    pub hir: String,
    pub lir: String,
    pub liveness: String,
}

/// Run every stage, from a method's decoded bytecode down to a fully
/// register-selected [`select::SelectedFunction`]. Per-method identifier
/// counters (`hirId`, `lirId`, `regId`) all start fresh here: nothing about
/// one method's compilation leaks into another's.
fn compile_method(
    record: &crate::classfile::MethodRecord,
    strategy: AllocatorStrategy,
) -> Result<select::SelectedFunction> {
    let key = record.key();
    tracing::debug!(method = %key, "compiling method");
    let cfg_graph = cfg::ControlFlowGraph::build(key, record.max_locals, &record.code);
    let param_types: Vec<crate::common::Type> = record.descriptor.params.clone();
    let hir = hir::build(&cfg_graph, &param_types)?;
    let lir = lir::lower(&hir);
    let info = liveness::analyze(&lir);
    let (allocated, used_registers) = match strategy {
        AllocatorStrategy::Circular => regalloc::allocate(&lir, &info),
        AllocatorStrategy::Graph => regalloc::graph_color(&lir, &info),
    };
    Ok(select::select(&allocated, param_types.len(), used_registers))
}

/// Dump every intermediate stage for one method without discarding any of
/// them, for `-v`/`--verbose`. Kept as a separate entry point from
/// [`compile_method`] so the common (non-verbose) path never pays for
/// building strings it will throw away.
pub fn compile_method_verbose(
    record: &crate::classfile::MethodRecord,
    strategy: AllocatorStrategy,
) -> Result<(select::SelectedFunction, MethodDumps)> {
    let key = record.key();
    tracing::debug!(method = %key, "compiling method (verbose)");
    let tuples = tuple::decode(&record.code);
    let cfg_graph = cfg::ControlFlowGraph::build(key.clone(), record.max_locals, &record.code);
    let param_types: Vec<crate::common::Type> = record.descriptor.params.clone();
    let hir = hir::build(&cfg_graph, &param_types)?;
    let lir = lir::lower(&hir);
    let info = liveness::analyze(&lir);
    let (allocated, used_registers) = match strategy {
        AllocatorStrategy::Circular => regalloc::allocate(&lir, &info),
        AllocatorStrategy::Graph => regalloc::graph_color(&lir, &info),
    };
    let selected = select::select(&allocated, param_types.len(), used_registers);

    let dumps = MethodDumps {
        method: key,
        tuples: dump::dump_tuples(&record.name.to_string(), &tuples),
        cfg: dump::dump_cfg(&cfg_graph),
        hir: dump::dump_hir(&hir),
        lir: dump::dump_lir(&lir),
        liveness: dump::dump_liveness(&lir, &info),
    };
    Ok((selected, dumps))
}

/// Compile every non-builtin method in `classfile` and link the result into
/// one flat, fully-resolved Marvin program.
///
/// When `verbose` is set, every stage's textual dump is also returned in
/// method-declaration order for the caller to print.
pub fn compile_program(
    classfile: &ClassFile,
    strategy: AllocatorStrategy,
    verbose: bool,
) -> Result<(
    Vec<PlacedInsn>,
    Map<crate::common::MethodKey, select::SelectedFunction>,
    Vec<MethodDumps>,
)> {
    let mut selected: Map<crate::common::MethodKey, select::SelectedFunction> = Map::new();
    let mut dumps = Vec::new();

    for record in classfile.compiled_methods() {
        tracing::trace!(method = %record.key(), blocks = ?record.code.len(), "starting pipeline for method");
        if verbose {
            let (func, method_dumps) = compile_method_verbose(record, strategy)?;
            dumps.push(method_dumps);
            selected.insert(record.key(), func);
        } else {
            let func = compile_method(record, strategy)?;
            selected.insert(record.key(), func);
        }
    }

    let program = frame::link_program(classfile, &selected)?;
    Ok((program, selected, dumps))
}
