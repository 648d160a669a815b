//! the main compiler binary. takes an `.iota` source file and emits a
//! linked `.marv` assembly listing next to it (or under `--out-dir`).
//!
//! run with `--help` for more info.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use iotac::core::{self, AllocatorStrategy};
use iotac::diagnostics::CompileError;
use iotac::front;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// the `.iota` source file to compile
    file: PathBuf,

    /// use the graph-coloring register allocator instead of the circular one
    #[arg(short = 'g', long = "graph-alloc", default_value_t = false)]
    graph_alloc: bool,

    /// directory to write the `.marv` output file into
    #[arg(short = 'd', long = "out-dir", default_value = ".")]
    out_dir: PathBuf,

    /// dump tuples, CFG, HIR, LIR, and liveness intervals for each method as it compiles
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn run(args: &Args) -> Result<(), CompileError> {
    let source = std::fs::read_to_string(&args.file).map_err(|source| CompileError::Io {
        path: args.file.display().to_string(),
        source,
    })?;

    let classfile = front::compile_to_classfile(&source)?;

    if args.graph_alloc {
        // `core::regalloc::graph_color` is unimplemented: reject here rather
        // than let it panic mid-compile.
        return Err(CompileError::Semantic(
            "the graph-coloring allocator (-g/--graph-alloc) is not implemented; omit the flag to use the circular allocator".to_string(),
        ));
    }
    let strategy = AllocatorStrategy::Circular;

    let (_program, selected, dumps) = core::compile_program(&classfile, strategy, args.verbose)?;
    if args.verbose {
        for dump in &dumps {
            println!("=== {} ===", dump.method);
            println!("{}", dump.tuples);
            println!("{}", dump.cfg);
            println!("{}", dump.hir);
            println!("{}", dump.lir);
            println!("{}", dump.liveness);
        }
    }

    let rendered = core::frame::render_marv(&classfile, &selected)?;

    let stem = args
        .file
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "out".to_string());
    let out_path = args.out_dir.join(format!("{stem}.marv"));

    std::fs::write(&out_path, rendered).map_err(|source| CompileError::Io {
        path: out_path.display().to_string(),
        source,
    })?;

    tracing::info!(path = %out_path.display(), "wrote Marvin program");
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    if let Err(err) = run(&args) {
        eprintln!("iotac: {err}");
        std::process::exit(1);
    }
}
