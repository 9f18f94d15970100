use anyhow::Context;
use dbcc::{
    context::{CompilationContext, PtrSize},
    Args, Compiler, Emit,
};
use rustyline::Editor;
use std::{fs, path::Path};

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::new();
    let ptr_size = if args.ptr32 {
        PtrSize::Bits32
    } else {
        PtrSize::Bits64
    };
    let compiler = Compiler::with_context(CompilationContext::new(ptr_size));
    match &args.file_name {
        Some(file_name) => run_file(&compiler, file_name, args.emit),
        None => run_prompt(&compiler, args.emit),
    }
}

fn run_file(compiler: &Compiler, file_name: &Path, emit: Emit) -> anyhow::Result<()> {
    let source = fs::read_to_string(file_name)
        .with_context(|| format!("could not read {}", file_name.display()))?;
    let name = file_name.display().to_string();
    if !compile(compiler, &name, &source, emit) {
        anyhow::bail!("compilation of {} failed", name);
    }
    Ok(())
}

fn run_prompt(compiler: &Compiler, emit: Emit) -> anyhow::Result<()> {
    let mut editor = Editor::<()>::new();
    while let Ok(line) = editor.readline("$ ") {
        editor.add_history_entry(line.as_str());
        compile(compiler, "<stdin>", &line, emit);
    }
    Ok(())
}

/// Prints the requested output; diagnostics have already been echoed.
fn compile(compiler: &Compiler, name: &str, source: &str, emit: Emit) -> bool {
    match emit {
        Emit::Tokens => match compiler.tokens(name, source) {
            Ok(tokens) => {
                for t in tokens {
                    println!("{:?} {}", t.kind, t.symbol);
                }
                true
            }
            Err(()) => false,
        },
        Emit::Ast => match compiler.parse(name, source) {
            Ok(ast) => {
                print!("{}", ast);
                true
            }
            Err(()) => false,
        },
        Emit::Ir => match compiler.compile_unit(name, source).module {
            Ok(module) => {
                print!("{}", module);
                true
            }
            Err(()) => false,
        },
    }
}
