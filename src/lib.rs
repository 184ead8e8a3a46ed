//! Compiler for GameMaker Language code fragments.
//!
//! A fragment goes through `reader -> lexer -> parser -> resolver ->
//! compiler -> assembler`, and the result is either an [`Assembly`] or
//! exactly one [`Diagnostic`].

pub mod analysis;
pub mod assembler;
pub mod ast;
pub mod bytecode;
pub mod compiler;
pub mod config;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod lexer;
pub mod parser;
pub mod reader;
pub mod resolver;
pub mod token;
pub mod types;

#[cfg(test)]
mod vm;

use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

pub use assembler::Assembly;
pub use bytecode::ByteCode;
pub use context::ResolutionContext;
pub use error::{CompilerError, Diagnostic, Stage};

use crate::parser::Parser;
use crate::token::Position;

/// One independent code fragment, such as a script or an object event.
#[derive(Debug, Clone)]
pub struct CompileUnit {
    pub name: String,
    pub source: String,
}

impl CompileUnit {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    pub fn compile(&self, context: &ResolutionContext) -> Result<Assembly, Diagnostic> {
        compile(&self.source, context)
    }

    pub fn compile_to_bytecode(&self, context: &ResolutionContext) -> Result<ByteCode, Diagnostic> {
        compile_to_bytecode(&self.source, context)
    }
}

/// Runs every stage up to, but not including, the assembler.
pub fn compile_to_bytecode(
    source: &str,
    context: &ResolutionContext,
) -> Result<ByteCode, Diagnostic> {
    let tokens = lexer::tokenize(source, context.version_tier)?;
    let script = Parser::new(tokens).parse()?;
    let script = resolver::resolve(script, context)?;
    compiler::generate(&script)
}

pub fn compile(source: &str, context: &ResolutionContext) -> Result<Assembly, Diagnostic> {
    let bytecode = compile_to_bytecode(source, context)?;
    assembler::assemble(&bytecode, &context.encoding)
}

/// Compiles every unit on a pool of worker threads. Results come back in
/// input order.
pub fn compile_batch(
    units: &[CompileUnit],
    context: &ResolutionContext,
) -> Vec<Result<Assembly, Diagnostic>> {
    run_batch(units, |unit| unit.compile(context))
}

/// Like [`compile_batch`], but stops before the assembler.
pub fn compile_batch_to_bytecode(
    units: &[CompileUnit],
    context: &ResolutionContext,
) -> Vec<Result<ByteCode, Diagnostic>> {
    run_batch(units, |unit| unit.compile_to_bytecode(context))
}

/// Workers pull unit indices from a shared counter. A panic while compiling
/// one unit becomes that unit's diagnostic.
fn run_batch<T, F>(units: &[CompileUnit], work: F) -> Vec<Result<T, Diagnostic>>
where
    T: Send,
    F: Fn(&CompileUnit) -> Result<T, Diagnostic> + Sync,
{
    let workers = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
        .min(units.len());
    let next = AtomicUsize::new(0);
    let mut slots: Vec<Option<Result<T, Diagnostic>>> = units.iter().map(|_| None).collect();

    thread::scope(|scope| {
        let (next, work) = (&next, &work);
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(move || {
                    let mut finished = Vec::new();
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(unit) = units.get(index) else {
                            break;
                        };
                        let result = panic::catch_unwind(AssertUnwindSafe(|| work(unit)))
                            .unwrap_or_else(|_| Err(panicked(unit)));
                        finished.push((index, result));
                    }
                    finished
                })
            })
            .collect();

        for handle in handles {
            if let Ok(finished) = handle.join() {
                for (index, result) in finished {
                    slots[index] = Some(result);
                }
            }
        }
    });

    slots
        .into_iter()
        .zip(units)
        .map(|(slot, unit)| slot.unwrap_or_else(|| Err(panicked(unit))))
        .collect()
}

fn panicked(unit: &CompileUnit) -> Diagnostic {
    Diagnostic::codegen(
        format!("compiler panicked while compiling {}", unit.name),
        Position::default(),
    )
}
