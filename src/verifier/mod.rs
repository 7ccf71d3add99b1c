//! The verifier resolves every name and type of a program, then proves each
//! function body free of out-of-bounds accesses and integer overflow.
//!
//! Resolution happens in [`symbols`]. Bodies are then checked one at a time by
//! a [`Checker`], which threads a [`Facts`](facts::Facts) snapshot through
//! the statements in program order: expressions are typed and bounded in
//! `expr`, conditions are decided and assumed in `prove`, and control flow
//! is followed in `stmt`.

use rayon::prelude::*;

use crate::{
    ast::{Clause, Decl, File, Func, Typed, Untyped},
    error::{CheckError, CheckErrorKind},
    interval::Interval,
    source::SourceFile,
    token::Span,
    util::{
        fmt::{Context, Show},
        intern::{Id, TokenMap},
    },
};

mod expr;
mod facts;
mod prove;
mod scope;
mod stmt;
mod symbols;

#[cfg(test)]
mod tests;

pub use symbols::{ConstSymbol, FuncKey, FuncSymbol, StructSymbol, SymbolTable};

use scope::Scope;
use stmt::LoopFrame;

/// Every value of `s.len()`.
const ANY_LEN: Interval = Interval::new(0, u64::MAX as i128);

#[derive(Clone, Debug)]
pub struct VerifyOptions {
    /// Verify function bodies on the rayon pool.
    pub parallel: bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        VerifyOptions { parallel: true }
    }
}

/// A program every function of which has been proven safe. Files are in
/// canonical order (by name), each expression annotated with its type.
#[derive(Debug)]
pub struct VerifiedProgram {
    pub files: Vec<File<Typed>>,
    pub symbols: SymbolTable,
}

pub fn verify(tm: &TokenMap, files: Vec<File<Untyped>>) -> Result<VerifiedProgram, CheckError> {
    verify_with(tm, files, &VerifyOptions::default())
}

#[tracing::instrument(
    level = "debug",
    skip_all,
    fields(files = files.len(), parallel = options.parallel),
)]
pub fn verify_with(
    tm: &TokenMap,
    mut files: Vec<File<Untyped>>,
    options: &VerifyOptions,
) -> Result<VerifiedProgram, CheckError> {
    files.sort_by(|a, b| a.source.name().cmp(b.source.name()));
    let symbols = symbols::build(tm, &files)?;

    let jobs: Vec<(&SourceFile, &Func<Untyped>)> = files
        .iter()
        .flat_map(|file| {
            file.decls.iter().filter_map(move |decl| match decl {
                Decl::Func(func) => Some((&file.source, func)),
                _ => None,
            })
        })
        .collect();
    tracing::debug!(functions = jobs.len(), "verifying bodies");

    let check = |&(source, func): &(&SourceFile, &Func<Untyped>)| {
        Checker::new(tm, &symbols, source).func(func)
    };
    // Collected in job order either way, so the first error is deterministic.
    let results: Vec<Result<Func<Typed>, CheckError>> = if options.parallel {
        jobs.par_iter().map(check).collect()
    } else {
        jobs.iter().map(check).collect()
    };

    let mut bodies = results.into_iter();
    let mut typed = Vec::with_capacity(files.len());
    for file in &files {
        let checker = Checker::new(tm, &symbols, &file.source);
        let mut decls = Vec::with_capacity(file.decls.len());
        for decl in &file.decls {
            decls.push(match decl {
                Decl::Const(c) => Decl::Const(checker.constant(c)?),
                Decl::Struct(s) => Decl::Struct(s.clone()),
                Decl::Func(_) => match bodies.next() {
                    Some(body) => Decl::Func(body?),
                    None => unreachable!("one verified body per function"),
                },
            });
        }
        typed.push(File {
            source: file.source.clone(),
            decls,
        });
    }

    Ok(VerifiedProgram {
        files: typed,
        symbols,
    })
}

/// What an expression is checked for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Mode {
    /// Executed code: overflow, bounds and divisor obligations.
    Exec,
    /// Clause conditions. Arithmetic is mathematical and never overflows,
    /// but bounds and divisors are still checked.
    Proof,
    /// Types only. Used for clauses while signatures are resolved.
    TypeOnly,
}

/// Checks one function body, or the clauses and constants of a file, against
/// the frozen symbol table.
struct Checker<'a> {
    tm: &'a TokenMap,
    symbols: &'a SymbolTable,
    source: &'a SourceFile,
    scope: Scope,
    loops: Vec<LoopFrame>,
    /// Postconditions of the function being checked, proven at every exit.
    posts: &'a [Clause<Untyped>],
}

impl<'a> Checker<'a> {
    fn new(tm: &'a TokenMap, symbols: &'a SymbolTable, source: &'a SourceFile) -> Checker<'a> {
        Checker {
            tm,
            symbols,
            source,
            scope: Scope::default(),
            loops: Vec::new(),
            posts: &[],
        }
    }

    fn error(&self, span: Span, kind: CheckErrorKind) -> CheckError {
        CheckError {
            location: self.source.locate(span.lo),
            kind,
        }
    }

    fn show(&self, value: &impl Show) -> String {
        value.display(&Context { tm: self.tm }).to_string()
    }

    fn name(&self, id: Id) -> String {
        self.tm.get(id).to_string()
    }
}
