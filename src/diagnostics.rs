//! The two-tier error model from the spec: user diagnostics are collected
//! and only turned into a terminating failure at an explicit drain step;
//! internal invariant violations are always immediately fatal.

use crate::span::FileSpan;

/// One user-facing error: undeclared variable, type mismatch, arity
/// mismatch, etc. Printed with the offending source text, never fatal on
/// its own.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub span: FileSpan,
    pub message: String,
}

impl Diagnostic {
    #[must_use] pub fn new(span: FileSpan, message: impl Into<String>) -> Self {
        Self { span, message: message.into() }
    }

    /// Render as `file:line:col: message\n    <offending text>`.
    #[must_use] pub fn render(&self, source: &str) -> String {
        let (line, col) = self.span.line_col(source);
        let text = self.span.text(source);
        format!("{}:{}:{}: {}\n    {}", self.span.file, line, col, self.message, text)
    }
}

/// Accumulates diagnostics during a single pass (the type checker, and the
/// symbol builder before it), then turns them into a terminating failure on
/// `die`.
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Vec<Diagnostic>,
}

impl Diagnostics {
    #[must_use] pub fn new() -> Self { Self::default() }

    pub fn error(&mut self, span: FileSpan, message: impl Into<String>) {
        self.errors.push(Diagnostic::new(span, message));
    }

    #[must_use] pub fn has_errors(&self) -> bool { !self.errors.is_empty() }

    #[must_use] pub fn errors(&self) -> &[Diagnostic] { &self.errors }

    /// Consume the accumulated errors, failing if any were recorded.
    pub fn die(self) -> Result<(), Vec<Diagnostic>> {
        if self.errors.is_empty() { Ok(()) } else { Err(self.errors) }
    }
}

/// The top-level error this crate's public API can fail with.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Parse(#[from] crate::parser::ParseFront),
    /// A symbol-builder failure (duplicate name, unknown superclass,
    /// cyclic inheritance, unknown type, invalid override). Unlike
    /// `Type`, these abort the pass on the first one found rather than
    /// accumulating — the symbol table they'd leave behind isn't
    /// consistent enough for the rest of the pipeline to run against.
    #[error(transparent)]
    Symbol(#[from] crate::symtab::SymbolError),
    #[error("{} error(s) found", .0.len())]
    Type(Vec<Diagnostic>),
    /// A compiler bug: an invariant the type checker or lowering stage
    /// should have upheld was violated. Never triggered by any well- or
    /// ill-typed user program; a nonzero exit with this variant means the
    /// compiler itself is wrong.
    #[error("internal compiler error: {0}")]
    Internal(String),
}

impl CompileError {
    /// Render every diagnostic against `source`, for CLI reporting.
    #[must_use] pub fn render(&self, source: &str) -> String {
        match self {
            CompileError::Parse(e) => e.to_string(),
            CompileError::Symbol(e) => e.to_string(),
            CompileError::Type(diags) => {
                diags.iter().map(|d| d.render(source)).collect::<Vec<_>>().join("\n")
            }
            CompileError::Internal(msg) => format!("internal compiler error: {msg}"),
        }
    }
}
