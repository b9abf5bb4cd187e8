//! The parse tree MiniJava source is lowered into. This is the "parse-tree
//! interface" spec.md's core stages consume: one node type per grammar
//! alternative, each carrying the span it was parsed from so diagnostics can
//! quote the offending source text.

use crate::span::{FileSpan, Spanned};
use crate::symbol::Symbol;

/// A whole MiniJava source file: exactly one main class, then zero or more
/// auxiliary classes.
#[derive(Debug)]
pub struct Program {
    pub main: MainClass,
    pub classes: Vec<ClassDecl>,
}

/// `class M { public static void main(String[] a) { <body> } }`
#[derive(Debug)]
pub struct MainClass {
    pub name: Spanned<Symbol>,
    pub arg_name: Symbol,
    pub body: Statement,
}

/// An auxiliary class declaration, with an optional `extends` clause.
#[derive(Debug)]
pub struct ClassDecl {
    pub name: Spanned<Symbol>,
    pub superclass: Option<Spanned<Symbol>>,
    pub fields: Vec<VarDecl>,
    pub methods: Vec<MethodDecl>,
}

/// A field, parameter, or local variable declaration: `Type name`.
#[derive(Debug)]
pub struct VarDecl {
    pub name: Spanned<Symbol>,
    pub ty: TypeNode,
}

/// A method declaration: `public Type name(Type p1, ...) { locals...
/// statements... return e; }`
#[derive(Debug)]
pub struct MethodDecl {
    pub name: Spanned<Symbol>,
    pub params: Vec<VarDecl>,
    pub locals: Vec<VarDecl>,
    pub body: Vec<Statement>,
    pub ret_expr: Expr,
    pub ret_ty: TypeNode,
    pub span: FileSpan,
}

/// A type-denoting parse node: resolved by the Type Extractor
/// (`crate::symtab`) into a `Kind`.
#[derive(Debug)]
pub enum TypeNode {
    Int,
    Boolean,
    IntArray,
    /// A bare identifier; resolved to a class, or an error if unknown.
    ClassName(Spanned<Symbol>),
}

#[derive(Debug)]
pub enum Statement {
    Block(Vec<Statement>),
    If { cond: Expr, then_branch: Box<Statement>, else_branch: Box<Statement> },
    While { cond: Expr, body: Box<Statement> },
    DoWhile { body: Box<Statement>, cond: Expr },
    Println(Expr),
    Assign { name: Spanned<Symbol>, value: Expr },
    ArrayAssign { name: Spanned<Symbol>, index: Expr, value: Expr },
}

#[derive(Debug)]
pub enum ExprKind {
    IntLit(i32),
    True,
    False,
    This,
    Identifier(Symbol),
    NewIntArray(Box<Expr>),
    NewObject(Spanned<Symbol>),
    Not(Box<Expr>),
    Length(Box<Expr>),
    Index { array: Box<Expr>, index: Box<Expr> },
    And(Box<Expr>, Box<Expr>),
    Lt(Box<Expr>, Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Call { receiver: Box<Expr>, method: Spanned<Symbol>, args: Vec<Expr> },
}

/// An expression node with its source span.
#[derive(Debug)]
pub struct Expr {
    pub span: FileSpan,
    pub kind: ExprKind,
}

impl Expr {
    #[must_use] pub fn new(span: FileSpan, kind: ExprKind) -> Self { Self { span, kind } }
}
