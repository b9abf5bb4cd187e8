//! Stage 2: the type checker. A single explicit recursive-descent walk
//! assigns a `Type` to every expression and checks every statement,
//! producing a typed tree (`TExpr`/`TStmt`) the lowering stage consumes.
//!
//! The source material frames this as a bottom-up walk over an operand
//! stack of `Type`s, with a null sentinel delimiting a call's argument
//! group. This implementation takes the alternative the spec's own design
//! notes call out as preferred: each recursive call already has its
//! sub-results as ordinary Rust values, so there is no stack, and no
//! sentinel is needed to tell "no value yet" from "start of a call". The
//! "operand stack empty at method exit" invariant becomes, structurally,
//! "`check_expr` returns exactly one `Type`" — there is nothing else it
//! could do.

use crate::ast::{self, ExprKind, Program, Statement};
use crate::diagnostics::Diagnostics;
use crate::span::Spanned;
use crate::symbol::Symbol;
use crate::symtab::SymbolTable;
use crate::types::class::{ClassId, Classes, MethodId};
use crate::types::idx::Idx;
use crate::types::Kind;

/// Where an identifier use resolved to: a method-local (parameter or local
/// variable) or an inherited-or-own field.
#[derive(Clone, Copy, Debug)]
pub enum VarRef {
    Local(Symbol),
    Field(Symbol),
}

#[derive(Debug)]
pub struct TExpr {
    pub ty: Kind,
    pub kind: TExprKind,
}

#[derive(Debug)]
pub enum TExprKind {
    IntLit(i32),
    True,
    False,
    This,
    Var(VarRef),
    NewIntArray(Box<TExpr>),
    NewObject(ClassId),
    Not(Box<TExpr>),
    Length(Box<TExpr>),
    Index { array: Box<TExpr>, index: Box<TExpr> },
    And(Box<TExpr>, Box<TExpr>),
    Lt(Box<TExpr>, Box<TExpr>),
    Add(Box<TExpr>, Box<TExpr>),
    Sub(Box<TExpr>, Box<TExpr>),
    Mul(Box<TExpr>, Box<TExpr>),
    Call { receiver: Box<TExpr>, owner: ClassId, method: MethodId, args: Vec<TExpr> },
}

#[derive(Debug)]
pub enum TStmt {
    Block(Vec<TStmt>),
    If { cond: TExpr, then_branch: Box<TStmt>, else_branch: Box<TStmt> },
    While { cond: TExpr, body: Box<TStmt> },
    DoWhile { body: Box<TStmt>, cond: TExpr },
    Println(TExpr),
    Assign { var: VarRef, value: TExpr },
    ArrayAssign { var: VarRef, index: TExpr, value: TExpr },
}

pub struct TypedMethod {
    pub owner: ClassId,
    pub id: MethodId,
    pub body: Vec<TStmt>,
    pub ret_expr: TExpr,
}

pub struct TypedProgram {
    pub main_body: TStmt,
    pub methods: Vec<TypedMethod>,
}

/// Scope in effect while checking one method (or the main class's
/// synthetic `main`, which has no parameters or locals): its owning class,
/// its parameters, and its locals.
struct Scope<'a> {
    classes: &'a Classes,
    object_id: ClassId,
    diags: &'a mut Diagnostics,
    class: ClassId,
    method: Option<&'a ast::MethodDecl>,
}

impl Scope<'_> {
    fn resolve_var(&mut self, name: Symbol, span: &crate::span::FileSpan) -> (VarRef, Kind) {
        if let Some(m) = self.method {
            for p in &m.params {
                if p.name.k == name {
                    return (VarRef::Local(name), extract_checked(&p.ty, self.classes));
                }
            }
            for l in &m.locals {
                if l.name.k == name {
                    return (VarRef::Local(name), extract_checked(&l.ty, self.classes));
                }
            }
        }
        if let Some(ty) = self.classes.has_any_var(self.class, name) {
            return (VarRef::Field(name), ty);
        }
        self.diags.error(span.clone(), format!("undeclared identifier `{name}`"));
        (VarRef::Field(name), Kind::Object(self.object_id))
    }

    fn check_expr(&mut self, e: &ast::Expr) -> TExpr {
        match &e.kind {
            ExprKind::IntLit(n) => TExpr { ty: Kind::Int, kind: TExprKind::IntLit(*n) },
            ExprKind::True => TExpr { ty: Kind::Boolean, kind: TExprKind::True },
            ExprKind::False => TExpr { ty: Kind::Boolean, kind: TExprKind::False },
            ExprKind::This => TExpr { ty: Kind::Object(self.class), kind: TExprKind::This },
            ExprKind::Identifier(name) => {
                let (var, ty) = self.resolve_var(*name, &e.span);
                TExpr { ty, kind: TExprKind::Var(var) }
            }
            ExprKind::NewIntArray(n) => {
                let tn = self.check_expr(n);
                if tn.ty != Kind::Int {
                    self.diags.error(n.span.clone(), "array size must be an int");
                }
                TExpr { ty: Kind::IntArray, kind: TExprKind::NewIntArray(Box::new(tn)) }
            }
            ExprKind::NewObject(name) => {
                let class = self.classes.get(name.k).unwrap_or_else(|| {
                    self.diags.error(name.span.clone(), format!("unknown class `{}`", name.k));
                    self.object_id
                });
                TExpr { ty: Kind::Object(class), kind: TExprKind::NewObject(class) }
            }
            ExprKind::Not(inner) => {
                let t = self.check_expr(inner);
                if t.ty != Kind::Boolean {
                    self.diags.error(inner.span.clone(), "operand of `!` must be boolean");
                }
                TExpr { ty: Kind::Boolean, kind: TExprKind::Not(Box::new(t)) }
            }
            ExprKind::Length(inner) => {
                let t = self.check_expr(inner);
                if t.ty != Kind::IntArray {
                    self.diags.error(inner.span.clone(), "`.length` requires an int array");
                }
                TExpr { ty: Kind::Int, kind: TExprKind::Length(Box::new(t)) }
            }
            ExprKind::Index { array, index } => {
                let ta = self.check_expr(array);
                let ti = self.check_expr(index);
                if ta.ty != Kind::IntArray {
                    self.diags.error(array.span.clone(), "index target must be an int array");
                }
                if ti.ty != Kind::Int {
                    self.diags.error(index.span.clone(), "array index must be an int");
                }
                TExpr { ty: Kind::Int, kind: TExprKind::Index { array: Box::new(ta), index: Box::new(ti) } }
            }
            ExprKind::And(a, b) => {
                let ta = self.check_expr(a);
                let tb = self.check_expr(b);
                if ta.ty != Kind::Boolean { self.diags.error(a.span.clone(), "operand of `&&` must be boolean"); }
                if tb.ty != Kind::Boolean { self.diags.error(b.span.clone(), "operand of `&&` must be boolean"); }
                TExpr { ty: Kind::Boolean, kind: TExprKind::And(Box::new(ta), Box::new(tb)) }
            }
            ExprKind::Lt(a, b) => {
                let ta = self.check_expr(a);
                let tb = self.check_expr(b);
                if ta.ty != Kind::Int { self.diags.error(a.span.clone(), "operand of `<` must be int"); }
                if tb.ty != Kind::Int { self.diags.error(b.span.clone(), "operand of `<` must be int"); }
                TExpr { ty: Kind::Boolean, kind: TExprKind::Lt(Box::new(ta), Box::new(tb)) }
            }
            ExprKind::Add(a, b) => self.check_arith(a, b, TExprKind::Add as fn(Box<TExpr>, Box<TExpr>) -> TExprKind),
            ExprKind::Sub(a, b) => self.check_arith(a, b, TExprKind::Sub as fn(Box<TExpr>, Box<TExpr>) -> TExprKind),
            ExprKind::Mul(a, b) => self.check_arith(a, b, TExprKind::Mul as fn(Box<TExpr>, Box<TExpr>) -> TExprKind),
            ExprKind::Call { receiver, method, args } => self.check_call(e, receiver, method, args),
        }
    }

    fn check_arith(
        &mut self,
        a: &ast::Expr,
        b: &ast::Expr,
        make: fn(Box<TExpr>, Box<TExpr>) -> TExprKind,
    ) -> TExpr {
        let ta = self.check_expr(a);
        let tb = self.check_expr(b);
        if ta.ty != Kind::Int { self.diags.error(a.span.clone(), "arithmetic operand must be int"); }
        if tb.ty != Kind::Int { self.diags.error(b.span.clone(), "arithmetic operand must be int"); }
        TExpr { ty: Kind::Int, kind: make(Box::new(ta), Box::new(tb)) }
    }

    fn check_call(&mut self, node: &ast::Expr, receiver: &ast::Expr, method: &Spanned<Symbol>, args: &[ast::Expr]) -> TExpr {
        let trecv = self.check_expr(receiver);
        let targs: Vec<TExpr> = args.iter().map(|a| self.check_expr(a)).collect();

        let Kind::Object(recv_class) = trecv.ty else {
            self.diags.error(receiver.span.clone(), "method call receiver must be an object");
            return TExpr {
                ty: Kind::Object(self.object_id),
                kind: TExprKind::Call { receiver: Box::new(trecv), owner: self.object_id, method: MethodId::from_usize(0), args: targs },
            };
        };

        let Some((owner, mid)) = self.classes.get_any_method(recv_class, method.k) else {
            self.diags.error(method.span.clone(), format!("unknown method `{}`", method.k));
            return TExpr {
                ty: Kind::Object(self.object_id),
                kind: TExprKind::Call { receiver: Box::new(trecv), owner: recv_class, method: MethodId::from_usize(0), args: targs },
            };
        };

        // The typed tree records `owner`/`mid` directly on this call node
        // (`TExprKind::Call`) rather than through a side table keyed by the
        // untyped AST node: the recursive-descent checker already has the
        // resolved receiver class as a local value here, with no separate
        // walk ever needing to look it back up by node identity.
        let m = self.classes.method(owner, mid);
        if m.params.len() != targs.len() {
            self.diags.error(
                node.span.clone(),
                format!("method `{}` expects {} argument(s), found {}", method.k, m.params.len(), targs.len()),
            );
        } else {
            for (i, (_, pty)) in m.params.iter().enumerate() {
                if !pty.compatible_with(targs[i].ty, self.classes) {
                    self.diags.error(
                        args[i].span.clone(),
                        format!("argument {} to `{}` has the wrong type", i + 1, method.k),
                    );
                }
            }
        }
        let ret = m.ret;
        TExpr { ty: ret, kind: TExprKind::Call { receiver: Box::new(trecv), owner, method: mid, args: targs } }
    }

    fn check_stmt(&mut self, s: &Statement) -> TStmt {
        match s {
            Statement::Block(stmts) => TStmt::Block(stmts.iter().map(|s| self.check_stmt(s)).collect()),
            Statement::If { cond, then_branch, else_branch } => {
                let c = self.check_expr(cond);
                if c.ty != Kind::Boolean { self.diags.error(cond.span.clone(), "`if` condition must be boolean"); }
                TStmt::If {
                    cond: c,
                    then_branch: Box::new(self.check_stmt(then_branch)),
                    else_branch: Box::new(self.check_stmt(else_branch)),
                }
            }
            Statement::While { cond, body } => {
                let c = self.check_expr(cond);
                if c.ty != Kind::Boolean { self.diags.error(cond.span.clone(), "`while` condition must be boolean"); }
                TStmt::While { cond: c, body: Box::new(self.check_stmt(body)) }
            }
            Statement::DoWhile { body, cond } => {
                let b = self.check_stmt(body);
                let c = self.check_expr(cond);
                if c.ty != Kind::Boolean { self.diags.error(cond.span.clone(), "`do/while` condition must be boolean"); }
                TStmt::DoWhile { body: Box::new(b), cond: c }
            }
            Statement::Println(e) => {
                let t = self.check_expr(e);
                if t.ty != Kind::Int { self.diags.error(e.span.clone(), "println argument must be an int"); }
                TStmt::Println(t)
            }
            Statement::Assign { name, value } => {
                let (var, declared) = self.resolve_var(name.k, &name.span);
                let v = self.check_expr(value);
                if !declared.compatible_with(v.ty, self.classes) {
                    self.diags.error(value.span.clone(), format!("cannot assign to `{}`: incompatible type", name.k));
                }
                TStmt::Assign { var, value: v }
            }
            Statement::ArrayAssign { name, index, value } => {
                let (var, declared) = self.resolve_var(name.k, &name.span);
                if declared != Kind::IntArray {
                    self.diags.error(name.span.clone(), format!("`{}` is not an int array", name.k));
                }
                let i = self.check_expr(index);
                if i.ty != Kind::Int { self.diags.error(index.span.clone(), "array index must be an int"); }
                let v = self.check_expr(value);
                if v.ty != Kind::Int { self.diags.error(value.span.clone(), "array element value must be an int"); }
                TStmt::ArrayAssign { var, index: i, value: v }
            }
        }
    }
}

fn extract_checked(ty: &ast::TypeNode, classes: &Classes) -> Kind {
    match ty {
        ast::TypeNode::Int => Kind::Int,
        ast::TypeNode::Boolean => Kind::Boolean,
        ast::TypeNode::IntArray => Kind::IntArray,
        // Unresolvable here only for a class name the symbol builder would
        // already have rejected; `build()` having returned `Ok` rules it out.
        ast::TypeNode::ClassName(n) => Kind::Object(classes.get(n.k).expect("symbol builder validated every type name")),
    }
}

/// Run the type checker over the whole program. Returns the typed tree,
/// which records every method call's resolved receiver class and method
/// directly on its `TExprKind::Call` node (spec §4.2 step 3's "record
/// receiver static type", realized on the typed tree rather than through a
/// side table keyed by untyped AST node identity — see DESIGN.md). Diagnostics
/// accumulate in `diags`; call `diags.die()` once checking is done for the
/// whole program to turn them into a terminating failure.
pub fn check(program: &Program, symtab: &mut SymbolTable, diags: &mut Diagnostics) -> TypedProgram {
    let (classes, object_id, main_id) = symtab.split_for_check();

    let main_body = {
        let mut scope = Scope { classes, object_id, diags: &mut *diags, class: main_id, method: None };
        scope.check_stmt(&program.main.body)
    };

    let mut methods = Vec::new();
    for decl in &program.classes {
        let Some(class) = classes.get(decl.name.k) else { continue };
        for m in &decl.methods {
            let Some(mid) = classes[class].methods.get_index_of(&m.name.k).map(MethodId::from_usize) else { continue };
            let mut scope = Scope { classes, object_id, diags: &mut *diags, class, method: Some(m) };
            let body = m.body.iter().map(|s| scope.check_stmt(s)).collect();
            let ret_expr = scope.check_expr(&m.ret_expr);
            let declared = classes.method(class, mid).ret;
            if !declared.compatible_with(ret_expr.ty, classes) {
                scope.diags.error(m.ret_expr.span.clone(), "return expression has the wrong type");
            }
            methods.push(TypedMethod { owner: class, id: mid, body, ret_expr });
        }
    }

    TypedProgram { main_body, methods }
}
