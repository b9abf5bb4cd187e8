//! Stage 3: IR lowering. Walks the typed tree produced by `crate::typeck`
//! and emits one [`TacBlock`] per method (plus the synthetic `INIT` and
//! `MAIN` blocks), allocating virtual registers, object field offsets and
//! method-table offsets along the way. See spec §4.3–4.4.

use crate::symtab::SymbolTable;
use crate::typeck::{TExpr, TExprKind, TStmt, TypedProgram, VarRef};
use crate::types::class::{ClassId, Classes, Method, MethodId};
use crate::types::idx::Idx;
use crate::types::tac::{BinOp, Global, Label, Local, Reg, RegRef, TacBlock, TacOp};

/// The global register a class's vtable head is stored in during `INIT`.
/// Deterministic and order-preserving (spec Testable Property 4): a pure
/// function of class arena position, not of lowering order.
fn vtable_global(class: ClassId) -> Global { Global::from_usize(class.into_usize()) }

/// One past every class's vtable global: the dedicated convention
/// register a `RET` writes into and a `CALL`er reads the result back out
/// of.
fn ret_global(classes: &Classes) -> Global { Global::from_usize(classes.len()) }

/// Lower a whole well-typed program to its list of TAC blocks: `INIT`,
/// `MAIN`, then one block per method in the order the type checker
/// visited them.
#[must_use]
pub fn lower_program(program: &TypedProgram, symtab: &SymbolTable) -> Vec<TacBlock> {
    log::debug!("lowering: {} methods", program.methods.len());
    let classes = &symtab.classes;
    let rg = ret_global(classes);

    let mut blocks = Vec::with_capacity(program.methods.len() + 2);
    blocks.push(lower_init(classes));
    blocks.push(lower_main(&program.main_body, symtab, rg));
    for m in &program.methods {
        blocks.push(lower_method(m.owner, m.id, &m.body, &m.ret_expr, classes, rg));
    }
    log::info!("lowering: emitted {} TAC blocks", blocks.len());
    blocks
}

/// `INIT`: builds every class's method table. For each class, walks its
/// flattened vtable layout (root to leaf, overrides keeping their
/// ancestor's slot — see `crate::symtab::freeze_layouts`) and fills a
/// freshly allocated array of function pointers, one `ADDROF` per slot,
/// then stashes the array's address in that class's `vg`. Classes with no
/// visible methods (`Object`, typically) get no array at all — the
/// boundary behaviour spec §8 calls out explicitly.
fn lower_init(classes: &Classes) -> TacBlock {
    let mut b = TacBlock::new("INIT");
    b.push(TacOp::Label(Label::from_usize(0)));

    for (id, class) in classes.iter() {
        if class.method_layout.is_empty() {
            continue;
        }
        let mut lb = BlockBuilder::new(&mut b);
        let r_size = lb.fresh_reg();
        lb.emit(TacOp::Immed {
            dst: RegRef::R(r_size),
            n: i32::try_from(class.method_layout.len()).expect("class has too many methods"),
        });
        let r_arr = lb.fresh_reg();
        lb.emit(TacOp::Malloc { dst: RegRef::R(r_arr), words: RegRef::R(r_size) });
        for (slot, &name) in class.method_layout.iter().enumerate() {
            let (owner, mid) = classes.get_any_method(id, name)
                .expect("method_layout only lists methods visible from this class");
            let target = classes.method(owner, mid).qualified_name(classes);
            let r_fn = lb.fresh_reg();
            lb.emit(TacOp::AddrOf { dst: RegRef::R(r_fn), block: target });
            let r_off = lb.fresh_reg();
            lb.emit(TacOp::Immed { dst: RegRef::R(r_off), n: i32::try_from(slot).expect("slot overflow") });
            let r_slot = lb.fresh_reg();
            lb.emit(TacOp::Binop { op: BinOp::Offset, dst: RegRef::R(r_slot), lhs: RegRef::R(r_arr), rhs: RegRef::R(r_off) });
            lb.emit(TacOp::Store { addr: RegRef::R(r_slot), src: RegRef::R(r_fn) });
        }
        let vg = vtable_global(id);
        lb.emit(TacOp::Mov { dst: RegRef::G(vg), src: RegRef::R(r_arr) });
        b.track_global(vg);
    }
    b.push(TacOp::Ret);
    b
}

/// `MAIN`: the main class's single statement, lowered with no `this` and
/// no declared locals (classic MiniJava gives the main class neither).
fn lower_main(body: &TStmt, symtab: &SymbolTable, rg: Global) -> TacBlock {
    let mut b = TacBlock::new("MAIN");
    b.push(TacOp::Label(Label::from_usize(0)));
    {
        let mut lower = Lower {
            classes: &symtab.classes,
            class: symtab.main_id,
            method: None,
            ret_global: rg,
            next_label: 1,
            b: BlockBuilder::new(&mut b),
        };
        lower.stmt(body);
    }
    b.push(TacOp::Ret);
    b
}

/// One user-defined method, named by its qualified name (`Class.method`)
/// so `INIT`'s `ADDROF`s and the C backend's forward declarations agree.
fn lower_method(
    owner: ClassId,
    mid: MethodId,
    body: &[TStmt],
    ret_expr: &TExpr,
    classes: &Classes,
    rg: Global,
) -> TacBlock {
    let method = classes.method(owner, mid);
    let mut b = TacBlock::new(method.qualified_name(classes));
    b.push(TacOp::Label(Label::from_usize(0)));
    // `this` occupies vl[0] unconditionally, even if the body never reads
    // it, so every method shares one calling convention. The caller always
    // PARAMs `this` plus every declared parameter, in that order (spec
    // §4.4); locals beyond that arity are never populated from `param[]`.
    b.track_local(Local::from_usize(0));
    b.set_param_arity(1 + method.params.len());
    {
        let mut lower = Lower { classes, class: owner, method: Some(method), ret_global: rg, next_label: 1, b: BlockBuilder::new(&mut b) };
        for s in body {
            lower.stmt(s);
        }
        let r = lower.expr(ret_expr);
        lower.b.emit(TacOp::Mov { dst: RegRef::G(rg), src: r });
    }
    b.push(TacOp::Ret);
    b
}

/// Thin wrapper that allocates fresh scratch registers against a block
/// while pushing ops into it, tracking `max_reg` as it goes.
struct BlockBuilder<'b> {
    block: &'b mut TacBlock,
    next_reg: u32,
}

impl<'b> BlockBuilder<'b> {
    fn new(block: &'b mut TacBlock) -> Self { Self { block, next_reg: 1 } } // r0 is reserved

    fn fresh_reg(&mut self) -> Reg {
        let r = Reg::from_usize(self.next_reg as usize);
        self.next_reg += 1;
        self.block.track_reg(r);
        r
    }

    fn emit(&mut self, op: TacOp) { self.block.push(op); }
}

/// Per-method (or `MAIN`) lowering context: the scratch-register allocator
/// plus the scope (owning class, and method when not `MAIN`) needed to
/// resolve identifiers to local slots or field offsets.
struct Lower<'a, 'b> {
    classes: &'a Classes,
    class: ClassId,
    method: Option<&'a Method>,
    ret_global: Global,
    next_label: u32,
    b: BlockBuilder<'b>,
}

impl Lower<'_, '_> {
    fn fresh_label(&mut self) -> Label {
        let l = Label::from_usize(self.next_label as usize);
        self.next_label += 1;
        l
    }

    /// The word-offset of field `f` on the current class, including every
    /// inherited field ahead of it — stable across rebuilds (spec Testable
    /// Property 4), since it is read straight from the frozen layout.
    fn field_offset(&self, f: crate::symbol::Symbol) -> usize {
        self.classes[self.class].field_offset(f).expect("type checker validated this field reference")
    }

    fn var_slot(&self, id: crate::symbol::Symbol) -> usize {
        self.method.expect("a Local VarRef only arises inside a method body").var_slot(id)
            .expect("type checker validated this local reference")
    }

    fn imm(&mut self, n: i32) -> RegRef {
        let r = self.b.fresh_reg();
        self.b.emit(TacOp::Immed { dst: RegRef::R(r), n });
        RegRef::R(r)
    }

    /// `base + words` as a fresh pointer-valued register; `words == 0`
    /// collapses to `base` itself without emitting a no-op `OFFSET`.
    fn offset(&mut self, base: RegRef, words: i32) -> RegRef {
        if words == 0 {
            return base;
        }
        let off = self.imm(words);
        let r = self.b.fresh_reg();
        self.b.emit(TacOp::Binop { op: BinOp::Offset, dst: RegRef::R(r), lhs: base, rhs: off });
        RegRef::R(r)
    }

    fn load(&mut self, addr: RegRef) -> RegRef {
        let r = self.b.fresh_reg();
        self.b.emit(TacOp::Load { dst: RegRef::R(r), addr });
        RegRef::R(r)
    }

    fn this_reg(&mut self) -> RegRef {
        let r = self.b.fresh_reg();
        self.b.emit(TacOp::MovLocal { dst: RegRef::R(r), local: Local::from_usize(0) });
        RegRef::R(r)
    }

    /// Read a resolved variable reference into a fresh register: a `MOV`
    /// from its local slot, or a field load through `this`.
    fn read_var(&mut self, var: VarRef) -> RegRef {
        match var {
            VarRef::Local(name) => {
                let slot = self.var_slot(name);
                let local = Local::from_usize(slot);
                self.b.block.track_local(local);
                let r = self.b.fresh_reg();
                self.b.emit(TacOp::MovLocal { dst: RegRef::R(r), local });
                RegRef::R(r)
            }
            VarRef::Field(name) => {
                let this = self.this_reg();
                let words = i32::try_from(self.field_offset(name)).expect("field offset overflow");
                let addr = self.offset(this, words);
                self.load(addr)
            }
        }
    }

    fn write_var(&mut self, var: VarRef, value: RegRef) {
        match var {
            VarRef::Local(name) => {
                let slot = self.var_slot(name);
                let local = Local::from_usize(slot);
                self.b.block.track_local(local);
                self.b.emit(TacOp::SetLocal { local, src: value });
            }
            VarRef::Field(name) => {
                let this = self.this_reg();
                let words = i32::try_from(self.field_offset(name)).expect("field offset overflow");
                let addr = self.offset(this, words);
                self.b.emit(TacOp::Store { addr, src: value });
            }
        }
    }

    /// Array-element address: `arr + (index + 1)`, since word 0 of an
    /// `int[]` holds its length.
    fn elem_addr(&mut self, arr: RegRef, index: RegRef) -> RegRef {
        let one = self.imm(1);
        let idx1 = self.b.fresh_reg();
        self.b.emit(TacOp::Binop { op: BinOp::Add, dst: RegRef::R(idx1), lhs: index, rhs: one });
        let addr = self.b.fresh_reg();
        self.b.emit(TacOp::Binop { op: BinOp::Offset, dst: RegRef::R(addr), lhs: arr, rhs: RegRef::R(idx1) });
        RegRef::R(addr)
    }

    fn stmt(&mut self, s: &TStmt) {
        match s {
            TStmt::Block(stmts) => stmts.iter().for_each(|s| self.stmt(s)),
            TStmt::If { cond, then_branch, else_branch } => {
                let c = self.expr(cond);
                let l_else = self.fresh_label();
                let l_end = self.fresh_label();
                self.b.emit(TacOp::Jz { cond: c, label: l_else });
                self.stmt(then_branch);
                self.b.emit(TacOp::Jmp(l_end));
                self.b.emit(TacOp::Label(l_else));
                self.stmt(else_branch);
                self.b.emit(TacOp::Label(l_end));
            }
            TStmt::While { cond, body } => {
                let l_top = self.fresh_label();
                let l_end = self.fresh_label();
                self.b.emit(TacOp::Label(l_top));
                let c = self.expr(cond);
                self.b.emit(TacOp::Jz { cond: c, label: l_end });
                self.stmt(body);
                self.b.emit(TacOp::Jmp(l_top));
                self.b.emit(TacOp::Label(l_end));
            }
            TStmt::DoWhile { body, cond } => {
                let l_top = self.fresh_label();
                let l_end = self.fresh_label();
                self.b.emit(TacOp::Label(l_top));
                self.stmt(body);
                let c = self.expr(cond);
                self.b.emit(TacOp::Jz { cond: c, label: l_end });
                self.b.emit(TacOp::Jmp(l_top));
                self.b.emit(TacOp::Label(l_end));
            }
            TStmt::Println(e) => {
                let r = self.expr(e);
                self.b.emit(TacOp::Write { src: r });
            }
            TStmt::Assign { var, value } => {
                let r = self.expr(value);
                self.write_var(*var, r);
            }
            TStmt::ArrayAssign { var, index, value } => {
                let arr = self.read_var(*var);
                let idx = self.expr(index);
                let val = self.expr(value);
                let addr = self.elem_addr(arr, idx);
                self.b.emit(TacOp::Store { addr, src: val });
            }
        }
    }

    fn expr(&mut self, e: &TExpr) -> RegRef {
        match &e.kind {
            TExprKind::IntLit(n) => self.imm(*n),
            TExprKind::True => self.imm(1),
            TExprKind::False => self.imm(0),
            TExprKind::This => self.this_reg(),
            TExprKind::Var(v) => self.read_var(*v),
            TExprKind::NewIntArray(n) => self.new_int_array(n),
            TExprKind::NewObject(class) => self.new_object(*class),
            TExprKind::Not(inner) => {
                // `1 - v`: MiniJava booleans are 0/1 ints, so this is the
                // only arithmetic NOT a BINOP sub-opcode set supports.
                let v = self.expr(inner);
                let one = self.imm(1);
                let r = self.b.fresh_reg();
                self.b.emit(TacOp::Binop { op: BinOp::Sub, dst: RegRef::R(r), lhs: one, rhs: v });
                RegRef::R(r)
            }
            TExprKind::Length(inner) => {
                let arr = self.expr(inner);
                self.load(arr)
            }
            TExprKind::Index { array, index } => {
                let arr = self.expr(array);
                let idx = self.expr(index);
                let addr = self.elem_addr(arr, idx);
                self.load(addr)
            }
            TExprKind::And(a, b) => self.binop(BinOp::And, a, b),
            TExprKind::Lt(a, b) => self.binop(BinOp::Lt, a, b),
            TExprKind::Add(a, b) => self.binop(BinOp::Add, a, b),
            TExprKind::Sub(a, b) => self.binop(BinOp::Sub, a, b),
            TExprKind::Mul(a, b) => self.binop(BinOp::Mul, a, b),
            TExprKind::Call { receiver, owner, method, args } => self.call(receiver, *owner, *method, args),
        }
    }

    fn binop(&mut self, op: BinOp, a: &TExpr, b: &TExpr) -> RegRef {
        // Both operands are always evaluated, even for `&&` — the source
        // material does not short-circuit (spec §9 Open Question, resolved
        // for fidelity; see DESIGN.md).
        let ra = self.expr(a);
        let rb = self.expr(b);
        let r = self.b.fresh_reg();
        self.b.emit(TacOp::Binop { op, dst: RegRef::R(r), lhs: ra, rhs: rb });
        RegRef::R(r)
    }

    fn new_int_array(&mut self, n: &TExpr) -> RegRef {
        let len = self.expr(n);
        let one = self.imm(1);
        let words = self.b.fresh_reg();
        self.b.emit(TacOp::Binop { op: BinOp::Add, dst: RegRef::R(words), lhs: len, rhs: one });
        let ptr = self.b.fresh_reg();
        self.b.emit(TacOp::Malloc { dst: RegRef::R(ptr), words: RegRef::R(words) });
        // `calloc` zero-fills the whole array, but the length word isn't
        // zero: write it explicitly at offset 0.
        self.b.emit(TacOp::Store { addr: RegRef::R(ptr), src: len });
        RegRef::R(ptr)
    }

    fn new_object(&mut self, class: ClassId) -> RegRef {
        let size = self.imm(i32::try_from(self.classes[class].instance_size()).expect("instance too large"));
        let ptr = self.b.fresh_reg();
        self.b.emit(TacOp::Malloc { dst: RegRef::R(ptr), words: size });
        let vg = vtable_global(class);
        self.b.block.track_global(vg);
        let vt = self.b.fresh_reg();
        self.b.emit(TacOp::Mov { dst: RegRef::R(vt), src: RegRef::G(vg) });
        self.b.emit(TacOp::Store { addr: RegRef::R(ptr), src: RegRef::R(vt) });
        RegRef::R(ptr)
    }

    /// `recv.m(args...)`: `this` then every argument is `PARAM`-ed (spec
    /// §4.4), the callee is found by indexing the receiver's vtable at
    /// `m`'s slot for the statically-known receiver class (recorded by the
    /// type checker directly on this call node — see `crate::typeck`), and
    /// the result is read back from the shared return-value global.
    fn call(&mut self, receiver: &TExpr, owner: ClassId, method: MethodId, args: &[TExpr]) -> RegRef {
        let recv = self.expr(receiver);
        self.b.emit(TacOp::Param { src: recv });
        let mut n_params = 1usize;
        for a in args {
            let r = self.expr(a);
            self.b.emit(TacOp::Param { src: r });
            n_params += 1;
        }
        self.b.block.max_params = self.b.block.max_params.max(n_params);

        let m = self.classes.method(owner, method);
        let slot = self.classes[owner].method_slot(m.name)
            .expect("method_slot is defined for every method reachable via get_any_method");

        let vtable = self.load(recv);
        let slot_addr = self.offset(vtable, i32::try_from(slot).expect("slot overflow"));
        let func = self.load(slot_addr);
        self.b.emit(TacOp::Call { target: func });

        let r = self.b.fresh_reg();
        self.b.emit(TacOp::Mov { dst: RegRef::R(r), src: RegRef::G(self.ret_global) });
        self.b.block.track_global(self.ret_global);
        RegRef::R(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::{symtab, typeck};

    fn lower_source(src: &str) -> Vec<TacBlock> {
        let file: std::rc::Rc<str> = std::rc::Rc::from("test.java");
        let program = crate::parser::parse(file, src).expect("parse");
        let mut symtab = symtab::build(&program).expect("symbols");
        let mut diags = Diagnostics::new();
        let typed = typeck::check(&program, &mut symtab, &mut diags);
        diags.die().expect("well-typed");
        lower_program(&typed, &symtab)
    }

    #[test]
    fn empty_main_is_a_single_ret() {
        let blocks = lower_source("class M { public static void main(String[] a) { } }");
        let main = blocks.iter().find(|b| b.name == "MAIN").expect("main block");
        assert!(matches!(main.ops.last(), Some(TacOp::Ret)));
        assert_eq!(main.ops.iter().filter(|op| !matches!(op, TacOp::Label(_) | TacOp::Ret)).count(), 0);
    }

    #[test]
    fn literal_arithmetic_lowers_to_binops() {
        let blocks = lower_source("class M { public static void main(String[] a) { System.out.println(1+2*3); } }");
        let main = blocks.iter().find(|b| b.name == "MAIN").unwrap();
        let binops = main.ops.iter().filter(|op| matches!(op, TacOp::Binop { .. })).count();
        assert_eq!(binops, 2);
    }

    #[test]
    fn class_with_no_methods_builds_no_vtable_array() {
        let blocks = lower_source("class M { public static void main(String[] a) { } }\nclass Empty { }");
        let init = blocks.iter().find(|b| b.name == "INIT").unwrap();
        assert_eq!(init.ops.iter().filter(|op| matches!(op, TacOp::Malloc { .. })).count(), 0);
    }

    #[test]
    fn both_override_bodies_are_lowered() {
        let blocks = lower_source(
            "class M { public static void main(String[] a) { System.out.println(new B().f()); } }\n\
             class A { public int f() { return 1; } }\n\
             class B extends A { public int f() { return 2; } }",
        );
        assert!(blocks.iter().any(|b| b.name == "A.f"));
        assert!(blocks.iter().any(|b| b.name == "B.f"));
    }

    #[test]
    fn method_blocks_read_this_from_local_slot_zero() {
        let blocks = lower_source(
            "class M { public static void main(String[] a) { } }\n\
             class A { int x; public int get() { return this.x; } }",
        );
        let get = blocks.iter().find(|b| b.name == "A.get").unwrap();
        assert!(get.ops.iter().any(|op| matches!(op, TacOp::MovLocal { local, .. } if local.into_usize() == 0)));
    }

    #[test]
    fn call_sequence_tracks_max_params_including_receiver() {
        let blocks = lower_source(
            "class M { public static void main(String[] a) { System.out.println(new A().m(1, 2, 3)); } }\n\
             class A { public int m(int a, int b, int c) { return a; } }",
        );
        let main = blocks.iter().find(|b| b.name == "MAIN").unwrap();
        assert_eq!(main.max_params, 4); // this + 3 args
    }

    #[test]
    fn params_and_locals_extend_max_local_past_this() {
        let blocks = lower_source(
            "class M { public static void main(String[] a) { } }\n\
             class A { public int m(int p1, int p2) { int loc; loc = p1 + p2; return loc; } }",
        );
        let m = blocks.iter().find(|b| b.name == "A.m").unwrap();
        // this (slot 0) + p1 (1) + p2 (2) + loc (3): max_local must cover slot 3.
        assert_eq!(m.max_local, 4);
    }
}
