//! Stage 4: the C backend. Turns the TAC block list the lowering stage
//! produced into a single, self-contained C translation unit. See spec
//! §4.5.
//!
//! Every value — int, boolean, pointer, function address — is stored in
//! the generated program as a `word` union, exactly as the IR's `RegRef`
//! is untyped at the TAC level; the backend's only job is picking the
//! right union member per op.

use if_chain::if_chain;
use itertools::Itertools;
use smallvec::SmallVec;

use crate::types::idx::Idx;
use crate::types::tac::{BinOp, Global, Label, Local, Reg, RegRef, TacBlock, TacOp};

/// Mangle a TAC block name into a valid C identifier: `_` doubles, `.`
/// and `@` become `_`. Applied to both the function definition and every
/// site that calls or takes the address of it, so they always agree.
fn mangle(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            '_' => out.push_str("__"),
            '.' | '@' => out.push('_'),
            c => out.push(c),
        }
    }
    out
}

fn reg(r: RegRef) -> String {
    match r {
        RegRef::R0 => "r0".to_string(),
        RegRef::R(r) => format!("r{}", r.into_usize()),
        RegRef::G(g) => format!("vg{}", g.into_usize()),
    }
}

fn local(l: Local) -> String { format!("vl[{}]", l.into_usize()) }

fn label(l: Label) -> String { format!("L{}", l.into_usize()) }

fn binop_sym(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Lt => "<",
        BinOp::And => "&&",
        BinOp::Offset => unreachable!("Offset is lowered separately, as pointer arithmetic"),
    }
}

/// Render one TAC op as a single C statement. Total over `TacOp`'s
/// variants (spec Testable Property 5): every op produces exactly one
/// statement, except `LABEL` (a C label) and `NOP` (an empty statement).
fn emit_op(out: &mut String, op: &TacOp) {
    match op {
        TacOp::Mov { dst, src } => out.push_str(&format!("  {} = {};\n", reg(*dst), reg(*src))),
        TacOp::MovLocal { dst, local: l } => out.push_str(&format!("  {} = {};\n", reg(*dst), local(*l))),
        TacOp::SetLocal { local: l, src } => out.push_str(&format!("  {} = {};\n", local(*l), reg(*src))),
        TacOp::Immed { dst, n } => out.push_str(&format!("  {}.n = {};\n", reg(*dst), n)),
        TacOp::Load { dst, addr } => out.push_str(&format!("  {} = *({}.ptr);\n", reg(*dst), reg(*addr))),
        TacOp::Store { addr, src } => out.push_str(&format!("  *({}.ptr) = {};\n", reg(*addr), reg(*src))),
        TacOp::Binop { op: BinOp::Offset, dst, lhs, rhs } => {
            out.push_str(&format!("  {}.ptr = {}.ptr + {}.n;\n", reg(*dst), reg(*lhs), reg(*rhs)));
        }
        TacOp::Binop { op, dst, lhs, rhs } => {
            out.push_str(&format!("  {}.n = {}.n {} {}.n;\n", reg(*dst), reg(*lhs), binop_sym(*op), reg(*rhs)));
        }
        TacOp::Param { src } => out.push_str(&format!("  param[next_param++] = {};\n", reg(*src))),
        TacOp::Call { target } => out.push_str(&format!("  (*({}.f))();\n", reg(*target))),
        TacOp::Ret => out.push_str("  return;\n"),
        TacOp::Label(l) => out.push_str(&format!("{}:\n  ;\n", label(*l))),
        TacOp::Jmp(l) => out.push_str(&format!("  goto {};\n", label(*l))),
        TacOp::Jz { cond, label: l } => out.push_str(&format!("  if ({}.n == 0) goto {};\n", reg(*cond), label(*l))),
        TacOp::Malloc { dst, words } => {
            out.push_str(&format!("  {}.ptr = calloc((size_t) {}.n, sizeof(word));\n", reg(*dst), reg(*words)));
        }
        TacOp::Read { dst } => out.push_str(&format!("  scanf(\"%d\", &{}.n);\n", reg(*dst))),
        TacOp::Write { src } => out.push_str(&format!("  printf(\"%d\\n\", {}.n);\n", reg(*src))),
        TacOp::AddrOf { dst, block } => {
            out.push_str(&format!("  {}.f = (void (*)(void)) &{};\n", reg(*dst), mangle(block)));
        }
        TacOp::Nop => out.push_str("  ;\n"),
    }
}

/// Collect every scratch register `1..=max_reg` a block declares, as a
/// `SmallVec` since almost every MiniJava method only ever needs a
/// handful.
fn scratch_regs(b: &TacBlock) -> SmallVec<[Reg; 8]> {
    (1..b.max_reg).map(Reg::from_usize).collect()
}

fn emit_block(out: &mut String, b: &TacBlock) {
    let name = mangle(&b.name);
    out.push_str(&format!("static void {name}(void) {{\n"));
    let vl_len = b.max_local.max(1);
    out.push_str(&format!("  word vl[{vl_len}];\n"));
    if_chain! {
        if b.max_reg > 1;
        let regs = scratch_regs(b);
        if !regs.is_empty();
        then {
            let decl = regs.iter().map(|r| format!("r{}", r.into_usize())).join(", ");
            out.push_str(&format!("  word {decl};\n"));
        }
    }
    out.push_str("  int p;\n");
    if b.param_arity > 0 {
        // Only `this` plus the method's own declared parameters come from
        // `param[]`; any further slots in `vl[]` are this block's own
        // non-parameter locals; see `TacBlock::param_arity`.
        out.push_str(&format!("  for (p = 0; p < {}; p++) {{ vl[p] = param[p]; }}\n", b.param_arity));
    }
    out.push_str("  next_param = 0;\n");
    for op in &b.ops {
        emit_op(out, op);
    }
    out.push_str("}\n\n");
}

/// Emit the whole C translation unit for `blocks`. `blocks` must be the
/// direct output of `crate::build_mir::lower_program`: `INIT` first, then
/// `MAIN`, then every method body, each starting with a `LABEL`.
#[must_use]
pub fn emit(blocks: &[TacBlock]) -> String {
    log::debug!("codegen: emitting {} blocks", blocks.len());
    let max_params = blocks.iter().map(|b| b.max_params).max().unwrap_or(0).max(1);
    let max_global = blocks.iter().map(|b| b.max_global).max().unwrap_or(0);

    let mut out = String::new();
    out.push_str("#include <stdio.h>\n#include <stdlib.h>\n\n");
    out.push_str("typedef union word word;\nunion word {\n  int n;\n  word *ptr;\n  void (*f)(void);\n};\n\n");
    out.push_str(&format!("static word param[{max_params}];\n"));
    out.push_str("static int next_param = 0;\n");
    out.push_str("static word r0 = {0};\n");
    for g in 0..max_global {
        out.push_str(&format!("static word vg{g} = {{0}};\n"));
    }
    out.push('\n');

    for b in blocks {
        out.push_str(&format!("static void {}(void);\n", mangle(&b.name)));
    }
    out.push('\n');

    for b in blocks {
        emit_block(&mut out, b);
    }

    out.push_str("int main(void) {\n  INIT();\n  MAIN();\n  return 0;\n}\n");
    log::info!("codegen: emitted {} bytes of C", out.len());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_to_c(src: &str) -> String {
        let out = crate::compile(src, "test.java").expect("compiles");
        out
    }

    #[test]
    fn balanced_braces_and_single_main() {
        let c = compile_to_c("class M { public static void main(String[] a) { System.out.println(1+2*3); } }");
        let opens = c.matches('{').count();
        let closes = c.matches('}').count();
        assert_eq!(opens, closes);
        assert_eq!(c.matches("int main(void)").count(), 1);
    }

    #[test]
    fn mangles_dots_and_underscores() {
        assert_eq!(mangle("A.f"), "A_f");
        assert_eq!(mangle("my_class.do_it"), "my__class_do__it");
        assert_eq!(mangle("@init"), "_init");
    }

    #[test]
    fn println_emits_printf() {
        let c = compile_to_c("class M { public static void main(String[] a) { System.out.println(7); } }");
        assert!(c.contains("printf(\"%d\\n\""));
    }

    #[test]
    fn forward_declares_every_block_once() {
        let c = compile_to_c(
            "class M { public static void main(String[] a) { System.out.println(new A().f()); } }\n\
             class A { public int f() { return 1; } }",
        );
        assert_eq!(c.matches("static void A_f(void);").count(), 1);
        assert_eq!(c.matches("static void A_f(void) {").count(), 1);
    }

    #[test]
    fn malloc_uses_calloc_for_zero_fill() {
        let c = compile_to_c(
            "class M { public static void main(String[] a) { System.out.println(new A().first()); } }\n\
             class A { public int first() { int[] a0; a0 = new int[3]; a0[1] = 42; return a0[0]; } }",
        );
        assert!(c.contains("calloc("));
    }

    /// `A.m` declares two params and one local past them (`this`, `p1`, `p2`,
    /// `loc`): the prologue must only copy `param[0..3)` (arity 3, `this` +
    /// 2 params) into `vl[]`, not `param[0..4)` — `loc` is never populated
    /// from `param[]`, only `vl[4]`'s slot 3 sized for it.
    #[test]
    fn prologue_copy_bound_is_param_arity_not_local_count() {
        let c = compile_to_c(
            "class M { public static void main(String[] a) { System.out.println(new A().m(1, 2)); } }\n\
             class A { public int m(int p1, int p2) { int loc; loc = p1 + p2; return loc; } }",
        );
        assert!(c.contains("for (p = 0; p < 3; p++) { vl[p] = param[p]; }"));
        assert!(c.contains("word vl[4];"));
    }
}
