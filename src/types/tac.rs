//! Three-address code: the register-free IR the lowering stage emits and
//! the C backend consumes. An op is a tagged sum type (one variant per
//! opcode, each with only the operand slots it needs) rather than a single
//! struct with a field per possible operand — the representation the
//! source material uses, generalized to an idiomatic Rust enum.

use crate::types::idx::{mk_idx, Idx};

mk_idx! {
    /// A scratch register, local to one block (`r1..rMaxR` in spec terms).
    #[derive(Debug)]
    pub struct Reg;
}

mk_idx! {
    /// A local-variable slot (`vl[0..]`; slot 0 is always `this`).
    #[derive(Debug)]
    pub struct Local;
}

mk_idx! {
    /// A global register, one per class (holds that class's vtable head).
    #[derive(Debug)]
    pub struct Global;
}

mk_idx! {
    /// A jump target, either an in-block label or a callable block's entry.
    #[derive(Debug)]
    pub struct Label;
}

/// The arithmetic/comparison/pointer-arithmetic sub-opcode a `Binop` carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Lt,
    And,
    /// Pointer + byte/word offset; lowers to `r1.ptr = r2.ptr + r3.n` rather
    /// than arithmetic on `.n`.
    Offset,
}

/// Where a value lives when it is produced or consumed by an op: a fresh
/// scratch register, `r0` (the reserved constant-zero/scratch register
/// every block shares), or one of the process-wide `vg` globals (a class's
/// vtable head, or the call-return convention register).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegRef {
    R0,
    R(Reg),
    G(Global),
}

/// One TAC operation. `MOV`/`IMMED`/`LOAD`/`STORE`/`BINOP`/`PARAM`/`CALL`/
/// `RET`/`LABEL`/`JMP`/`JZ`/`MALLOC`/`READ`/`WRITE`/`ADDROF`/`NOP` from the
/// spec, one variant each.
#[derive(Clone, Debug)]
pub enum TacOp {
    /// `r1 = r2`
    Mov { dst: RegRef, src: RegRef },
    /// `r1 = vl[k]` or `vl[k] = r1`, reading/writing a local slot.
    MovLocal { dst: RegRef, local: Local },
    SetLocal { local: Local, src: RegRef },
    /// `r1.n = n`
    Immed { dst: RegRef, n: i32 },
    /// `r1 = *(r2.ptr)`
    Load { dst: RegRef, addr: RegRef },
    /// `*(r1.ptr) = r2`
    Store { addr: RegRef, src: RegRef },
    /// `r1 = r2 OP r3`
    Binop { op: BinOp, dst: RegRef, lhs: RegRef, rhs: RegRef },
    /// `param[next_param++] = r1`
    Param { src: RegRef },
    /// `call r1` (the vtable slot / global function pointer held in `r1`)
    Call { target: RegRef },
    /// Return the value currently in the conventional return register.
    Ret,
    /// A block-local jump target or, as the first op of a block, its entry
    /// label.
    Label(Label),
    Jmp(Label),
    /// Jump to `label` if `cond` holds the integer `0`.
    Jz { cond: RegRef, label: Label },
    /// `r1.ptr = calloc(r2.n, sizeof(word))` — zero-filled, which is
    /// load-bearing: it gives fresh objects/arrays their default `0`/
    /// `false`/`null` field values.
    Malloc { dst: RegRef, words: RegRef },
    /// Read an integer (unused by MiniJava surface syntax today, kept for
    /// symmetry with `WRITE` and future extension).
    Read { dst: RegRef },
    /// `printf("%d\n", r1)`
    Write { src: RegRef },
    /// `r1.f = &block` — the address of a callable block's entry point
    /// (its mangled C function name), used to populate vtable slots in
    /// `INIT`. Distinct from `Label`, which only ever names an in-block
    /// jump target.
    AddrOf { dst: RegRef, block: String },
    /// Emits an empty statement; never produced by lowering today, but kept
    /// as an explicit opcode so the backend's op-to-statement mapping is
    /// total.
    Nop,
}

/// An ordered sequence of TAC ops making up one method (or `INIT`/`MAIN`).
/// The first op must be a `LABEL` naming the block's entry point.
#[derive(Debug, Default)]
pub struct TacBlock {
    pub name: String,
    pub ops: Vec<TacOp>,
    pub max_local: usize,
    pub max_reg: usize,
    pub max_global: usize,
    /// The largest number of `PARAM` ops emitted for a single contiguous
    /// call sequence; sizes the backend's `param[]` array.
    pub max_params: usize,
    /// The number of slots *this* block's own prologue copies out of the
    /// caller's `param[]` array: `this` plus the method's own declared
    /// parameters (0 for `INIT`/`MAIN`, which take no parameters). Distinct
    /// from `max_local`, which also counts this block's own non-parameter
    /// locals — those live past `param_arity` in `vl[]` but are never
    /// populated from `param[]`.
    pub param_arity: usize,
}

impl TacBlock {
    #[must_use] pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn push(&mut self, op: TacOp) { self.ops.push(op); }

    pub(crate) fn track_reg(&mut self, r: Reg) {
        self.max_reg = self.max_reg.max(r.into_usize() + 1);
    }
    pub(crate) fn track_local(&mut self, l: Local) {
        self.max_local = self.max_local.max(l.into_usize() + 1);
    }
    pub(crate) fn track_global(&mut self, g: Global) {
        self.max_global = self.max_global.max(g.into_usize() + 1);
    }
    pub(crate) fn set_param_arity(&mut self, n: usize) {
        self.param_arity = n;
        self.max_local = self.max_local.max(n);
    }
}
