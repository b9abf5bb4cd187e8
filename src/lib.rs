//! A compiler for MiniJava — a small, statically typed, class-based
//! object-oriented language — to C, by way of a three-address-code (TAC)
//! intermediate representation.
//!
//! The pipeline is four stages over the parse tree produced by the front
//! end (`lexer`/`parser`):
//!
//! 1. [`symtab`] — the symbol builder: populates a [`symtab::SymbolTable`]
//!    with every class, its inheritance link, fields and methods.
//! 2. [`typeck`] — the type checker: assigns a type to every expression,
//!    checks every statement, and produces a typed tree.
//! 3. [`build_mir`] — IR lowering: emits one [`types::tac::TacBlock`] per
//!    method.
//! 4. [`codegen`] — the C backend: emits a self-contained C translation
//!    unit from the TAC block list.
//!
//! [`compile`] is the single entry point that runs all four.

pub mod ast;
pub mod build_mir;
pub mod codegen;
pub mod diagnostics;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod symbol;
pub mod symtab;
pub mod typeck;
pub mod types;

pub use diagnostics::CompileError;
pub use symbol::Symbol;

/// Compile one MiniJava source file to C.
///
/// Runs the front end, then all four core stages in order; no IR is
/// emitted if the symbol builder or type checker records an error (spec
/// §2: "no IR is emitted if the program is ill-typed").
pub fn compile(source: &str, file_name: &str) -> Result<String, CompileError> {
    let file: std::rc::Rc<str> = std::rc::Rc::from(file_name);
    log::debug!("compiling {file_name}");

    let program = parser::parse(file, source)?;

    let mut symtab = symtab::build(&program)?;
    log::info!("symbol builder: {} classes registered", symtab.classes.len());

    let mut diags = diagnostics::Diagnostics::new();
    let typed = typeck::check(&program, &mut symtab, &mut diags);
    diags.die().map_err(CompileError::Type)?;
    log::info!("type checker: {} methods checked, 0 errors", typed.methods.len());

    let blocks = build_mir::lower_program(&typed, &symtab);
    log::info!("lowering: {} TAC blocks", blocks.len());

    let c = codegen::emit(&blocks);
    log::info!("codegen: done, {} bytes", c.len());
    Ok(c)
}

#[cfg(test)]
mod tests {
    //! End-to-end scenarios straight from the spec's Testable Properties
    //! (§8): the whole pipeline, compiled and checked as C source text.
    //! These can't execute the emitted C (no toolchain is invoked here),
    //! but they pin down the translation shape for every scenario.

    use super::*;

    #[test]
    fn arithmetic_precedence() {
        let c = compile(
            "class M { public static void main(String[] a) { System.out.println(1+2*3); } }",
            "t.java",
        ).expect("compiles");
        assert!(c.contains("printf"));
    }

    #[test]
    fn array_zero_init_and_assignment() {
        let c = compile(
            "class M { public static void main(String[] a) { System.out.println(new A().run()); } }\n\
             class A { public int run() { int[] a; a = new int[3]; a[1] = 42; return a[1]; } }",
            "t.java",
        ).expect("compiles");
        assert!(c.contains("calloc"));
    }

    #[test]
    fn override_dispatch_compiles() {
        // `main` has no locals (spec §8 scenario 3 needs one to hold a
        // statically-`A`-typed, dynamically-`B` receiver), so the call
        // under test lives in `Wrap.test` instead.
        let c = compile(
            "class M { public static void main(String[] a) { System.out.println(new Wrap().test()); } }\n\
             class A { public int f() { return 1; } }\n\
             class B extends A { public int f() { return 2; } }\n\
             class Wrap { public int test() { A x; x = new B(); return x.f(); } }",
            "t.java",
        ).expect("compiles");
        // Both overrides are emitted as distinct blocks...
        assert!(c.contains("static void A_f(void) {"));
        assert!(c.contains("static void B_f(void) {"));
        // ...and the call site dispatches through the vtable (an indirect
        // call through a loaded function pointer) rather than calling
        // either override directly, since the static type `A` alone can't
        // tell it which override the `B` instance actually needs.
        assert!(c.contains("(*("));
        assert!(!c.contains("A_f();"));
        assert!(!c.contains("B_f();"));
    }

    #[test]
    fn deep_inheritance_override_dispatches_to_leaf() {
        let c = compile(
            "class M { public static void main(String[] a) { System.out.println(new E().f()); } }\n\
             class A { public int f() { return 1; } }\n\
             class B extends A { }\n\
             class C extends B { }\n\
             class D extends C { }\n\
             class E extends D { public int f() { return 5; } }",
            "t.java",
        ).expect("compiles");
        assert!(c.contains("E_f"));
    }

    #[test]
    fn assigning_int_to_array_is_a_type_error() {
        let err = compile(
            "class M { public static void main(String[] a) { System.out.println(new A().run()); } }\n\
             class A { int[] x; public int run() { x = 1; return 0; } }",
            "t.java",
        ).unwrap_err();
        assert!(matches!(err, CompileError::Type(_)));
    }

    #[test]
    fn arity_mismatch_is_reported() {
        let err = compile(
            "class M { public static void main(String[] a) { System.out.println(new A().m(1)); } }\n\
             class A { public int m(int x, int y) { return x; } }",
            "t.java",
        ).unwrap_err();
        let CompileError::Type(diags) = err else { panic!("expected a type error") };
        assert!(diags.iter().any(|d| d.message.contains("expects 2 argument")));
    }

    #[test]
    fn undeclared_variable_recovers_and_keeps_checking() {
        let err = compile(
            "class M { public static void main(String[] a) { System.out.println(new A().run()); } }\n\
             class A { public int run() { return undeclared + 1; } }",
            "t.java",
        ).unwrap_err();
        let CompileError::Type(diags) = err else { panic!("expected a type error") };
        // The undeclared use recovers to `OBJECT(Object)` so checking
        // continues (cascading errors are still reported, not a crash),
        // but the first recorded error is the undeclared-identifier one.
        assert!(diags[0].message.contains("undeclared"));
    }

    #[test]
    fn duplicate_class_name_is_a_symbol_error() {
        let err = compile(
            "class M { public static void main(String[] a) { System.out.println(1); } }\n\
             class A { }\nclass A { }",
            "t.java",
        ).unwrap_err();
        assert!(matches!(err, CompileError::Symbol(_)));
    }

    #[test]
    fn empty_class_compiles() {
        let c = compile(
            "class M { public static void main(String[] a) { System.out.println(1); } }\nclass Empty { }",
            "t.java",
        ).expect("compiles");
        assert!(c.contains("int main(void)"));
    }
}
