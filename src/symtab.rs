//! Stage 1: the symbol builder. Walks the parse tree once (two passes) to
//! populate a [`SymbolTable`] with every class, its inheritance link, its
//! fields, and its methods. See spec §4.1.

use std::collections::HashMap;

use crate::ast::{ClassDecl, Program, TypeNode};
use crate::span::FileSpan;
use crate::symbol::{intern, Symbol};
use crate::types::class::{Class, ClassId, Classes, Method};
use crate::types::{Kind, Type};

/// Symbol-builder failures. Unlike the type checker's accumulated
/// diagnostics, these abort the pass immediately: nothing downstream can
/// proceed without a consistent symbol table.
#[derive(Debug, thiserror::Error)]
pub enum SymbolError {
    #[error("{span:?}: duplicate name `{name}`")]
    DuplicateName { name: Symbol, span: FileSpan },
    #[error("{span:?}: class `{class}` extends unknown class `{superclass}`")]
    MissingSuperclass { class: Symbol, superclass: Symbol, span: FileSpan },
    #[error("cyclic inheritance involving `{0}`")]
    CyclicInheritance(Symbol),
    #[error("{span:?}: unknown type `{name}`")]
    UnknownType { name: Symbol, span: FileSpan },
    #[error("{span:?}: method `{name}` overrides an inherited method with an incompatible signature")]
    InvalidOverride { name: Symbol, span: FileSpan },
}

type SResult<T> = Result<T, SymbolError>;

/// Top-level mapping name→Class, built once by the symbol builder (stage 1)
/// and read by every stage after it.
pub struct SymbolTable {
    pub classes: Classes,
    pub object_id: ClassId,
    pub main_id: ClassId,
}

impl SymbolTable {
    /// Split into the parts the type checker needs: an immutable view of
    /// the class hierarchy plus the two well-known class ids.
    pub(crate) fn split_for_check(&self) -> (&Classes, ClassId, ClassId) {
        (&self.classes, self.object_id, self.main_id)
    }
}

/// Resolve a type-denoting parse node to a `Kind`, per the "Type Extractor"
/// spec names: `int`→INT, `boolean`→BOOLEAN, `int[]`→INTARRAY, a bare
/// identifier→`OBJECT` of the named class (or `None` if unknown).
fn extract_type(ty: &TypeNode, classes: &Classes) -> Option<Type> {
    match ty {
        TypeNode::Int => Some(Kind::Int),
        TypeNode::Boolean => Some(Kind::Boolean),
        TypeNode::IntArray => Some(Kind::IntArray),
        TypeNode::ClassName(name) => classes.get(name.k).map(Kind::Object),
    }
}

/// Run the two-pass symbol builder over `program`.
pub fn build(program: &Program) -> SResult<SymbolTable> {
    let mut classes = Classes::new();

    // Pass 1: register every class name so forward references resolve.
    let object_name = intern("Object");
    let object_id = classes.insert(Class::new(object_name, None));

    let main_name = program.main.name.k;
    if classes.get(main_name).is_some() {
        return Err(SymbolError::DuplicateName { name: main_name, span: program.main.name.span.clone() });
    }
    let main_id = classes.insert(Class::new(main_name, Some(object_id)));

    let mut decl_of: HashMap<ClassId, &ClassDecl> = HashMap::new();
    for decl in &program.classes {
        let name = decl.name.k;
        if classes.get(name).is_some() {
            return Err(SymbolError::DuplicateName { name, span: decl.name.span.clone() });
        }
        let id = classes.insert(Class::new(name, None));
        decl_of.insert(id, decl);
    }

    // Pass 2a: resolve `extends` clauses.
    for (&id, decl) in &decl_of {
        let superclass = match &decl.superclass {
            None => object_id,
            Some(sup) => classes.get(sup.k).ok_or_else(|| SymbolError::MissingSuperclass {
                class: decl.name.k,
                superclass: sup.k,
                span: sup.span.clone(),
            })?,
        };
        classes[id].superclass = Some(superclass);
    }
    check_acyclic(&classes)?;

    // Pass 2b: resolve field and method signatures, in declaration order.
    for (&id, decl) in &decl_of {
        for field in &decl.fields {
            let ty = extract_type(&field.ty, &classes)
                .ok_or_else(|| SymbolError::UnknownType { name: type_name(&field.ty), span: field.name.span.clone() })?;
            if classes[id].fields.contains_key(&field.name.k) {
                return Err(SymbolError::DuplicateName { name: field.name.k, span: field.name.span.clone() });
            }
            let parent = classes[id].superclass.expect("resolved above");
            if classes.has_any_var(parent, field.name.k).is_some() {
                return Err(SymbolError::DuplicateName { name: field.name.k, span: field.name.span.clone() });
            }
            classes[id].fields.insert(field.name.k, ty);
        }

        for m in &decl.methods {
            let ret = extract_type(&m.ret_ty, &classes)
                .ok_or_else(|| SymbolError::UnknownType { name: type_name(&m.ret_ty), span: m.name.span.clone() })?;
            let mut method = Method::new(m.name.k, id, ret);
            for p in &m.params {
                let ty = extract_type(&p.ty, &classes)
                    .ok_or_else(|| SymbolError::UnknownType { name: type_name(&p.ty), span: p.name.span.clone() })?;
                if method.params.contains_key(&p.name.k) {
                    return Err(SymbolError::DuplicateName { name: p.name.k, span: p.name.span.clone() });
                }
                method.params.insert(p.name.k, ty);
            }
            for l in &m.locals {
                let ty = extract_type(&l.ty, &classes)
                    .ok_or_else(|| SymbolError::UnknownType { name: type_name(&l.ty), span: l.name.span.clone() })?;
                if method.params.contains_key(&l.name.k) || method.locals.contains_key(&l.name.k) {
                    return Err(SymbolError::DuplicateName { name: l.name.k, span: l.name.span.clone() });
                }
                method.locals.insert(l.name.k, ty);
            }
            if classes[id].methods.contains_key(&m.name.k) {
                return Err(SymbolError::DuplicateName { name: m.name.k, span: m.name.span.clone() });
            }
            let parent = classes[id].superclass.expect("resolved above");
            if let Some((owner, mid)) = classes.get_any_method(parent, m.name.k) {
                let base = classes.method(owner, mid);
                let sig_matches = base.params.len() == method.params.len()
                    && base.params.values().zip(method.params.values()).all(|(a, b)| a == b)
                    && base.ret.compatible_with(method.ret, &classes);
                if !sig_matches {
                    return Err(SymbolError::InvalidOverride { name: m.name.k, span: m.span.clone() });
                }
            }
            classes[id].methods.insert(m.name.k, method);
        }
    }

    freeze_layouts(&mut classes, object_id, main_id, &decl_of);

    Ok(SymbolTable { classes, object_id, main_id })
}

fn type_name(ty: &TypeNode) -> Symbol {
    match ty {
        TypeNode::ClassName(n) => n.k,
        _ => unreachable!("extract_type only fails for ClassName"),
    }
}

fn check_acyclic(classes: &Classes) -> SResult<()> {
    for (id, class) in classes.iter() {
        let mut seen = vec![id];
        let mut cur = class.superclass;
        while let Some(c) = cur {
            if c == id {
                return Err(SymbolError::CyclicInheritance(class.name));
            }
            if seen.contains(&c) { break; }
            seen.push(c);
            cur = classes[c].superclass;
        }
    }
    Ok(())
}

/// Compute and cache the flattened field/vtable layouts, root to leaf, once
/// the class hierarchy is frozen. Overriding a method keeps its ancestor's
/// slot; an added field always appends to its own class's slice.
fn freeze_layouts(
    classes: &mut Classes,
    object_id: ClassId,
    main_id: ClassId,
    decl_of: &HashMap<ClassId, &ClassDecl>,
) {
    let mut ids: Vec<ClassId> = decl_of.keys().copied().collect();
    ids.push(object_id);
    ids.push(main_id);

    for id in ids {
        // Root-to-leaf chain of ancestors, computed from the (already
        // resolved) superclass links rather than from any cached layout,
        // so this doesn't depend on processing order.
        let chain: Vec<ClassId> = classes.ancestry(id).collect::<Vec<_>>().into_iter().rev().collect();

        let mut fields = Vec::new();
        let mut methods = Vec::new();
        for &c in &chain {
            fields.extend(classes[c].fields.keys().copied());
            for &m in classes[c].methods.keys() {
                if !methods.contains(&m) { methods.push(m); }
            }
        }
        classes[id].field_layout = fields;
        classes[id].method_layout = methods;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_src(src: &str) -> SResult<SymbolTable> {
        let file: std::rc::Rc<str> = std::rc::Rc::from("t.java");
        let program = crate::parser::parse(file, src).expect("parses");
        build(&program)
    }

    #[test]
    fn object_root_is_injected() {
        let st = build_src("class M { public static void main(String[] a) { } }").unwrap();
        assert!(st.classes.get(intern("Object")).is_some());
    }

    #[test]
    fn field_layout_prefixes_inherited_fields() {
        let st = build_src(
            "class M { public static void main(String[] a) { } }\n\
             class A { int x; }\nclass B extends A { int y; }",
        ).unwrap();
        let b = st.classes.get(intern("B")).unwrap();
        let names: Vec<_> = st.classes[b].field_layout.iter().map(|s| s.as_str().to_string()).collect();
        assert_eq!(names, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn override_keeps_ancestors_vtable_slot() {
        let st = build_src(
            "class M { public static void main(String[] a) { } }\n\
             class A { public int f() { return 1; } public int g() { return 2; } }\n\
             class B extends A { public int f() { return 3; } }",
        ).unwrap();
        let a = st.classes.get(intern("A")).unwrap();
        let b = st.classes.get(intern("B")).unwrap();
        assert_eq!(st.classes[a].method_slot(intern("f")), st.classes[b].method_slot(intern("f")));
        assert_eq!(st.classes[b].method_layout.len(), 2);
    }

    #[test]
    fn duplicate_field_name_is_an_error() {
        let err = build_src(
            "class M { public static void main(String[] a) { } }\n\
             class A { int x; int x; }",
        ).unwrap_err();
        assert!(matches!(err, SymbolError::DuplicateName { .. }));
    }

    #[test]
    fn field_colliding_with_inherited_field_is_an_error() {
        let err = build_src(
            "class M { public static void main(String[] a) { } }\n\
             class A { int x; }\nclass B extends A { int x; }",
        ).unwrap_err();
        assert!(matches!(err, SymbolError::DuplicateName { .. }));
    }

    #[test]
    fn unknown_superclass_is_an_error() {
        let err = build_src(
            "class M { public static void main(String[] a) { } }\n\
             class A extends Ghost { }",
        ).unwrap_err();
        assert!(matches!(err, SymbolError::MissingSuperclass { .. }));
    }

    #[test]
    fn cyclic_inheritance_is_rejected() {
        let err = build_src(
            "class M { public static void main(String[] a) { } }\n\
             class A extends B { }\nclass B extends A { }",
        ).unwrap_err();
        assert!(matches!(err, SymbolError::CyclicInheritance(_)));
    }

    #[test]
    fn override_with_mismatched_params_is_an_error() {
        let err = build_src(
            "class M { public static void main(String[] a) { } }\n\
             class A { public int f(int x) { return x; } }\n\
             class B extends A { public int f() { return 1; } }",
        ).unwrap_err();
        assert!(matches!(err, SymbolError::InvalidOverride { .. }));
    }

    #[test]
    fn class_with_no_fields_or_methods_has_empty_layouts() {
        let st = build_src(
            "class M { public static void main(String[] a) { } }\nclass Empty { }",
        ).unwrap();
        let e = st.classes.get(intern("Empty")).unwrap();
        assert!(st.classes[e].field_layout.is_empty());
        assert!(st.classes[e].method_layout.is_empty());
    }
}
