//! A small string interner. Class, field, method and variable names all
//! flow through here so comparisons and hashing are a `u32` compare instead
//! of a string compare, and so `Symbol` stays `Copy`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// An interned identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(u32);

thread_local! {
    static INTERNER: RefCell<Interner> = RefCell::new(Interner::default());
}

#[derive(Default)]
struct Interner {
    strings: Vec<Rc<str>>,
    map: HashMap<Rc<str>, u32>,
}

impl Interner {
    fn intern(&mut self, s: &str) -> Symbol {
        if let Some(&id) = self.map.get(s) {
            return Symbol(id);
        }
        let rc: Rc<str> = Rc::from(s);
        let id = u32::try_from(self.strings.len()).expect("too many distinct identifiers");
        self.strings.push(rc.clone());
        self.map.insert(rc, id);
        Symbol(id)
    }

    fn resolve(&self, sym: Symbol) -> Rc<str> { self.strings[sym.0 as usize].clone() }
}

/// Intern a string, returning the [`Symbol`] for it. Interning the same text
/// twice always yields the same `Symbol`.
#[must_use] pub fn intern(s: &str) -> Symbol {
    INTERNER.with(|i| i.borrow_mut().intern(s))
}

impl Symbol {
    /// Look up the text this symbol was interned from.
    #[must_use] pub fn as_str(self) -> Rc<str> {
        INTERNER.with(|i| i.borrow().resolve(self))
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.as_str()) }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.as_str()) }
}
