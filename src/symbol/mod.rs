mod interner;
mod table;

use std::cell::RefCell;
use std::{fmt, str::FromStr};

use self::interner::Interner;
pub use self::table::{
    Area, Label, ScopeId, ScopeTree, SymbolData, SymbolId, SymbolKind, Variable, VariableKind,
};

fn with_interner<T>(f: impl FnOnce(&mut Interner) -> T) -> T {
    thread_local! {
        static INTERNER: RefCell<Interner> = RefCell::new(Interner::default());
    }

    INTERNER.with(|i| f(&mut *i.borrow_mut()))
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    pub fn intern(s: &str) -> Self {
        with_interner(|interner| interner.intern(s))
    }

    pub fn parse<T: FromStr>(&self) -> Result<T, T::Err> {
        with_interner(|interner| interner.lookup(self.0).parse())
    }

    pub fn as_str_with<T>(&self, f: impl FnOnce(&str) -> T) -> T {
        with_interner(|interner| f(interner.lookup(self.0)))
    }

    /// The case-folded symbol used as a lookup key; names are case-insensitive.
    pub fn fold(&self) -> Symbol {
        let folded = self.as_str_with(|s| {
            if s.bytes().any(|b| b.is_ascii_uppercase()) {
                Some(s.to_ascii_lowercase())
            } else {
                None
            }
        });
        match folded {
            Some(s) => Symbol::intern(&s),
            None => *self,
        }
    }

    pub fn eq_ignore_case(&self, other: Symbol) -> bool {
        self.fold() == other.fold()
    }

    pub fn last_char(&self) -> Option<char> {
        self.as_str_with(|s| s.chars().last())
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Copy out first; the formatter may re-enter the interner.
        let s = with_interner(|interner| interner.lookup(self.0).to_string());
        f.write_str(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let a = Symbol::intern("Player");
        let b = Symbol::intern("Player");
        assert_eq!(a, b);
        assert_ne!(a, Symbol::intern("player"));
        assert_eq!(a.fold(), Symbol::intern("player"));
        assert!(a.eq_ignore_case(Symbol::intern("PLAYER")));
        assert_eq!(a.to_string(), "Player");
    }
}
