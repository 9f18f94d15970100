use crate::{
    lex::Span,
    symbol::Symbol,
    typeck::{overload::OverloadSet, ty::TypeRef, ty::UserTypeId},
};
use std::collections::HashMap;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);

/// How far a lookup may reach.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Area {
    /// This scope only.
    Local,
    /// This scope, then each ancestor in turn.
    Global,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VariableKind {
    Global,
    Local,
    Param { index: usize, by_ref: bool },
    Member { index: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub ty: TypeRef,
    pub kind: VariableKind,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Label {
    /// Position among the labels of the enclosing body.
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SymbolKind {
    Variable(Variable),
    Function(OverloadSet),
    Label(Label),
    UserType(UserTypeId),
}

impl SymbolKind {
    pub fn describe(&self) -> &'static str {
        match self {
            SymbolKind::Variable(_) => "variable",
            SymbolKind::Function(_) => "function",
            SymbolKind::Label(_) => "label",
            SymbolKind::UserType(_) => "type",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolData {
    pub name: Symbol,
    /// Where the symbol was declared.
    pub span: Span,
    pub scope: ScopeId,
    pub kind: SymbolKind,
}

impl SymbolData {
    pub fn as_variable(&self) -> Option<&Variable> {
        match &self.kind {
            SymbolKind::Variable(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&OverloadSet> {
        match &self.kind {
            SymbolKind::Function(f) => Some(f),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Scope {
    parent: Option<ScopeId>,
    owner: Option<SymbolId>,
    children: Vec<ScopeId>,
    symbols: Vec<SymbolId>,
}

/// Every scope of a unit, stored in one arena.
///
/// All scopes share a single dictionary keyed by `(scope, folded name)`, so a
/// scope's private prefix is simply its id.
#[derive(Debug, Clone)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    symbols: Vec<SymbolData>,
    dict: HashMap<(ScopeId, Symbol), SymbolId>,
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeTree {
    pub fn new() -> Self {
        let root = Scope {
            parent: None,
            owner: None,
            children: vec![],
            symbols: vec![],
        };
        Self {
            scopes: vec![root],
            symbols: vec![],
            dict: HashMap::new(),
        }
    }

    /// The program scope.
    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn push_scope(&mut self, parent: ScopeId, owner: Option<SymbolId>) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            parent: Some(parent),
            owner,
            children: vec![],
            symbols: vec![],
        });
        self.scopes[parent.0 as usize].children.push(id);
        id
    }

    pub fn set_owner(&mut self, scope: ScopeId, owner: SymbolId) {
        self.scopes[scope.0 as usize].owner = Some(owner);
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scope(scope).parent
    }

    pub fn children(&self, scope: ScopeId) -> &[ScopeId] {
        &self.scope(scope).children
    }

    /// The nearest owner symbol of `scope` or one of its ancestors.
    pub fn owner(&self, scope: ScopeId) -> Option<SymbolId> {
        let mut curr = Some(scope);
        while let Some(s) = curr {
            let scope = self.scope(s);
            if scope.owner.is_some() {
                return scope.owner;
            }
            curr = scope.parent;
        }
        None
    }

    /// Inserts `name` into `scope`. Fails with the existing symbol if the
    /// name is already declared in that same scope.
    pub fn add(
        &mut self,
        scope: ScopeId,
        name: Symbol,
        span: Span,
        kind: SymbolKind,
    ) -> Result<SymbolId, SymbolId> {
        let key = (scope, name.fold());
        if let Some(existing) = self.dict.get(&key) {
            return Err(*existing);
        }

        let id = SymbolId(self.symbols.len() as u32);
        log::trace!("{:?}: add {} {} as {:?}", scope, kind.describe(), name, id);
        self.symbols.push(SymbolData {
            name,
            span,
            scope,
            kind,
        });
        self.dict.insert(key, id);
        self.scopes[scope.0 as usize].symbols.push(id);
        Ok(id)
    }

    pub fn find(&self, scope: ScopeId, name: Symbol, area: Area) -> Option<SymbolId> {
        let name = name.fold();
        let mut curr = Some(scope);
        while let Some(s) = curr {
            if let Some(id) = self.dict.get(&(s, name)) {
                return Some(*id);
            }
            if area == Area::Local {
                break;
            }
            curr = self.scope(s).parent;
        }
        None
    }

    pub fn symbols_in(&self, scope: ScopeId) -> &[SymbolId] {
        &self.scope(scope).symbols
    }

    pub fn get(&self, id: SymbolId) -> &SymbolData {
        &self.symbols[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut SymbolData {
        &mut self.symbols[id.0 as usize]
    }

    fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{context::PtrSize, typeck::ty::BuiltinType};

    fn var(t: BuiltinType) -> SymbolKind {
        SymbolKind::Variable(Variable {
            ty: TypeRef::builtin(t, PtrSize::Bits64),
            kind: VariableKind::Local,
        })
    }

    #[test]
    fn same_scope_duplicates_fail() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        let x = Symbol::intern("x");
        let first = tree.add(root, x, Span::DUMMY, var(BuiltinType::I32)).unwrap();
        let again = tree.add(root, Symbol::intern("X"), Span::DUMMY, var(BuiltinType::F32));
        assert_eq!(again, Err(first));
    }

    #[test]
    fn child_scope_shadows_parent() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        let child = tree.push_scope(root, None);
        let x = Symbol::intern("x");

        let outer = tree.add(root, x, Span::DUMMY, var(BuiltinType::I32)).unwrap();
        let inner = tree.add(child, x, Span::DUMMY, var(BuiltinType::F32)).unwrap();
        assert_ne!(outer, inner);

        assert_eq!(tree.find(child, x, Area::Global), Some(inner));
        assert_eq!(tree.find(root, x, Area::Global), Some(outer));
        assert_eq!(tree.get(inner).scope, child);
    }

    #[test]
    fn lookup_area() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        let child = tree.push_scope(root, None);
        let y = Symbol::intern("y");
        let id = tree.add(root, y, Span::DUMMY, var(BuiltinType::I32)).unwrap();

        assert_eq!(tree.find(child, y, Area::Global), Some(id));
        assert_eq!(tree.find(child, y, Area::Local), None);
        assert_eq!(tree.find(child, Symbol::intern("Y"), Area::Global), Some(id));
    }

    #[test]
    fn owner_is_inherited() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        let f = tree
            .add(root, Symbol::intern("f"), Span::DUMMY, var(BuiltinType::Void))
            .unwrap();
        let body = tree.push_scope(root, Some(f));
        let nested = tree.push_scope(body, None);
        assert_eq!(tree.owner(nested), Some(f));
        assert_eq!(tree.owner(root), None);
        assert_eq!(tree.children(root), &[body]);
    }
}
