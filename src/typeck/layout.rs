use super::ty::{BuiltinType, TypeKind, TypeRef, UserTypeId};
use crate::{context::CompilationContext, context::PtrSize, symbol::ScopeId, symbol::Symbol};
use bitflags::bitflags;

bitflags! {
    /// Operations that need no runtime call for a type.
    pub struct Trivial: u8 {
        const INIT = 0b0001;
        const FINI = 0b0010;
        const COPY = 0b0100;
        const MOVE = 0b1000;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub name: Symbol,
    pub ty: TypeRef,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserType {
    pub name: Symbol,
    pub members: Vec<Member>,
    pub size: usize,
    pub align: usize,
    pub trivial: Trivial,
    /// Namespace holding one symbol per member.
    pub scope: ScopeId,
    laid_out: bool,
}

impl UserType {
    pub fn member(&self, name: Symbol) -> Option<(usize, &Member)> {
        self.members
            .iter()
            .enumerate()
            .find(|(_, m)| m.name.eq_ignore_case(name))
    }

    pub fn is_laid_out(&self) -> bool {
        self.laid_out
    }
}

/// Owns the user-defined types of a unit and sizes every type against the
/// target configuration.
#[derive(Debug, Clone)]
pub struct Types {
    pub ptr: PtrSize,
    member_align: usize,
    user: Vec<UserType>,
}

impl Types {
    pub fn new(ctx: &CompilationContext) -> Self {
        Self {
            ptr: ctx.ptr_size,
            member_align: ctx.member_align.max(1),
            user: vec![],
        }
    }

    pub fn builtin(&self, t: BuiltinType) -> TypeRef {
        TypeRef::builtin(t, self.ptr)
    }

    pub fn array_of(&self, elem: TypeRef) -> TypeRef {
        TypeRef::array_of(elem, self.ptr)
    }

    pub fn user_ref(&self, id: UserTypeId) -> TypeRef {
        TypeRef::user(id, self.get(id).size)
    }

    /// Registers a type whose members are filled in later by `layout`.
    pub fn declare(&mut self, name: Symbol, scope: ScopeId) -> UserTypeId {
        let id = UserTypeId(self.user.len() as u32);
        self.user.push(UserType {
            name,
            members: vec![],
            size: 0,
            align: 1,
            trivial: Trivial::all(),
            scope,
            laid_out: false,
        });
        id
    }

    pub fn get(&self, id: UserTypeId) -> &UserType {
        &self.user[id.0 as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (UserTypeId, &UserType)> {
        self.user
            .iter()
            .enumerate()
            .map(|(i, t)| (UserTypeId(i as u32), t))
    }

    /// Places members at increasing offsets, each aligned to the smaller of
    /// its natural alignment and the target's member alignment.
    pub fn layout(&mut self, id: UserTypeId, fields: Vec<(Symbol, TypeRef)>) {
        let mut offset = 0;
        let mut align = 1;
        let mut trivial = Trivial::all();
        let mut members = Vec::with_capacity(fields.len());

        for (name, ty) in fields {
            let a = self.align_of(&ty).min(self.member_align);
            offset = round_up(offset, a);
            align = align.max(a);
            trivial &= self.trivial_of(&ty);

            let size = self.size_of(&ty);
            members.push(Member {
                name,
                ty: TypeRef { size, ..ty },
                offset,
            });
            offset += size;
        }

        let t = &mut self.user[id.0 as usize];
        t.size = round_up(offset, align);
        t.align = align;
        t.trivial = trivial;
        t.members = members;
        t.laid_out = true;
        log::debug!(
            "laid out type {}: size {}, align {}, trivial {:?}",
            t.name,
            t.size,
            t.align,
            t.trivial
        );
    }

    pub fn size_of(&self, ty: &TypeRef) -> usize {
        match ty.kind {
            TypeKind::Builtin(t) => t.size(self.ptr),
            TypeKind::User(id) => self.get(id).size,
        }
    }

    pub fn align_of(&self, ty: &TypeRef) -> usize {
        match ty.kind {
            TypeKind::Builtin(t) => t.align(self.ptr),
            TypeKind::User(id) => self.get(id).align,
        }
    }

    pub fn trivial_of(&self, ty: &TypeRef) -> Trivial {
        match ty.kind {
            TypeKind::Builtin(BuiltinType::String) | TypeKind::Builtin(BuiltinType::Array) => {
                Trivial::INIT | Trivial::MOVE
            }
            TypeKind::Builtin(_) => Trivial::all(),
            TypeKind::User(id) => self.get(id).trivial,
        }
    }

    /// True if values of `ty` own heap data that must be released.
    pub fn needs_fini(&self, ty: &TypeRef) -> bool {
        !self.trivial_of(ty).contains(Trivial::FINI)
    }

    pub fn name_of(&self, ty: &TypeRef) -> String {
        match ty.kind {
            TypeKind::Builtin(BuiltinType::Array) => match ty.elem() {
                Some(elem) => format!("{}[]", self.name_of(elem)),
                None => "array".to_string(),
            },
            TypeKind::Builtin(BuiltinType::Ptr) => match ty.elem() {
                Some(elem) => format!("pointer to {}", self.name_of(elem)),
                None => "pointer".to_string(),
            },
            TypeKind::Builtin(t) => t.name().to_string(),
            TypeKind::User(id) => self.get(id).name.to_string(),
        }
    }
}

fn round_up(n: usize, align: usize) -> usize {
    (n + align - 1) / align * align
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::ScopeTree;
    use BuiltinType::*;

    fn types(ptr: PtrSize) -> Types {
        Types::new(&CompilationContext::empty(ptr))
    }

    #[test]
    fn members_are_aligned() {
        let mut types = types(PtrSize::Bits64);
        let scope = ScopeTree::new().root();
        let id = types.declare(Symbol::intern("Rec"), scope);
        let fields = vec![
            (Symbol::intern("flag"), types.builtin(Bool)),
            (Symbol::intern("count"), types.builtin(I32)),
            (Symbol::intern("small"), types.builtin(U16)),
            (Symbol::intern("big"), types.builtin(F64)),
        ];
        types.layout(id, fields);

        let rec = types.get(id);
        let offsets: Vec<_> = rec.members.iter().map(|m| m.offset).collect();
        assert_eq!(offsets, vec![0, 4, 8, 16]);
        assert_eq!(rec.size, 24);
        assert_eq!(rec.align, 8);
        assert_eq!(rec.trivial, Trivial::all());
    }

    #[test]
    fn member_alignment_is_capped() {
        let mut types = types(PtrSize::Bits32);
        let scope = ScopeTree::new().root();
        let id = types.declare(Symbol::intern("Packed"), scope);
        let fields = vec![
            (Symbol::intern("a"), types.builtin(U8)),
            (Symbol::intern("b"), types.builtin(F64)),
        ];
        types.layout(id, fields);
        assert_eq!(types.get(id).members[1].offset, 4);
        assert_eq!(types.get(id).size, 12);
    }

    #[test]
    fn strings_make_a_type_non_trivial() {
        let mut types = types(PtrSize::Bits64);
        let scope = ScopeTree::new().root();
        let inner = types.declare(Symbol::intern("Name"), scope);
        let fields = vec![(Symbol::intern("text"), types.builtin(String))];
        types.layout(inner, fields);

        let outer = types.declare(Symbol::intern("Player"), scope);
        let fields = vec![
            (Symbol::intern("id"), types.builtin(I32)),
            (Symbol::intern("name"), types.user_ref(inner)),
        ];
        types.layout(outer, fields);

        let t = types.get(outer).trivial;
        assert!(t.contains(Trivial::INIT | Trivial::MOVE));
        assert!(!t.contains(Trivial::FINI));
        assert!(!t.contains(Trivial::COPY));
        assert!(types.needs_fini(&types.user_ref(outer)));
        assert_eq!(types.get(outer).members[1].offset, 8);
        assert_eq!(types.get(outer).size, 16);
    }
}
