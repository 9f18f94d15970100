use super::{
    cast::{cast_for, CastKind, CastMode},
    hir::FunctionId,
    pattern::{PassBy, Repeat},
    ty::TypeRef,
};
use crate::{lex::Span, symbol::Symbol};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Callee {
    User(FunctionId),
    /// Index into the context's builtin command table.
    Builtin(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSig {
    pub name: Option<Symbol>,
    pub ty: TypeRef,
    pub pass: PassBy,
    pub repeat: Repeat,
}

impl ParamSig {
    pub fn value(ty: TypeRef) -> Self {
        Self {
            name: None,
            ty,
            pass: PassBy::Value,
            repeat: Repeat::Once,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Overload {
    pub params: Vec<ParamSig>,
    pub ret: TypeRef,
    pub callee: Callee,
    pub span: Span,
}

impl Overload {
    /// True if a call with `arity` arguments could bind to this overload.
    pub fn accepts_arity(&self, arity: usize) -> bool {
        let mut min = 0;
        let mut max = Some(0);
        for p in &self.params {
            match p.repeat {
                Repeat::Once => {
                    min += 1;
                    max = max.map(|m| m + 1);
                }
                Repeat::Optional => max = max.map(|m| m + 1),
                Repeat::Variadic => max = None,
                Repeat::OneOrMore => {
                    min += 1;
                    max = None;
                }
            }
        }
        arity >= min && max.map_or(true, |m| arity <= m)
    }
}

/// All declared signatures sharing one callable name, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverloadSet {
    pub overloads: Vec<Overload>,
}

#[derive(Debug, Clone, Copy)]
pub struct Arg<'a> {
    pub ty: &'a TypeRef,
    pub is_lvalue: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    /// Parameter the argument binds to.
    pub param: usize,
    pub cast: CastKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub index: usize,
    /// Number of converting casts the call needs.
    pub cost: usize,
    pub bindings: Vec<Binding>,
}

/// Binds `args` to the parameters of one overload.
pub fn match_overload(overload: &Overload, args: &[Arg<'_>]) -> Option<Vec<Binding>> {
    if !overload.accepts_arity(args.len()) {
        return None;
    }

    let mut bindings = Vec::with_capacity(args.len());
    let mut param = 0;
    for arg in args {
        let p = overload.params.get(param)?;
        if p.pass.needs_lvalue() {
            if !arg.is_lvalue || !arg.ty.is_same(&p.ty) {
                return None;
            }
            bindings.push(Binding {
                param,
                cast: CastKind::None,
            });
        } else {
            let cast = cast_for(arg.ty, &p.ty, CastMode::Input);
            if !cast.is_valid() {
                return None;
            }
            bindings.push(Binding { param, cast });
        }

        if !matches!(p.repeat, Repeat::Variadic | Repeat::OneOrMore) {
            param += 1;
        }
    }
    Some(bindings)
}

/// Picks the overload needing the fewest converting casts. On a tie the
/// first-declared overload wins.
pub fn resolve(set: &OverloadSet, args: &[Arg<'_>]) -> Option<Resolution> {
    let mut best: Option<Resolution> = None;
    for (index, overload) in set.overloads.iter().enumerate() {
        let bindings = match match_overload(overload, args) {
            Some(b) => b,
            None => continue,
        };
        let cost = bindings.iter().filter(|b| b.cast.is_conversion()).count();
        log::trace!("overload #{} matches with {} cast(s)", index, cost);

        if best.as_ref().map_or(true, |b| cost < b.cost) {
            best = Some(Resolution {
                index,
                cost,
                bindings,
            });
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{context::PtrSize, typeck::ty::BuiltinType};
    use BuiltinType::*;

    fn ty(t: BuiltinType) -> TypeRef {
        TypeRef::builtin(t, PtrSize::Bits64)
    }

    fn overload(params: Vec<ParamSig>, n: usize) -> Overload {
        Overload {
            params,
            ret: ty(Void),
            callee: Callee::Builtin(n),
            span: Span::DUMMY,
        }
    }

    fn set(sigs: &[&[BuiltinType]]) -> OverloadSet {
        let overloads = sigs
            .iter()
            .enumerate()
            .map(|(i, params)| {
                overload(params.iter().map(|t| ParamSig::value(ty(*t))).collect(), i)
            })
            .collect();
        OverloadSet { overloads }
    }

    fn call(set: &OverloadSet, args: &[BuiltinType]) -> Option<(usize, usize)> {
        let types: Vec<_> = args.iter().map(|t| ty(*t)).collect();
        let args: Vec<_> = types
            .iter()
            .map(|ty| Arg {
                ty,
                is_lvalue: false,
            })
            .collect();
        resolve(set, &args).map(|r| (r.index, r.cost))
    }

    #[test]
    fn exact_match_wins() {
        let f = set(&[&[I32], &[F32]]);
        assert_eq!(call(&f, &[I32]), Some((0, 0)));
        assert_eq!(call(&f, &[F32]), Some((1, 0)));
    }

    #[test]
    fn ties_go_to_first_declared() {
        let f = set(&[&[I32], &[F32]]);
        assert_eq!(call(&f, &[U8]), Some((0, 1)));
        let g = set(&[&[F32], &[I32]]);
        assert_eq!(call(&g, &[U8]), Some((0, 1)));
    }

    #[test]
    fn fewest_casts_wins() {
        let f = set(&[&[F32, F32], &[I32, F32]]);
        assert_eq!(call(&f, &[I32, I32]), Some((1, 1)));
    }

    #[test]
    fn invalid_casts_exclude_overloads() {
        let f = set(&[&[String], &[I32]]);
        assert_eq!(call(&f, &[F64]), Some((1, 1)));
        assert_eq!(call(&f, &[String]), Some((0, 0)));
        let g = set(&[&[String]]);
        assert_eq!(call(&g, &[I32]), None);
        assert_eq!(call(&g, &[]), None);
    }

    #[test]
    fn repeated_and_optional_params() {
        let mut rest = ParamSig::value(ty(I32));
        rest.repeat = Repeat::OneOrMore;
        let mut opt = ParamSig::value(ty(I32));
        opt.repeat = Repeat::Optional;
        let f = OverloadSet {
            overloads: vec![
                overload(vec![ParamSig::value(ty(I32)), rest], 0),
                overload(vec![ParamSig::value(ty(String)), opt], 1),
            ],
        };
        assert_eq!(call(&f, &[I32]), None);
        assert_eq!(call(&f, &[I32, I32, I32, U8]), Some((0, 1)));
        assert_eq!(call(&f, &[String]), Some((1, 0)));
        assert_eq!(call(&f, &[String, I32]), Some((1, 0)));
        assert_eq!(call(&f, &[String, I32, I32]), None);
    }

    #[test]
    fn reference_params_need_exact_lvalues() {
        let mut p = ParamSig::value(ty(I32));
        p.pass = PassBy::InOutRef;
        let f = OverloadSet {
            overloads: vec![overload(vec![p], 0)],
        };
        let int = ty(I32);
        let byte = ty(U8);
        let lvalue = [Arg {
            ty: &int,
            is_lvalue: true,
        }];
        let rvalue = [Arg {
            ty: &int,
            is_lvalue: false,
        }];
        let wrong = [Arg {
            ty: &byte,
            is_lvalue: true,
        }];
        assert!(resolve(&f, &lvalue).is_some());
        assert!(resolve(&f, &rvalue).is_none());
        assert!(resolve(&f, &wrong).is_none());
    }
}
