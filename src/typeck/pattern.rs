//! The compact signature language module descriptors use for their commands,
//! e.g. `"G G L L?"` for a string function taking a string, an integer and an
//! optional integer.

use super::ty::{BuiltinType, TypeRef};
use crate::context::PtrSize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternType {
    Builtin(BuiltinType),
    /// `H <member>`
    Array(Box<PatternType>),
}

impl PatternType {
    pub fn to_type_ref(&self, ptr: PtrSize) -> TypeRef {
        match self {
            PatternType::Builtin(t) => TypeRef::builtin(*t, ptr),
            PatternType::Array(elem) => TypeRef::array_of(elem.to_type_ref(ptr), ptr),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PassBy {
    Value,
    /// `<`
    ConstRef,
    /// `>`
    OutRef,
    /// `*`
    InOutRef,
}

impl PassBy {
    pub fn is_ref(self) -> bool {
        self != PassBy::Value
    }

    /// References the callee may write through need an l-value.
    pub fn needs_lvalue(self) -> bool {
        matches!(self, PassBy::OutRef | PassBy::InOutRef)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Repeat {
    Once,
    /// `~`: zero or more trailing arguments.
    Variadic,
    /// `+`: one or more trailing arguments.
    OneOrMore,
    /// `?`: may be omitted.
    Optional,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMember {
    pub ty: PatternType,
    pub pass: PassBy,
    pub repeat: Repeat,
}

impl PatternMember {
    pub fn new(ty: PatternType) -> Self {
        Self {
            ty,
            pass: PassBy::Value,
            repeat: Repeat::Once,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternError {
    pub pattern: String,
    pub msg: String,
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid type pattern '{}': {}", self.pattern, self.msg)
    }
}

const SCALAR_CODES: &[(&str, BuiltinType)] = {
    use BuiltinType::*;
    &[
        ("X", Void),
        ("A", Any),
        ("Y", Bool),
        ("C", I8),
        ("B", U8),
        ("N", I16),
        ("W", U16),
        ("L", I32),
        ("D", U32),
        ("R", I64),
        ("U", U64),
        ("K", F16),
        ("F", F32),
        ("O", F64),
        ("P", IPtr),
        ("Pu", UPtr),
        ("M", Ptr),
        ("G", String),
        ("Q", Quatf),
        ("Bn", UNorm8),
        ("Cn", SNorm8),
        ("Wn", UNorm16),
        ("Nn", SNorm16),
        ("Dn", UNorm32),
        ("Ln", SNorm32),
    ]
};

/// Vector and matrix types written as `E <component> <cols> <rows>`.
const COMPOSITE_CODES: &[(&str, u8, u8, BuiltinType)] = {
    use BuiltinType::*;
    &[
        ("L", 2, 1, Vec2i),
        ("L", 3, 1, Vec3i),
        ("L", 4, 1, Vec4i),
        ("F", 2, 1, Vec2f),
        ("F", 3, 1, Vec3f),
        ("F", 4, 1, Vec4f),
        ("O", 2, 1, Vec2d),
        ("O", 3, 1, Vec3d),
        ("O", 4, 1, Vec4d),
        ("F", 2, 2, Mat2f),
        ("F", 3, 3, Mat3f),
        ("F", 4, 4, Mat4f),
        ("O", 2, 2, Mat2d),
        ("O", 3, 3, Mat3d),
        ("O", 4, 4, Mat4d),
    ]
};

/// Splits a pattern into members; the first is the return type.
pub fn parse_type_pattern(pattern: &str) -> Result<Vec<PatternMember>, PatternError> {
    let err = |msg: String| PatternError {
        pattern: pattern.to_string(),
        msg,
    };

    let mut parts = pattern.split_whitespace().peekable();
    let mut members = vec![];
    while parts.peek().is_some() {
        members.push(parse_member(&mut parts).map_err(err)?);
    }

    if members.is_empty() {
        return Err(err("missing return type".to_string()));
    }
    if members[0].pass.is_ref() || members[0].repeat != Repeat::Once {
        return Err(err("return type cannot carry suffixes".to_string()));
    }
    if let Some(pos) = members[1..]
        .iter()
        .position(|m| matches!(m.repeat, Repeat::Variadic | Repeat::OneOrMore))
    {
        if pos + 2 != members.len() {
            return Err(err("repeated parameter must come last".to_string()));
        }
    }
    Ok(members)
}

/// Parses one member, consuming as many parts as it spans.
pub fn parse_member<'s>(
    parts: &mut impl Iterator<Item = &'s str>,
) -> Result<PatternMember, String> {
    let mut pass = PassBy::Value;
    let mut repeat = Repeat::Once;
    let ty = parse_type(parts, &mut pass, &mut repeat)?;
    Ok(PatternMember { ty, pass, repeat })
}

fn parse_type<'s>(
    parts: &mut impl Iterator<Item = &'s str>,
    pass: &mut PassBy,
    repeat: &mut Repeat,
) -> Result<PatternType, String> {
    let part = parts
        .next()
        .ok_or_else(|| "unexpected end of pattern".to_string())?;

    match part {
        "H" => {
            let elem = parse_type(parts, pass, repeat)?;
            Ok(PatternType::Array(Box::new(elem)))
        }
        "E" => {
            let mut next = || {
                parts
                    .next()
                    .ok_or_else(|| "incomplete 'E' member".to_string())
            };
            let component = next()?;
            let cols = next()?;
            let rows = split_suffixes(next()?, pass, repeat)?;

            let (cols, rows): (u8, u8) = match (cols.parse(), rows.parse()) {
                (Ok(c), Ok(r)) => (c, r),
                _ => return Err(format!("bad dimensions '{} {}'", cols, rows)),
            };
            COMPOSITE_CODES
                .iter()
                .find(|(c, cc, rr, _)| *c == component && *cc == cols && *rr == rows)
                .map(|(_, _, _, t)| PatternType::Builtin(*t))
                .ok_or_else(|| format!("no vector type 'E {} {} {}'", component, cols, rows))
        }
        _ => {
            let code = split_suffixes(part, pass, repeat)?;
            SCALAR_CODES
                .iter()
                .find(|(c, _)| *c == code)
                .map(|(_, t)| PatternType::Builtin(*t))
                .ok_or_else(|| format!("unknown type code '{}'", code))
        }
    }
}

/// Strips `<`/`>`/`*` and `~`/`+`/`?` off the end of a part.
fn split_suffixes<'s>(
    part: &'s str,
    pass: &mut PassBy,
    repeat: &mut Repeat,
) -> Result<&'s str, String> {
    let mut code = part;
    if let Some(c) = code.chars().last() {
        let r = match c {
            '~' => Some(Repeat::Variadic),
            '+' => Some(Repeat::OneOrMore),
            '?' => Some(Repeat::Optional),
            _ => None,
        };
        if let Some(r) = r {
            *repeat = r;
            code = &code[..code.len() - 1];
        }
    }
    if let Some(c) = code.chars().last() {
        let p = match c {
            '<' => Some(PassBy::ConstRef),
            '>' => Some(PassBy::OutRef),
            '*' => Some(PassBy::InOutRef),
            _ => None,
        };
        if let Some(p) = p {
            *pass = p;
            code = &code[..code.len() - 1];
        }
    }
    if code.is_empty() {
        return Err(format!("suffix without a type in '{}'", part));
    }
    Ok(code)
}

pub fn format_type_pattern(members: &[PatternMember]) -> String {
    members
        .iter()
        .map(format_member)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn format_member(member: &PatternMember) -> String {
    let mut s = String::new();
    format_type(&member.ty, &mut s);
    s.push_str(match member.pass {
        PassBy::Value => "",
        PassBy::ConstRef => "<",
        PassBy::OutRef => ">",
        PassBy::InOutRef => "*",
    });
    s.push_str(match member.repeat {
        Repeat::Once => "",
        Repeat::Variadic => "~",
        Repeat::OneOrMore => "+",
        Repeat::Optional => "?",
    });
    s
}

fn format_type(ty: &PatternType, out: &mut String) {
    match ty {
        PatternType::Array(elem) => {
            out.push_str("H ");
            format_type(elem, out);
        }
        PatternType::Builtin(t) => {
            if let Some((code, _)) = SCALAR_CODES.iter().find(|(_, s)| s == t) {
                out.push_str(code);
            } else if let Some((c, cols, rows, _)) =
                COMPOSITE_CODES.iter().find(|(_, _, _, s)| s == t)
            {
                out.push_str(&format!("E {} {} {}", c, cols, rows));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BuiltinType::*;

    #[test]
    fn parses_members() {
        let m = parse_type_pattern("G G L L?").unwrap();
        assert_eq!(m.len(), 4);
        assert_eq!(m[0].ty, PatternType::Builtin(String));
        assert_eq!(m[3].repeat, Repeat::Optional);

        let m = parse_type_pattern("X H F< E F 3 1* Bn~").unwrap();
        assert_eq!(
            m[1],
            PatternMember {
                ty: PatternType::Array(Box::new(PatternType::Builtin(F32))),
                pass: PassBy::ConstRef,
                repeat: Repeat::Once,
            }
        );
        assert_eq!(m[2].ty, PatternType::Builtin(Vec3f));
        assert_eq!(m[2].pass, PassBy::InOutRef);
        assert_eq!(m[3].ty, PatternType::Builtin(UNorm8));
        assert_eq!(m[3].repeat, Repeat::Variadic);
    }

    #[test]
    fn round_trips() {
        let patterns = [
            "X",
            "L L L",
            "G G L L?",
            "X L* L*",
            "X H G<",
            "E O 4 4 E O 4 4 E O 4 4",
            "Q F F F F",
            "X Pu M P",
            "L Bn Cn Wn Nn Dn Ln",
            "E L 2 1 H E F 3 1>",
            "L L+",
            "X A~",
            "Y K O R U C N W D",
        ];
        for p in patterns.iter() {
            let members = parse_type_pattern(p).unwrap();
            assert_eq!(format_type_pattern(&members), *p);
        }
    }

    #[test]
    fn rejects_bad_patterns() {
        assert!(parse_type_pattern("").is_err());
        assert!(parse_type_pattern("Z").is_err());
        assert!(parse_type_pattern("L* L").is_err());
        assert!(parse_type_pattern("X E F 3").is_err());
        assert!(parse_type_pattern("X E F 3 3").is_ok());
        assert!(parse_type_pattern("X E F 3 2").is_err());
        assert!(parse_type_pattern("X L~ L").is_err());
        assert!(parse_type_pattern("X ~").is_err());
    }

    #[test]
    fn members_map_to_types() {
        let m = parse_type_pattern("X H L").unwrap();
        let ty = m[1].ty.to_type_ref(PtrSize::Bits64);
        assert!(ty.is_array());
        assert!(ty.elem().map_or(false, |e| e.is(I32)));
    }
}
