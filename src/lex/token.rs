use crate::lex::Span;
use crate::symbol::Symbol;
use bitflags::bitflags;
use std::{collections::HashMap, fmt};

bitflags! {
    pub struct TokenFlags: u8 {
        /// First token of a statement: follows a newline, a `:` separator or
        /// a reshaped `then`/`else`.
        const STARTS_LINE = 0b01;
        /// Synthesized by the lexer rather than scanned from the source.
        const VIRTUAL = 0b10;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub symbol: Symbol,
    pub span: Span,
    pub flags: TokenFlags,
    pub value: NumberValue,
}

impl Token {
    pub fn new(kind: TokenKind, symbol: Symbol, span: Span) -> Self {
        Self {
            kind,
            symbol,
            span,
            flags: TokenFlags::empty(),
            value: NumberValue::None,
        }
    }

    pub fn dummy() -> Self {
        Self::new(TokenKind::Eof, Symbol::intern(""), Span::DUMMY)
    }

    pub fn starts_line(&self) -> bool {
        self.flags.contains(TokenFlags::STARTS_LINE)
    }

    pub fn is_virtual(&self) -> bool {
        self.flags.contains(TokenFlags::VIRTUAL)
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}

/// Decoded payload of a numeric literal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumberValue {
    None,
    Int(u64),
    Float(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiteralKind {
    Str,
    Int,
    /// Integer with a `u` suffix.
    UInt,
    Float,
    /// Float with a `d` suffix.
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Punctuation.
    OpenParen,
    CloseParen,
    OpenSquare,
    CloseSquare,
    Comma,
    Dot,
    Colon,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Amp,
    Pipe,
    Tilde,
    Not,
    AndAnd,
    OrOr,
    CaretCaret,
    Shl,
    Shr,

    // Comparison and assignment.
    Eq,
    EqEq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,

    // Literals.
    Ident,
    Literal { kind: LiteralKind },

    // Keywords.
    If,
    Then,
    ElseIf,
    Else,
    EndIf,
    Select,
    Case,
    Default,
    EndCase,
    EndSelect,
    Fallthrough,
    Do,
    Loop,
    While,
    EndWhile,
    Repeat,
    Until,
    For,
    To,
    Step,
    Next,
    Exit,
    Continue,
    Goto,
    Return,
    Function,
    EndFunction,
    Type,
    EndType,
    As,
    ByRef,
    Local,
    Global,
    Dim,
    True,
    False,
    End,

    // Named operators, rewritten to punctuation as they are scanned.
    KwAnd,
    KwOr,
    KwXor,
    KwNot,
    KwMod,
    KwShl,
    KwShr,

    Eof,
}

impl TokenKind {
    /// The punctuation operator a named operator stands for.
    pub fn named_operator(self) -> Option<TokenKind> {
        use TokenKind::*;
        match self {
            KwAnd => Some(AndAnd),
            KwOr => Some(OrOr),
            KwXor => Some(CaretCaret),
            KwNot => Some(Not),
            KwMod => Some(Percent),
            KwShl => Some(Shl),
            KwShr => Some(Shr),
            _ => None,
        }
    }

    pub fn is_keyword(self) -> bool {
        use TokenKind::*;
        !matches!(
            self,
            OpenParen
                | CloseParen
                | OpenSquare
                | CloseSquare
                | Comma
                | Dot
                | Colon
                | Plus
                | Minus
                | Star
                | Slash
                | Percent
                | Caret
                | Amp
                | Pipe
                | Tilde
                | Not
                | AndAnd
                | OrOr
                | CaretCaret
                | Shl
                | Shr
                | Eq
                | EqEq
                | Ne
                | Lt
                | Gt
                | Le
                | Ge
                | PlusEq
                | MinusEq
                | StarEq
                | SlashEq
                | Ident
                | Literal { .. }
                | Eof
        )
    }

    pub fn is_op_assign(self) -> bool {
        use TokenKind::*;
        matches!(self, PlusEq | MinusEq | StarEq | SlashEq)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TokenKind::*;
        let s = match self {
            OpenParen => "(",
            CloseParen => ")",
            OpenSquare => "[",
            CloseSquare => "]",
            Comma => ",",
            Dot => ".",
            Colon => ":",
            Plus => "+",
            Minus => "-",
            Star => "*",
            Slash => "/",
            Percent => "%",
            Caret => "^",
            Amp => "&",
            Pipe => "|",
            Tilde => "~",
            Not => "!",
            AndAnd => "&&",
            OrOr => "||",
            CaretCaret => "^^",
            Shl => "<<",
            Shr => ">>",
            Eq => "=",
            EqEq => "==",
            Ne => "<>",
            Lt => "<",
            Gt => ">",
            Le => "<=",
            Ge => ">=",
            PlusEq => "+=",
            MinusEq => "-=",
            StarEq => "*=",
            SlashEq => "/=",
            Ident => "identifier",
            Literal { kind: LiteralKind::Str } => "string literal",
            Literal { .. } => "number",
            Eof => "end of input",
            kw => return write!(f, "'{}'", Keywords::spelling(*kw)),
        };
        f.write_str(s)
    }
}

/// Case-insensitive keyword dictionary.
#[derive(Debug, Clone)]
pub struct Keywords {
    map: HashMap<Symbol, TokenKind>,
}

const KEYWORDS: &[(&str, TokenKind)] = &[
    ("if", TokenKind::If),
    ("then", TokenKind::Then),
    ("elseif", TokenKind::ElseIf),
    ("else", TokenKind::Else),
    ("endif", TokenKind::EndIf),
    ("select", TokenKind::Select),
    ("case", TokenKind::Case),
    ("default", TokenKind::Default),
    ("endcase", TokenKind::EndCase),
    ("endselect", TokenKind::EndSelect),
    ("fallthrough", TokenKind::Fallthrough),
    ("do", TokenKind::Do),
    ("loop", TokenKind::Loop),
    ("while", TokenKind::While),
    ("endwhile", TokenKind::EndWhile),
    ("repeat", TokenKind::Repeat),
    ("until", TokenKind::Until),
    ("for", TokenKind::For),
    ("to", TokenKind::To),
    ("step", TokenKind::Step),
    ("next", TokenKind::Next),
    ("exit", TokenKind::Exit),
    ("continue", TokenKind::Continue),
    ("goto", TokenKind::Goto),
    ("return", TokenKind::Return),
    ("function", TokenKind::Function),
    ("endfunction", TokenKind::EndFunction),
    ("type", TokenKind::Type),
    ("endtype", TokenKind::EndType),
    ("as", TokenKind::As),
    ("byref", TokenKind::ByRef),
    ("local", TokenKind::Local),
    ("global", TokenKind::Global),
    ("dim", TokenKind::Dim),
    ("true", TokenKind::True),
    ("false", TokenKind::False),
    ("end", TokenKind::End),
    ("and", TokenKind::KwAnd),
    ("or", TokenKind::KwOr),
    ("xor", TokenKind::KwXor),
    ("not", TokenKind::KwNot),
    ("mod", TokenKind::KwMod),
    ("shl", TokenKind::KwShl),
    ("shr", TokenKind::KwShr),
];

impl Default for Keywords {
    fn default() -> Self {
        Self::new()
    }
}

impl Keywords {
    pub fn new() -> Self {
        let map = KEYWORDS
            .iter()
            .map(|(s, kind)| (Symbol::intern(s), *kind))
            .collect();
        Self { map }
    }

    /// Looks up an identifier, ignoring case.
    pub fn get(&self, symbol: Symbol) -> Option<TokenKind> {
        self.map.get(&symbol.fold()).copied()
    }

    pub fn spelling(kind: TokenKind) -> &'static str {
        KEYWORDS
            .iter()
            .find(|(_, k)| *k == kind)
            .map(|(s, _)| *s)
            .unwrap_or("?")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_lookup_ignores_case() {
        let kw = Keywords::new();
        assert_eq!(kw.get(Symbol::intern("EndIf")), Some(TokenKind::EndIf));
        assert_eq!(kw.get(Symbol::intern("WHILE")), Some(TokenKind::While));
        assert_eq!(kw.get(Symbol::intern("whilst")), None);
    }

    #[test]
    fn named_operators_map_to_punctuation() {
        assert_eq!(TokenKind::KwMod.named_operator(), Some(TokenKind::Percent));
        assert_eq!(TokenKind::KwAnd.named_operator(), Some(TokenKind::AndAnd));
        assert_eq!(TokenKind::Plus.named_operator(), None);
    }
}
