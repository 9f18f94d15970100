mod scan;
mod span;
mod token;

pub use scan::Lexer;
pub use span::{LineIndex, Span, Spanned};
pub use token::{Keywords, LiteralKind, NumberValue, Token, TokenFlags, TokenKind};
