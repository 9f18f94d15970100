use super::token::{Keywords, LiteralKind, NumberValue, TokenFlags};
use crate::{
    err::Handler,
    lex::{Span, Token, TokenKind, TokenKind::*},
    symbol::Symbol,
};
use std::{collections::VecDeque, rc::Rc};

/// Pull-model tokenizer.
///
/// Besides scanning, the lexer reshapes the statement structure of a line:
/// `:` separators and single-line `if ... then` bodies are turned into
/// line-starting tokens, and an implicit `endif` is synthesized at the end of
/// every line that opened a single-line `if`.
pub struct Lexer<'a> {
    src: Rc<str>,
    keywords: &'a Keywords,
    handler: Rc<Handler>,
    start_pos: usize,
    pos: usize,
    /// Every token produced so far; `unget` moves the cursor back into it.
    tokens: Vec<Token>,
    cursor: usize,
    virtual_tokens: VecDeque<Token>,
    at_line_start: bool,
    /// The `if`/`elseif` that may still be followed by `then` on this line.
    line_if: Option<TokenKind>,
    /// Single-line `if`s waiting for their synthesized `endif`.
    open_line_ifs: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: Rc<str>, keywords: &'a Keywords, handler: &Rc<Handler>) -> Self {
        Self {
            src,
            keywords,
            handler: handler.clone(),
            start_pos: 0,
            pos: 0,
            tokens: vec![],
            cursor: 0,
            virtual_tokens: VecDeque::new(),
            at_line_start: true,
            line_if: None,
            open_line_ifs: 0,
        }
    }

    /// Returns the next token; keeps returning `Eof` once the input is exhausted.
    pub fn next(&mut self) -> Token {
        if self.cursor == self.tokens.len() {
            let t = self.produce();
            log::trace!("token {:?} {:?} {:?}", t.kind, t.symbol, t.flags);
            self.tokens.push(t);
        }
        let t = self.tokens[self.cursor].clone();
        self.cursor += 1;
        t
    }

    /// Pushes the last returned token back. May be chained to back up
    /// several tokens.
    pub fn unget(&mut self) {
        assert!(self.cursor > 0, "unget before next");
        self.cursor -= 1;
    }

    pub fn peek(&mut self) -> Token {
        let t = self.next();
        self.unget();
        t
    }

    /// Looks `dist` tokens ahead (1 is the next token) without consuming.
    pub fn look_ahead(&mut self, dist: usize) -> Token {
        assert!(dist > 0);
        let mut t = Token::dummy();
        for _ in 0..dist {
            t = self.next();
        }
        for _ in 0..dist {
            self.unget();
        }
        t
    }

    pub fn tokenize(mut self) -> Vec<Token> {
        loop {
            if self.next().is_eof() {
                break;
            }
        }
        self.tokens
    }

    fn produce(&mut self) -> Token {
        loop {
            if let Some(t) = self.virtual_tokens.pop_front() {
                return t;
            }

            if self.eof() {
                self.start_pos = self.pos;
                if self.close_line_ifs() {
                    continue;
                }
                let mut t = Token::new(Eof, Symbol::intern(""), self.mk_span());
                t.flags = TokenFlags::STARTS_LINE;
                return t;
            }

            self.start_pos = self.pos;
            if let Some(t) = self.scan_token() {
                return self.finish(t);
            }
        }
    }

    fn finish(&mut self, mut t: Token) -> Token {
        if self.at_line_start {
            t.flags |= TokenFlags::STARTS_LINE;
            self.at_line_start = false;
        }
        // In a single-line `if`, `else` closes the `then` part and opens a
        // statement of its own.
        if t.kind == Else && self.open_line_ifs > 0 {
            t.flags |= TokenFlags::STARTS_LINE;
            self.at_line_start = true;
        }
        t
    }

    fn scan_token(&mut self) -> Option<Token> {
        let c = self.peek_byte();
        self.advance();
        let t = match c {
            b'\n' => {
                self.newline();
                return None;
            }
            b' ' | b'\t' | b'\r' => return None,
            b'\\' if self.rest_of_line_blank() => {
                self.continue_line();
                return None;
            }
            b'`' => {
                self.line_comment();
                return None;
            }
            b'(' => self.add_token(OpenParen),
            b')' => self.add_token(CloseParen),
            b'[' => self.add_token(OpenSquare),
            b']' => self.add_token(CloseSquare),
            b',' => self.add_token(Comma),
            b'.' => {
                if self.peek_byte().is_ascii_digit() {
                    return self.number(c);
                }
                self.add_token(Dot)
            }
            b':' => return self.colon(),
            b'"' => return self.string(),
            b'+' => {
                if self.eat(b'=') {
                    self.add_token(PlusEq)
                } else {
                    self.add_token(Plus)
                }
            }
            b'-' => {
                if self.eat(b'=') {
                    self.add_token(MinusEq)
                } else {
                    self.add_token(Minus)
                }
            }
            b'*' => {
                if self.eat(b'=') {
                    self.add_token(StarEq)
                } else {
                    self.add_token(Star)
                }
            }
            b'/' => {
                if self.eat(b'/') {
                    self.line_comment();
                    return None;
                } else if self.eat(b'*') {
                    self.block_comment("*/");
                    return None;
                } else if self.eat(b'=') {
                    self.add_token(SlashEq)
                } else {
                    self.add_token(Slash)
                }
            }
            b'%' => self.add_token(Percent),
            b'^' => {
                if self.eat(b'^') {
                    self.add_token(CaretCaret)
                } else {
                    self.add_token(Caret)
                }
            }
            b'&' => {
                if self.eat(b'&') {
                    self.add_token(AndAnd)
                } else {
                    self.add_token(Amp)
                }
            }
            b'|' => {
                if self.eat(b'|') {
                    self.add_token(OrOr)
                } else {
                    self.add_token(Pipe)
                }
            }
            b'~' => self.add_token(Tilde),
            b'!' => {
                if self.eat(b'=') {
                    self.add_token(Ne)
                } else {
                    self.add_token(Not)
                }
            }
            b'=' => {
                if self.eat(b'=') {
                    self.add_token(EqEq)
                } else {
                    self.add_token(Eq)
                }
            }
            b'<' => {
                if self.eat(b'=') {
                    self.add_token(Le)
                } else if self.eat(b'>') {
                    self.add_token(Ne)
                } else if self.eat(b'<') {
                    self.add_token(Shl)
                } else {
                    self.add_token(Lt)
                }
            }
            b'>' => {
                if self.eat(b'=') {
                    self.add_token(Ge)
                } else if self.eat(b'>') {
                    self.add_token(Shr)
                } else {
                    self.add_token(Gt)
                }
            }
            c if c.is_ascii_digit() => return self.number(c),
            c if is_ident_start(c) => return self.ident(),
            c => {
                let ch = if c.is_ascii() {
                    c as char
                } else {
                    // Skip the whole UTF-8 sequence so it is reported once.
                    let ch = self.src[self.start_pos..].chars().next().unwrap_or('?');
                    self.pos = self.start_pos + ch.len_utf8();
                    ch
                };
                self.handler
                    .report(self.mk_span(), &format!("Unexpected character '{}'", ch));
                return None;
            }
        };
        Some(t)
    }

    fn newline(&mut self) {
        self.close_line_ifs();
        self.at_line_start = true;
        self.line_if = None;
    }

    /// Queues one `endif` per single-line `if` opened on the current line.
    fn close_line_ifs(&mut self) -> bool {
        if self.open_line_ifs == 0 {
            return false;
        }

        log::trace!("closing {} single-line if(s)", self.open_line_ifs);
        let span = Span::new(self.start_pos, self.start_pos);
        for _ in 0..self.open_line_ifs {
            let mut t = Token::new(EndIf, Symbol::intern("endif"), span);
            t.flags = TokenFlags::STARTS_LINE | TokenFlags::VIRTUAL;
            self.virtual_tokens.push_back(t);
        }
        self.open_line_ifs = 0;
        true
    }

    /// Joins the next physical line onto the current one.
    fn continue_line(&mut self) {
        while !self.eof() && self.peek_byte() != b'\n' {
            self.advance();
        }
        if !self.eof() {
            self.advance();
        }
    }

    fn colon(&mut self) -> Option<Token> {
        let after_line_name = matches!(
            self.tokens.last(),
            Some(t) if t.kind == Ident && t.starts_line() && self.virtual_tokens.is_empty()
        );
        if after_line_name && !self.at_line_start && self.rest_of_line_blank() {
            // `name:` alone on a line declares a label.
            return Some(self.add_token(Colon));
        }

        // Otherwise a statement separator.
        self.at_line_start = true;
        None
    }

    fn then_keyword(&mut self) {
        let opener = match self.line_if.take() {
            Some(kind) => kind,
            None => {
                self.handler
                    .report(self.mk_span(), "'then' without a preceding 'if'");
                return;
            }
        };

        if self.rest_of_line_blank() {
            // Block form; the body follows on the next lines.
            return;
        }

        if opener == If {
            self.open_line_ifs += 1;
        }
        self.at_line_start = true;
    }

    fn add_token(&mut self, kind: TokenKind) -> Token {
        let symbol = self.mk_symbol();
        Token::new(kind, symbol, self.mk_span())
    }

    fn mk_span(&self) -> Span {
        Span::new(self.start_pos, self.pos)
    }

    fn mk_symbol(&self) -> Symbol {
        Symbol::intern(&self.src[self.start_pos..self.pos])
    }

    fn eat(&mut self, c: u8) -> bool {
        if self.peek_byte() == c {
            self.advance();
            true
        } else {
            false
        }
    }

    fn string(&mut self) -> Option<Token> {
        loop {
            match self.peek_byte() {
                b'"' if self.peek_next() == b'"' => {
                    self.advance();
                    self.advance();
                }
                b'"' => {
                    self.advance();
                    break;
                }
                _ if self.eof() || self.peek_byte() == b'\n' => {
                    self.handler.report(self.mk_span(), "Unterminated string");
                    return None;
                }
                _ => self.advance(),
            }
        }

        let text = self.src[self.start_pos + 1..self.pos - 1].replace("\"\"", "\"");
        Some(Token::new(
            Literal {
                kind: LiteralKind::Str,
            },
            Symbol::intern(&text),
            self.mk_span(),
        ))
    }

    fn number(&mut self, first: u8) -> Option<Token> {
        let mut radix = 10;
        let mut is_float = first == b'.';
        let mut digits_start = self.start_pos;

        if first == b'0' && matches!(self.peek_byte(), b'x' | b'X') {
            self.advance();
            radix = 16;
            digits_start = self.pos;
            while self.peek_byte().is_ascii_hexdigit() {
                self.advance();
            }
        } else if first == b'0'
            && matches!(self.peek_byte(), b'b' | b'B')
            && matches!(self.peek_next(), b'0' | b'1')
        {
            self.advance();
            radix = 2;
            digits_start = self.pos;
            while matches!(self.peek_byte(), b'0' | b'1') {
                self.advance();
            }
        } else {
            while self.peek_byte().is_ascii_digit() {
                self.advance();
            }
            if !is_float && self.peek_byte() == b'.' && self.peek_next().is_ascii_digit() {
                is_float = true;
                self.advance();
                while self.peek_byte().is_ascii_digit() {
                    self.advance();
                }
            }
            if matches!(self.peek_byte(), b'e' | b'E') {
                let sign = matches!(self.peek_next(), b'+' | b'-');
                let digit_at = if sign { self.pos + 2 } else { self.pos + 1 };
                if self.byte_at(digit_at).is_ascii_digit() {
                    is_float = true;
                    self.pos = digit_at;
                    while self.peek_byte().is_ascii_digit() {
                        self.advance();
                    }
                }
            }
        }
        let digits_end = self.pos;

        let kind = match self.peek_byte() {
            b'u' | b'U' if !is_float => {
                self.advance();
                LiteralKind::UInt
            }
            b'f' | b'F' if radix == 10 => {
                self.advance();
                LiteralKind::Float
            }
            b'd' | b'D' if radix == 10 => {
                self.advance();
                LiteralKind::Double
            }
            _ if is_float => LiteralKind::Float,
            _ => LiteralKind::Int,
        };

        if is_ident_continue(self.peek_byte()) || digits_end == digits_start {
            while is_ident_continue(self.peek_byte()) {
                self.advance();
            }
            self.handler
                .report(self.mk_span(), "Malformed number literal");
            return None;
        }

        let digits = &self.src[digits_start..digits_end];
        let value = match kind {
            LiteralKind::Float | LiteralKind::Double if radix == 10 => {
                match digits.parse::<f64>() {
                    Ok(v) => NumberValue::Float(v),
                    Err(_) => {
                        self.handler
                            .report(self.mk_span(), "Malformed number literal");
                        return None;
                    }
                }
            }
            _ => match u64::from_str_radix(digits, radix) {
                Ok(v) if matches!(kind, LiteralKind::Float | LiteralKind::Double) => {
                    NumberValue::Float(v as f64)
                }
                Ok(v) => NumberValue::Int(v),
                Err(_) => {
                    self.handler
                        .report(self.mk_span(), "Integer literal too large");
                    return None;
                }
            },
        };

        let mut t = self.add_token(Literal { kind });
        t.value = value;
        Some(t)
    }

    fn ident(&mut self) -> Option<Token> {
        while is_ident_continue(self.peek_byte()) {
            self.advance();
        }
        let has_suffix = matches!(self.peek_byte(), b'#' | b'$');
        if has_suffix {
            self.advance();
        }

        if !has_suffix {
            let word = &self.src[self.start_pos..self.pos];
            if word.eq_ignore_ascii_case("rem") {
                self.line_comment();
                return None;
            }
            if word.eq_ignore_ascii_case("remstart") {
                self.block_comment("remend");
                return None;
            }
        }

        let symbol = self.mk_symbol();
        let mut kind = if has_suffix {
            Ident
        } else {
            self.keywords.get(symbol).unwrap_or(Ident)
        };

        match kind {
            Then => {
                self.then_keyword();
                return None;
            }
            If | ElseIf => self.line_if = Some(kind),
            _ => {}
        }

        if let Some(op) = kind.named_operator() {
            log::trace!("named operator '{}' -> {}", symbol, op);
            kind = op;
        }

        Some(Token::new(kind, symbol, self.mk_span()))
    }

    fn line_comment(&mut self) {
        while !self.eof() && self.peek_byte() != b'\n' {
            self.advance();
        }
    }

    fn block_comment(&mut self, terminator: &str) {
        let rest = self.src[self.pos..].to_ascii_lowercase();
        let (body_len, end) = match rest.find(terminator) {
            Some(i) => (i, self.pos + i + terminator.len()),
            None => {
                self.handler
                    .report(self.mk_span(), "Unterminated block comment");
                (rest.len(), self.src.len())
            }
        };

        let spans_lines = rest[..body_len].contains('\n');
        self.pos = end;
        if spans_lines {
            self.newline();
        }
    }

    /// True if nothing but blanks or a comment remains on the current line.
    fn rest_of_line_blank(&self) -> bool {
        let bytes = self.src.as_bytes();
        let mut i = self.pos;
        while i < bytes.len() && matches!(bytes[i], b' ' | b'\t' | b'\r') {
            i += 1;
        }
        if i >= bytes.len() {
            return true;
        }

        let rest = &self.src[i..];
        if rest.starts_with('\n') || rest.starts_with("//") || rest.starts_with('`') {
            return true;
        }

        let word_len = rest
            .bytes()
            .take_while(|b| is_ident_continue(*b))
            .count();
        rest[..word_len].eq_ignore_ascii_case("rem")
    }

    fn eof(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn byte_at(&self, pos: usize) -> u8 {
        self.src.as_bytes().get(pos).copied().unwrap_or_default()
    }

    fn peek_byte(&self) -> u8 {
        self.byte_at(self.pos)
    }

    fn peek_next(&self) -> u8 {
        self.byte_at(self.pos + 1)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }
}

fn is_ident_start(c: u8) -> bool {
    matches!(c, b'a'..=b'z' | b'A'..=b'Z' | b'_')
}

fn is_ident_continue(c: u8) -> bool {
    matches!(c, b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'0'..=b'9')
}
