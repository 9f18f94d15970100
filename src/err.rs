use crate::lex::{LineIndex, Span};
use std::{cell::RefCell, fmt, rc::Rc};

pub type Result<T> = std::result::Result<T, ()>;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
            Severity::Note => f.write_str("note"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub filename: Rc<str>,
    pub line: usize,
    pub column: usize,
    pub severity: Severity,
    pub message: String,
    pub span: Span,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}: {}",
            self.filename, self.line, self.column, self.severity, self.message
        )
    }
}

/// Collects diagnostics for one compilation unit and echoes them with a caret
/// line under the offending source text.
pub struct Handler {
    filename: Rc<str>,
    src: Rc<str>,
    lines: LineIndex,
    diagnostics: RefCell<Vec<Diagnostic>>,
    echo: bool,
}

impl Handler {
    pub fn new(filename: &str, src: &Rc<str>) -> Self {
        Self {
            filename: filename.into(),
            src: src.clone(),
            lines: LineIndex::new(src),
            diagnostics: RefCell::new(vec![]),
            echo: true,
        }
    }

    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    pub fn raise<T>(&self, span: Span, msg: &str) -> Result<T> {
        self.report(span, msg);
        Err(())
    }

    pub fn mk_err<T>(&self, span: Span, msg: &str) -> Result<T> {
        self.raise(span, msg)
    }

    pub fn report(&self, span: Span, msg: &str) {
        self.emit(span, Severity::Error, msg);
    }

    pub fn warn(&self, span: Span, msg: &str) {
        self.emit(span, Severity::Warning, msg);
    }

    pub fn note(&self, span: Span, msg: &str) {
        self.emit(span, Severity::Note, msg);
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .borrow()
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.borrow().clone()
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn line_col(&self, span: Span) -> (usize, usize) {
        self.lines.line_col(self.clamp(span).lo())
    }

    fn clamp(&self, span: Span) -> Span {
        let len = self.src.len();
        if span.lo() >= len {
            Span::new(len.saturating_sub(1), len)
        } else {
            span
        }
    }

    fn emit(&self, span: Span, severity: Severity, msg: &str) {
        let span = self.clamp(span);
        let (line, column) = self.lines.line_col(span.lo());
        let diagnostic = Diagnostic {
            filename: self.filename.clone(),
            line,
            column,
            severity,
            message: msg.to_string(),
            span,
        };
        log::debug!("diagnostic: {}", diagnostic);

        if self.echo {
            self.print(&diagnostic);
        }
        self.diagnostics.borrow_mut().push(diagnostic);
    }

    fn print(&self, d: &Diagnostic) {
        eprintln!("{}", d);
        if self.src.is_empty() {
            return;
        }

        let lo = self.lines.line_start(d.line);
        let hi = self.src[lo..]
            .find('\n')
            .map(|i| lo + i)
            .unwrap_or(self.src.len());
        let line = &self.src[lo..hi];
        let width = d.span.hi().min(hi).saturating_sub(d.span.lo()).max(1);
        eprintln!("{}", line);
        eprintln!("{}{}", " ".repeat(d.span.lo() - lo), "^".repeat(width));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_position() {
        let src: Rc<str> = "a = 1\nb = ?\n".into();
        let handler = Handler::new("test.dba", &src).quiet();
        let r: Result<()> = handler.raise(Span::new(10, 11), "Unexpected char");
        assert!(r.is_err());

        let diags = handler.diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].line, 2);
        assert_eq!(diags[0].column, 5);
        assert_eq!(diags[0].severity, Severity::Error);
        assert_eq!(&*diags[0].filename, "test.dba");
        assert!(handler.has_errors());
    }

    #[test]
    fn warnings_are_not_errors() {
        let src: Rc<str> = "x".into();
        let handler = Handler::new("w.dba", &src).quiet();
        handler.warn(Span::new(0, 1), "unused");
        assert!(!handler.has_errors());
        assert_eq!(handler.diagnostics().len(), 1);
    }
}
