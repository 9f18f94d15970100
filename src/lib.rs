pub mod codegen;
pub mod context;
pub mod err;
pub mod ir;
pub mod lex;
pub mod parse;
pub mod symbol;
pub mod typeck;
pub mod util;

pub use self::util::args::{Args, Emit};

use self::{
    context::CompilationContext,
    err::{Diagnostic, Handler},
    lex::{Lexer, Token},
    parse::{ast, Parser},
};
use std::rc::Rc;

/// Outcome of compiling one unit: the module, if every stage succeeded, and
/// everything reported along the way.
pub struct Unit {
    pub module: Result<ir::Module, ()>,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct Compiler {
    ctx: CompilationContext,
    quiet: bool,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self::with_context(CompilationContext::default())
    }

    pub fn with_context(ctx: CompilationContext) -> Self {
        Self { ctx, quiet: false }
    }

    /// Keeps diagnostics in the unit instead of echoing them to stderr.
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    pub fn context(&self) -> &CompilationContext {
        &self.ctx
    }

    pub fn run(&mut self, src: &str) -> Result<ir::Module, ()> {
        self.compile_unit("<input>", src).module
    }

    pub fn compile_unit(&self, filename: &str, src: &str) -> Unit {
        let (src, handler) = self.handler(filename, src);
        let module = self.compile(filename, src, &handler);
        Unit {
            module,
            diagnostics: handler.diagnostics(),
        }
    }

    pub fn tokens(&self, filename: &str, src: &str) -> Result<Vec<Token>, ()> {
        let (src, handler) = self.handler(filename, src);
        let tokens = Lexer::new(src, &self.ctx.keywords, &handler).tokenize();
        if handler.has_errors() {
            return Err(());
        }
        Ok(tokens)
    }

    pub fn parse(&self, filename: &str, src: &str) -> Result<ast::Program, ()> {
        let (src, handler) = self.handler(filename, src);
        self.parse_with(src, &handler)
    }

    fn handler(&self, filename: &str, src: &str) -> (Rc<str>, Rc<Handler>) {
        let src: Rc<str> = src.into();
        let handler = Handler::new(filename, &src);
        let handler = if self.quiet { handler.quiet() } else { handler };
        (src, Rc::new(handler))
    }

    fn parse_with(&self, src: Rc<str>, handler: &Rc<Handler>) -> Result<ast::Program, ()> {
        let mut parser = Parser::new(src, &self.ctx, handler);
        match parser.parse() {
            Some(program) if !handler.has_errors() => Ok(program),
            _ => Err(()),
        }
    }

    fn compile(
        &self,
        filename: &str,
        src: Rc<str>,
        handler: &Rc<Handler>,
    ) -> Result<ir::Module, ()> {
        let ast = self.parse_with(src, handler)?;
        let program = typeck::check(&ast, &self.ctx, handler)?;
        let module = codegen::emit(&program, handler, filename)?;
        log::debug!(
            "{}: {} function(s), {} global(s)",
            filename,
            module.functions.len(),
            module.globals.len()
        );
        Ok(module)
    }
}
