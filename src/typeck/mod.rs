pub mod cast;
pub mod hir;
pub mod layout;
pub mod overload;
pub mod pattern;
pub mod ty;

mod annotate;
mod expr;

use crate::{
    context::CompilationContext,
    err::{Handler, Result},
    parse::ast,
};
use std::rc::Rc;

/// Resolves every name in `ast`, assigns every expression a type and makes
/// implicit conversions explicit. Errors are reported through `handler`.
pub fn check(
    ast: &ast::Program,
    ctx: &CompilationContext,
    handler: &Rc<Handler>,
) -> Result<hir::Program> {
    let program = annotate::annotate(ast, ctx, handler)?;
    if handler.has_errors() {
        return Err(());
    }
    Ok(program)
}
