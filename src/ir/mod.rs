//! A small SSA intermediate representation. The code generator only ever
//! writes it; `Display` renders the textual form.

mod builder;
mod instr;
mod types;

pub use builder::*;
pub use instr::*;
pub use types::*;
