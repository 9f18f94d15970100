use std::{path::PathBuf, str::FromStr};
use structopt::StructOpt;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Emit {
    Tokens,
    Ast,
    Ir,
}

impl FromStr for Emit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tokens" => Ok(Emit::Tokens),
            "ast" => Ok(Emit::Ast),
            "ir" => Ok(Emit::Ir),
            _ => Err(format!("unknown output '{}', expected tokens, ast or ir", s)),
        }
    }
}

#[derive(StructOpt)]
#[structopt(name = "dbcc", about = "Compiles BASIC source to SSA IR")]
pub struct Args {
    #[structopt(name = "FILE_NAME", parse(from_os_str))]
    pub file_name: Option<PathBuf>,

    /// What to print: tokens, ast or ir
    #[structopt(long, default_value = "ir")]
    pub emit: Emit,

    /// Target 32-bit pointers
    #[structopt(long)]
    pub ptr32: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self::new()
    }
}

impl Args {
    pub fn new() -> Self {
        Self::from_args()
    }
}
