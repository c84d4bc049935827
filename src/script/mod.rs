//! The imperative target language compiled templates are written in.
//!
//! Templates compile into this language and the runtime executes it with
//! [`Interpreter`]. Only what the macro handlers emit is supported; there is
//! no string interpolation, no user functions and no classes.

mod ast;
mod interp;
mod lexer;
mod parser;
mod value;

use thiserror::Error;

pub use ast::{BinaryOp, Expr, Program, Stmt, UnaryOp};
pub use interp::{Host, Interpreter, Scope};
pub use lexer::{Token, TokenKind, tokenize};
pub use parser::parse;
pub use value::{Key, LoopState, LoopTracker, Value};

/// A syntax error in target code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}{}", .line.map(|line| format!(" on line {line}")).unwrap_or_default())]
pub struct ScriptError {
    pub message: String,
    /// Byte offset into the compiled code, `usize::MAX` at end of input.
    pub offset: usize,
    /// Template line taken from the closest preceding `/* line N */` marker.
    pub line: Option<usize>,
}

impl ScriptError {
    pub(crate) fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
            line: None,
        }
    }

    pub(crate) fn with_line(mut self, line: Option<usize>) -> Self {
        self.line = line;
        self
    }
}
