//! Compiler from a small Forth dialect to stack-VM wordcode.
//!
//! Source text is split into words by [`lexer::Lexer`]. Each word is looked
//! up and handed to an emitter that appends two-byte instructions to the
//! compilation context, backpatching jumps once their targets are known. The
//! assembler then packages the result as an immutable
//! [`bytecode::CodeObject`] for a host VM. [`runtime::Vm`] is a small
//! reference interpreter for such code objects.
//!
//! ```text
//! : square { x } x x * ;
//! ```

pub mod bytecode;
pub mod lang;
pub mod lexer;
pub mod runtime;

use bytecode::{CodeObject, CompileError, Compiler};

/// Compile `source` with the default configuration.
pub fn compile(source: &str) -> Result<CodeObject, CompileError> {
    Compiler::new().compile(source)
}
