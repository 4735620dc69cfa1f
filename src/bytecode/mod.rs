pub mod assemble;
pub mod compile;
pub mod compile_error;
pub mod context;
pub mod disasm;
pub mod emit;
pub mod ir;
pub mod op;
pub mod stack_check;
pub mod words;

pub use compile::{Compiler, CompilerConfig};
pub use compile_error::CompileError;
pub use ir::{CodeFlags, CodeObject, LineDelta};
pub use op::Opcode;
