use tracing::debug;

use crate::bytecode::compile::CompilerConfig;
use crate::bytecode::compile_error::CompileError;
use crate::bytecode::context::Context;
use crate::bytecode::ir::{CodeFlags, CodeObject};
use crate::bytecode::op::{self, Instruction, Opcode};
use crate::bytecode::stack_check::max_stack_depth;

/// Package a finished context into a code object.
///
/// The context must be balanced (no open blocks or regions); the compiler
/// driver checks that before calling in.
pub fn assemble(ctx: Context, config: &CompilerConfig) -> Result<CodeObject, CompileError> {
    let Context {
        mut code,
        consts,
        locals,
        line_table,
        name,
        ..
    } = ctx;

    if config.implicit_return && needs_epilogue(&decode(&code)?, code.len()) {
        code.push(Opcode::ReturnValue as u8);
        code.push(0);
    }

    let instrs = decode(&code)?;
    let stacksize = if config.check_stack {
        max_stack_depth(&instrs)?
    } else {
        0
    };

    // the first `argcount` slots are parameters, named or not
    let mut varnames = locals.into_names();
    for i in varnames.len()..config.argcount {
        varnames.push(format!(".{}", i));
    }

    let name = name
        .map(|(name, _)| name)
        .unwrap_or_else(|| config.name.clone());

    let code_object = CodeObject {
        argcount: config.argcount,
        nlocals: varnames.len(),
        stacksize,
        flags: CodeFlags::LOCALS_ONLY,
        code,
        consts: consts.into_values(),
        varnames,
        filename: config.filename.clone(),
        name,
        first_line: config.first_line,
        line_table,
    };

    debug!(
        name = %code_object.name,
        bytes = code_object.code.len(),
        consts = code_object.consts.len(),
        nlocals = code_object.nlocals,
        stacksize = code_object.stacksize,
        "assembled code object"
    );

    Ok(code_object)
}

fn decode(code: &[u8]) -> Result<Vec<Instruction>, CompileError> {
    op::decode(code)
        .map_err(|offset| CompileError::internal(format!("bad opcode at offset {}", offset)))
}

/// The unit can fall off its end, or a jump lands just past the last
/// instruction.
fn needs_epilogue(instrs: &[Instruction], end: usize) -> bool {
    let ends_with_return = instrs
        .last()
        .is_some_and(|instr| instr.opcode == Opcode::ReturnValue);
    !ends_with_return || instrs.iter().any(|instr| instr.jump_target() == Some(end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::value::Value;
    use crate::lexer::Span;

    fn span() -> Span {
        Span { line: 0, col: 1 }
    }

    fn config() -> CompilerConfig {
        CompilerConfig::default()
    }

    #[test]
    fn test_appends_epilogue() {
        let mut ctx = Context::new();
        let k = ctx.consts.intern(Value::Integer(7));
        ctx.emit(Opcode::LoadConst, k, "7", span()).unwrap();

        let code = assemble(ctx, &config()).unwrap();
        assert_eq!(code.code, vec![Opcode::LoadConst as u8, 0, Opcode::ReturnValue as u8, 0]);
        assert_eq!(code.stacksize, 1);
    }

    #[test]
    fn test_keeps_explicit_return() {
        let mut ctx = Context::new();
        ctx.emit(Opcode::LoadConst, 0, "1", span()).unwrap();
        ctx.emit(Opcode::ReturnValue, 0, ";", span()).unwrap();
        ctx.consts.intern(Value::Integer(1));

        let code = assemble(ctx, &config()).unwrap();
        assert_eq!(code.code.len(), 4);
    }

    #[test]
    fn test_epilogue_added_for_jump_to_end() {
        // { n } 0 n if drop 1 ; then
        let mut ctx = Context::new();
        ctx.locals.declare("n", span()).unwrap();
        let zero = ctx.consts.intern(Value::Integer(0));
        let one = ctx.consts.intern(Value::Integer(1));
        ctx.emit(Opcode::LoadConst, zero, "0", span()).unwrap();
        ctx.emit(Opcode::LoadFast, 0, "n", span()).unwrap();
        let jump = ctx.emit_placeholder(Opcode::PopJumpIfFalse, "if", span()).unwrap();
        ctx.emit(Opcode::PopTop, 0, "drop", span()).unwrap();
        ctx.emit(Opcode::LoadConst, one, "1", span()).unwrap();
        ctx.emit(Opcode::ReturnValue, 0, ";", span()).unwrap();
        let here = ctx.here();
        ctx.patch_jump(jump, here, "then", span()).unwrap();

        let code = assemble(ctx, &config().with_argcount(1)).unwrap();
        assert_eq!(code.code.len(), 14);
        assert_eq!(&code.code[12..], &[Opcode::ReturnValue as u8, 0]);
        for instr in code.instructions().unwrap() {
            if let Some(target) = instr.jump_target() {
                assert!(target < code.code.len());
            }
        }
    }

    #[test]
    fn test_epilogue_can_be_disabled() {
        let ctx = Context::new();
        let config = CompilerConfig {
            implicit_return: false,
            ..config()
        };
        assert!(assemble(ctx, &config).unwrap().code.is_empty());
    }

    #[test]
    fn test_parameters_are_padded() {
        let mut ctx = Context::new();
        ctx.locals.declare("n", span()).unwrap();
        ctx.emit(Opcode::LoadFast, 0, "n", span()).unwrap();

        let code = assemble(ctx, &config().with_argcount(3)).unwrap();
        assert_eq!(code.argcount, 3);
        assert_eq!(code.nlocals, 3);
        assert_eq!(code.varnames, vec!["n", ".1", ".2"]);
    }

    #[test]
    fn test_locals_beyond_parameters() {
        let mut ctx = Context::new();
        ctx.locals.declare("n", span()).unwrap();
        ctx.locals.declare("m", span()).unwrap();
        ctx.emit(Opcode::LoadFast, 1, "m", span()).unwrap();

        let code = assemble(ctx, &config().with_argcount(1)).unwrap();
        assert_eq!(code.nlocals, 2);
        assert_eq!(code.varnames, vec!["n", "m"]);
    }

    #[test]
    fn test_flags_and_names() {
        let mut ctx = Context::new();
        ctx.emit(Opcode::LoadConst, 0, "1", span()).unwrap();
        ctx.consts.intern(Value::Integer(1));
        let code = assemble(ctx, &config().with_name("unit")).unwrap();
        assert_eq!(code.flags, CodeFlags::LOCALS_ONLY);
        assert_eq!(code.name, "unit");

        let mut ctx = Context::new();
        ctx.name = Some(("fib".to_string(), span()));
        ctx.emit(Opcode::LoadConst, 0, "1", span()).unwrap();
        let code = assemble(ctx, &config().with_name("unit")).unwrap();
        assert_eq!(code.name, "fib");
    }

    #[test]
    fn test_underflow_detected() {
        let mut ctx = Context::new();
        ctx.emit(Opcode::InplaceAdd, 0, "+", span()).unwrap();
        let err = assemble(ctx, &config()).unwrap_err();
        assert!(matches!(err, CompileError::StackUnderflow { offset: 0, .. }));
    }
}
