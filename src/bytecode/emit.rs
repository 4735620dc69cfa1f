//! Per-word emitters.
//!
//! Each emitter appends zero or more instructions to the [`Context`] and may
//! rewrite earlier jump operands once their targets are known. Control words
//! keep their pending sites on the block stack:
//!
//! ```text
//!   if     POP_JUMP_IF_FALSE ?     push If
//!   else   JUMP_FORWARD ?          patch If -> here, replace with Else
//!   then                           pop If/Else, patch -> here
//!   begin                          push Loop { top: here }
//!   while  POP_JUMP_IF_FALSE ?     add to Loop exits
//!   repeat JUMP_ABSOLUTE top       pop Loop, patch exits -> here
//!   until  POP_JUMP_IF_FALSE top   pop Loop, patch exits -> here
//!   again  JUMP_ABSOLUTE top       pop Loop, patch exits -> here
//! ```

use tracing::{trace, warn};

use crate::bytecode::compile_error::CompileError;
use crate::bytecode::context::{Access, Block, Context};
use crate::bytecode::op::{CompareOp, Opcode};
use crate::bytecode::words::{DefaultAction, Emitter};
use crate::lang::value::{LiteralError, Value};
use crate::lexer::Span;

pub fn emit_template(
    ctx: &mut Context,
    ops: &[Opcode],
    word: &str,
    span: Span,
) -> Result<(), CompileError> {
    for op in ops {
        ctx.emit(*op, 0, word, span)?;
    }
    Ok(())
}

pub fn emit_compare(
    ctx: &mut Context,
    cmp: CompareOp,
    word: &str,
    span: Span,
) -> Result<(), CompileError> {
    ctx.emit(Opcode::CompareOp, cmp as usize, word, span)?;
    Ok(())
}

/// Run a stateful emitter.
pub fn run(
    ctx: &mut Context,
    emitter: Emitter,
    word: &str,
    span: Span,
) -> Result<(), CompileError> {
    match emitter {
        Emitter::If => emit_if(ctx, word, span),
        Emitter::Else => emit_else(ctx, word, span),
        Emitter::Then => emit_then(ctx, word, span),
        Emitter::Begin => emit_begin(ctx, span),
        Emitter::While => emit_while(ctx, word, span),
        Emitter::Repeat | Emitter::Again => close_loop(ctx, Opcode::JumpAbsolute, word, span),
        Emitter::Until => close_loop(ctx, Opcode::PopJumpIfFalse, word, span),
        Emitter::OpenLocals => open_locals(ctx, word, span),
        Emitter::CloseLocals => close_locals(ctx, word, span),
        Emitter::To => {
            ctx.access = Access::Store;
            ctx.store_span = Some(span);
            Ok(())
        }
        Emitter::Define => emit_define(ctx, span),
        Emitter::Halve => {
            let one = ctx.consts.intern(Value::Integer(1));
            ctx.emit(Opcode::LoadConst, one, word, span)?;
            ctx.emit(Opcode::InplaceRshift, 0, word, span)?;
            Ok(())
        }
    }
}

// =============================================================================
// Control flow
// =============================================================================

fn emit_if(ctx: &mut Context, word: &str, span: Span) -> Result<(), CompileError> {
    let jump = ctx.emit_placeholder(Opcode::PopJumpIfFalse, word, span)?;
    ctx.blocks.push(Block::If { jump, span });
    Ok(())
}

fn emit_else(ctx: &mut Context, word: &str, span: Span) -> Result<(), CompileError> {
    let (cond, opened) = match ctx.blocks.pop() {
        Some(Block::If { jump, span }) => (jump, span),
        other => return Err(mismatch(word, span, "has no matching if", other)),
    };

    let skip = ctx.emit_placeholder(Opcode::JumpForward, word, span)?;
    let here = ctx.here();
    ctx.patch_jump(cond, here, word, span)?;
    ctx.blocks.push(Block::Else {
        jump: skip,
        span: opened,
    });
    Ok(())
}

fn emit_then(ctx: &mut Context, word: &str, span: Span) -> Result<(), CompileError> {
    let jump = match ctx.blocks.pop() {
        Some(Block::If { jump, .. }) | Some(Block::Else { jump, .. }) => jump,
        other => return Err(mismatch(word, span, "has no matching if", other)),
    };

    let here = ctx.here();
    ctx.patch_jump(jump, here, word, span)
}

fn emit_begin(ctx: &mut Context, span: Span) -> Result<(), CompileError> {
    let top = ctx.here();
    ctx.blocks.push(Block::Loop {
        top,
        exits: Vec::new(),
        span,
    });
    Ok(())
}

fn emit_while(ctx: &mut Context, word: &str, span: Span) -> Result<(), CompileError> {
    if !matches!(ctx.blocks.last(), Some(Block::Loop { .. })) {
        let top = ctx.blocks.pop();
        return Err(mismatch(word, span, "is not inside begin", top));
    }

    let exit = ctx.emit_placeholder(Opcode::PopJumpIfFalse, word, span)?;
    if let Some(Block::Loop { exits, .. }) = ctx.blocks.last_mut() {
        exits.push(exit);
    }
    Ok(())
}

/// Jump back to the loop top with `opcode`, then send every `while` exit of
/// the loop to the instruction after it.
fn close_loop(
    ctx: &mut Context,
    opcode: Opcode,
    word: &str,
    span: Span,
) -> Result<(), CompileError> {
    let (top, exits) = match ctx.blocks.pop() {
        Some(Block::Loop { top, exits, .. }) => (top, exits),
        other => return Err(mismatch(word, span, "has no matching begin", other)),
    };

    ctx.emit(opcode, top, word, span)?;
    let here = ctx.here();
    trace!(top, exits = exits.len(), "close loop");
    for exit in exits {
        ctx.patch_jump(exit, here, word, span)?;
    }
    Ok(())
}

fn mismatch(word: &str, span: Span, reason: &str, found: Option<Block>) -> CompileError {
    match found {
        None => CompileError::unbalanced(word, span, reason),
        Some(block) => CompileError::unbalanced(
            word,
            span,
            format!(
                "{} ('{}' on line {} is still open)",
                reason,
                block.opened_by(),
                block.span().display_line()
            ),
        ),
    }
}

// =============================================================================
// Locals and names
// =============================================================================

fn open_locals(ctx: &mut Context, word: &str, span: Span) -> Result<(), CompileError> {
    if ctx.default_action == DefaultAction::DeclareLocal {
        return Err(CompileError::unbalanced(
            word,
            span,
            "cannot open a declaration inside another",
        ));
    }
    ctx.default_action = DefaultAction::DeclareLocal;
    ctx.skip_outputs = false;
    ctx.mode_span = Some(span);
    Ok(())
}

fn close_locals(ctx: &mut Context, word: &str, span: Span) -> Result<(), CompileError> {
    if ctx.default_action != DefaultAction::DeclareLocal {
        return Err(CompileError::unbalanced(word, span, "has no matching {"));
    }
    ctx.default_action = DefaultAction::EmitLiteral;
    ctx.skip_outputs = false;
    ctx.mode_span = None;
    Ok(())
}

fn emit_define(ctx: &mut Context, span: Span) -> Result<(), CompileError> {
    if let Some((name, first)) = &ctx.name {
        return Err(CompileError::duplicate(name, span, *first));
    }
    ctx.default_action = DefaultAction::DefineName;
    ctx.mode_span = Some(span);
    Ok(())
}

/// Default action inside `{ ... }`: bind the next slot.
pub fn declare_local(ctx: &mut Context, word: &str, span: Span) -> Result<(), CompileError> {
    if word == "--" {
        ctx.skip_outputs = true;
        return Ok(());
    }
    if ctx.skip_outputs {
        return Ok(());
    }
    let slot = ctx.locals.declare(word, span)?;
    trace!(name = word, slot, "declare local");
    Ok(())
}

/// Default action after `:`: the word names the unit.
pub fn define_name(ctx: &mut Context, word: &str, span: Span) -> Result<(), CompileError> {
    ctx.name = Some((word.to_string(), span));
    ctx.default_action = DefaultAction::EmitLiteral;
    ctx.mode_span = None;
    Ok(())
}

/// Load or store a declared local, consuming a pending `to`.
pub fn emit_reference(
    ctx: &mut Context,
    slot: usize,
    word: &str,
    span: Span,
) -> Result<(), CompileError> {
    let opcode = match ctx.access {
        Access::Load => Opcode::LoadFast,
        Access::Store => Opcode::StoreFast,
    };
    ctx.access = Access::Load;
    ctx.store_span = None;
    ctx.emit(opcode, slot, word, span)?;
    Ok(())
}

/// Default action outside declarations: intern and load a literal.
pub fn emit_literal(ctx: &mut Context, word: &str, span: Span) -> Result<(), CompileError> {
    let value = Value::parse_literal(word).map_err(|e| match e {
        LiteralError::NotALiteral => CompileError::unknown_word(word, span),
        LiteralError::OutOfRange => CompileError::literal_out_of_range(word, span),
    })?;
    if ctx.access == Access::Store {
        warn!(word, line = span.display_line(), "'to' is still pending across a literal");
    }
    let index = ctx.consts.intern(value);
    ctx.emit(Opcode::LoadConst, index, word, span)?;
    Ok(())
}
