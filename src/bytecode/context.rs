use std::collections::HashMap;

use tracing::trace;

use crate::bytecode::compile_error::CompileError;
use crate::bytecode::ir::LineDelta;
use crate::bytecode::op::{INSTRUCTION_WIDTH, MAX_OPERAND, Opcode};
use crate::bytecode::words::DefaultAction;
use crate::lang::value::Value;
use crate::lexer::Span;

/// A not-yet-resolved control-flow site on the block stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// `if`: the conditional jump still needs its target.
    If { jump: usize, span: Span },

    /// `else`: the forward jump over the else-branch still needs its target.
    Else { jump: usize, span: Span },

    /// `begin`: loop top plus every `while` exit waiting for the loop end.
    Loop {
        top: usize,
        exits: Vec<usize>,
        span: Span,
    },
}

impl Block {
    pub fn opened_by(&self) -> &'static str {
        match self {
            Block::If { .. } => "if",
            Block::Else { .. } => "else",
            Block::Loop { .. } => "begin",
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Block::If { span, .. } | Block::Else { span, .. } | Block::Loop { span, .. } => *span,
        }
    }
}

/// Whether the next local reference loads or stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Load,
    Store,
}

/// Literal values in first-seen order, each stored once.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    values: Vec<Value>,
    index: HashMap<Value, usize>,
}

impl ConstantPool {
    /// Index of `value`, adding it on first sight.
    pub fn intern(&mut self, value: Value) -> usize {
        if let Some(&i) = self.index.get(&value) {
            return i;
        }
        let i = self.values.len();
        self.values.push(value.clone());
        self.index.insert(value, i);
        i
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// Local names in declaration order; a name's position is its slot.
#[derive(Debug, Clone, Default)]
pub struct VarTable {
    names: Vec<String>,
    slots: HashMap<String, (usize, Span)>,
}

impl VarTable {
    pub fn declare(&mut self, name: &str, span: Span) -> Result<usize, CompileError> {
        if let Some(&(_, first)) = self.slots.get(name) {
            return Err(CompileError::duplicate(name, span, first));
        }
        let slot = self.names.len();
        self.names.push(name.to_string());
        self.slots.insert(name.to_string(), (slot, span));
        Ok(slot)
    }

    pub fn slot(&self, name: &str) -> Option<usize> {
        self.slots.get(name).map(|&(slot, _)| slot)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn into_names(self) -> Vec<String> {
        self.names
    }
}

/// Mutable state threaded through every emitter of one compilation.
#[derive(Debug, Clone)]
pub struct Context {
    pub(crate) code: Vec<u8>,
    pub(crate) blocks: Vec<Block>,
    pub(crate) consts: ConstantPool,
    pub(crate) locals: VarTable,
    pub(crate) line_table: Vec<LineDelta>,

    /// One-shot: reset to `Load` by the next local reference.
    pub(crate) access: Access,
    pub(crate) default_action: DefaultAction,

    /// Inside `{ ... }` after `--`: remaining words are documentation.
    pub(crate) skip_outputs: bool,
    pub(crate) name: Option<(String, Span)>,

    /// Where the pending `to` was written, for diagnostics.
    pub(crate) store_span: Option<Span>,
    /// Where the open `{` or `:` was written.
    pub(crate) mode_span: Option<Span>,

    line_offset: usize,
    line_number: usize,
}

impl Context {
    pub fn new() -> Self {
        Context {
            code: Vec::new(),
            blocks: Vec::new(),
            consts: ConstantPool::default(),
            locals: VarTable::default(),
            line_table: Vec::new(),
            access: Access::Load,
            default_action: DefaultAction::EmitLiteral,
            skip_outputs: false,
            name: None,
            store_span: None,
            mode_span: None,
            line_offset: 0,
            line_number: 0,
        }
    }

    /// Offset the next instruction will be written at.
    pub fn here(&self) -> usize {
        self.code.len()
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn consts(&self) -> &ConstantPool {
        &self.consts
    }

    pub fn locals(&self) -> &VarTable {
        &self.locals
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn default_action(&self) -> DefaultAction {
        self.default_action
    }

    /// Append one instruction. `word` and `span` only feed diagnostics.
    pub fn emit(
        &mut self,
        opcode: Opcode,
        arg: usize,
        word: &str,
        span: Span,
    ) -> Result<usize, CompileError> {
        if arg > MAX_OPERAND {
            let what = match opcode {
                Opcode::LoadConst => "constant index",
                Opcode::LoadFast | Opcode::StoreFast => "local slot",
                _ => "jump target",
            };
            return Err(CompileError::overflow(word, span, what, arg));
        }
        let offset = self.here();
        self.code.push(opcode as u8);
        self.code.push(arg as u8);
        Ok(offset)
    }

    /// Append a jump whose operand is patched later.
    pub fn emit_placeholder(
        &mut self,
        opcode: Opcode,
        word: &str,
        span: Span,
    ) -> Result<usize, CompileError> {
        self.emit(opcode, 0, word, span)
    }

    /// Point the jump at `source` to `target`, encoding the operand as a
    /// displacement or an absolute offset depending on its opcode.
    pub fn patch_jump(
        &mut self,
        source: usize,
        target: usize,
        word: &str,
        span: Span,
    ) -> Result<(), CompileError> {
        let byte = *self
            .code
            .get(source)
            .ok_or_else(|| CompileError::internal(format!("patch past end at {}", source)))?;
        let opcode = Opcode::from_byte(byte)
            .filter(|op| op.is_jump())
            .ok_or_else(|| {
                CompileError::internal(format!("no jump to patch at offset {}", source))
            })?;

        let (what, value) = if opcode.is_relative_jump() {
            let value = target
                .checked_sub(source + INSTRUCTION_WIDTH)
                .ok_or_else(|| {
                    CompileError::internal(format!(
                        "backward relative jump from {} to {}",
                        source, target
                    ))
                })?;
            ("jump distance", value)
        } else {
            ("jump target", target)
        };

        if value > MAX_OPERAND {
            return Err(CompileError::overflow(word, span, what, value));
        }

        trace!(source, target, opcode = opcode.mnemonic(), "patch jump");
        self.code[source + 1] = value as u8;
        Ok(())
    }

    /// Close source line `line`: record how far the buffer grew and how
    /// many lines passed since the previous entry.
    pub fn mark_line(&mut self, line: usize) {
        let here = self.here();
        self.line_table.push(LineDelta {
            bytes: here - self.line_offset,
            lines: line - self.line_number,
        });
        self.line_offset = here;
        self.line_number = line;
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span { line: 0, col: 1 }
    }

    #[test]
    fn test_constant_pool_dedup() {
        let mut pool = ConstantPool::default();
        assert_eq!(pool.intern(Value::Integer(1)), 0);
        assert_eq!(pool.intern(Value::Integer(0)), 1);
        assert_eq!(pool.intern(Value::Integer(1)), 0);
        assert_eq!(pool.intern(Value::Float(1.0)), 2);
        assert_eq!(pool.len(), 3);
        assert_eq!(
            pool.values(),
            &[Value::Integer(1), Value::Integer(0), Value::Float(1.0)]
        );
    }

    #[test]
    fn test_var_table_slots() {
        let mut vars = VarTable::default();
        assert_eq!(vars.declare("n", span()).unwrap(), 0);
        assert_eq!(vars.declare("m", span()).unwrap(), 1);
        assert_eq!(vars.slot("m"), Some(1));
        assert_eq!(vars.slot("x"), None);
        assert_eq!(vars.names(), &["n".to_string(), "m".to_string()]);
    }

    #[test]
    fn test_var_table_rejects_duplicates() {
        let mut vars = VarTable::default();
        vars.declare("n", span()).unwrap();
        let err = vars.declare("n", Span { line: 2, col: 1 }).unwrap_err();
        assert!(matches!(
            err,
            CompileError::DuplicateDeclaration { ref name, line: 3, first_line: 1 } if name == "n"
        ));
    }

    #[test]
    fn test_emit_checks_operand_width() {
        let mut ctx = Context::new();
        assert_eq!(ctx.emit(Opcode::LoadFast, 255, "x", span()).unwrap(), 0);
        let err = ctx.emit(Opcode::LoadConst, 256, "x", span()).unwrap_err();
        assert!(matches!(
            err,
            CompileError::EncodingOverflow { what: "constant index", value: 256, .. }
        ));
        assert_eq!(ctx.code(), &[Opcode::LoadFast as u8, 255]);
    }

    #[test]
    fn test_patch_relative_and_absolute() {
        let mut ctx = Context::new();
        let cond = ctx.emit_placeholder(Opcode::PopJumpIfFalse, "if", span()).unwrap();
        let fwd = ctx.emit_placeholder(Opcode::JumpForward, "else", span()).unwrap();
        ctx.emit(Opcode::DupTop, 0, "dup", span()).unwrap();

        ctx.patch_jump(cond, 6, "then", span()).unwrap();
        ctx.patch_jump(fwd, 6, "then", span()).unwrap();

        // absolute operand is the target, relative is target - source - 2
        assert_eq!(ctx.code()[cond + 1], 6);
        assert_eq!(ctx.code()[fwd + 1], 2);
    }

    #[test]
    fn test_patch_rejects_non_jump() {
        let mut ctx = Context::new();
        ctx.emit(Opcode::DupTop, 0, "dup", span()).unwrap();
        let err = ctx.patch_jump(0, 2, "then", span()).unwrap_err();
        assert!(matches!(err, CompileError::Internal(_)));
    }

    #[test]
    fn test_patch_overflow_is_fatal() {
        let mut ctx = Context::new();
        let jump = ctx.emit_placeholder(Opcode::PopJumpIfFalse, "if", span()).unwrap();
        let err = ctx.patch_jump(jump, 300, "then", span()).unwrap_err();
        assert!(matches!(err, CompileError::EncodingOverflow { value: 300, .. }));
        assert_eq!(ctx.code()[jump + 1], 0);
    }

    #[test]
    fn test_line_table_deltas() {
        let mut ctx = Context::new();
        ctx.emit(Opcode::DupTop, 0, "dup", span()).unwrap();
        ctx.mark_line(0);
        ctx.mark_line(1);
        ctx.emit(Opcode::PopTop, 0, "drop", span()).unwrap();
        ctx.emit(Opcode::PopTop, 0, "drop", span()).unwrap();
        ctx.mark_line(2);

        assert_eq!(
            ctx.line_table,
            vec![
                LineDelta { bytes: 2, lines: 0 },
                LineDelta { bytes: 0, lines: 1 },
                LineDelta { bytes: 4, lines: 1 },
            ]
        );
    }
}
