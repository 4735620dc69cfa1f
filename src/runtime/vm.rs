use std::cmp::Ordering;

use tracing::{debug, trace};

use crate::bytecode::ir::CodeObject;
use crate::bytecode::op::{CompareOp, INSTRUCTION_WIDTH, Instruction, Opcode};
use crate::lang::value::Value;
use crate::runtime::runtime_error::{
    RuntimeError, division_by_zero, integer_overflow, stack_underflow, type_error, unbound_local,
};

#[derive(Debug, Clone)]
pub struct VmConfig {
    pub max_steps: Option<usize>,
    pub max_stack_size: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_steps: None,
            max_stack_size: 10_000,
        }
    }
}

/// What the interpreter loop does after an instruction.
enum Flow {
    Next,
    Jump(usize),
    Return(Value),
}

/// Reference interpreter for compiled code objects.
pub struct Vm {
    stack: Vec<Value>,
    locals: Vec<Option<Value>>,
    config: VmConfig,
    steps: usize,
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Vm {
            stack: Vec::new(),
            locals: Vec::new(),
            config,
            steps: 0,
        }
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    /// Number of instructions executed by the last run.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Call `code` with `args` bound to its parameter slots and return the
    /// value passed to `RETURN_VALUE`.
    pub fn run(&mut self, code: &CodeObject, args: &[Value]) -> Result<Value, RuntimeError> {
        if args.len() != code.argcount {
            return Err(RuntimeError::new(format!(
                "{} takes {} argument(s), {} given",
                code.name,
                code.argcount,
                args.len()
            )));
        }

        let instrs = code.instructions().map_err(|offset| {
            RuntimeError::new("malformed code object: unknown opcode").at(offset)
        })?;

        self.stack.clear();
        self.steps = 0;
        self.locals = vec![None; code.nlocals.max(args.len())];
        for (slot, arg) in args.iter().enumerate() {
            self.locals[slot] = Some(arg.clone());
        }

        debug!(name = %code.name, args = args.len(), "run code object");

        let mut ip = 0;
        loop {
            let instr = instrs.get(ip / INSTRUCTION_WIDTH).ok_or_else(|| {
                RuntimeError::new("execution ran past the end of the code")
                    .at(ip)
                    .with_help("End the unit with ';' or compile with an implicit return")
            })?;

            self.check_limits().map_err(|e| e.at(ip))?;
            trace!(offset = ip, op = instr.opcode.mnemonic(), arg = instr.arg, "step");

            match self.exec(code, instr).map_err(|e| e.at(instr.offset))? {
                Flow::Next => ip += INSTRUCTION_WIDTH,
                Flow::Jump(target) => ip = target,
                Flow::Return(value) => {
                    debug!(steps = self.steps, "returned {}", value);
                    return Ok(value);
                }
            }
        }
    }

    fn check_limits(&mut self) -> Result<(), RuntimeError> {
        self.steps += 1;

        if let Some(max) = self.config.max_steps {
            if self.steps > max {
                return Err(RuntimeError::new(format!(
                    "execution step limit exceeded ({})",
                    max
                )));
            }
        }

        if self.stack.len() > self.config.max_stack_size {
            return Err(RuntimeError::new(format!(
                "stack size limit exceeded ({})",
                self.config.max_stack_size
            )));
        }

        Ok(())
    }

    fn exec(&mut self, code: &CodeObject, instr: &Instruction) -> Result<Flow, RuntimeError> {
        let name = instr.opcode.mnemonic();
        let arg = instr.arg as usize;

        match instr.opcode {
            // Stack operations
            Opcode::PopTop => {
                self.pop(name)?;
            }
            Opcode::RotTwo => {
                let b = self.pop(name)?;
                let a = self.pop(name)?;
                self.push(b);
                self.push(a);
            }
            Opcode::RotThree => self.rotate(3, name)?,
            Opcode::RotFour => self.rotate(4, name)?,
            Opcode::DupTop => {
                let a = self.peek(0, name)?.clone();
                self.push(a);
            }
            Opcode::DupTopTwo => {
                let b = self.peek(0, name)?.clone();
                let a = self.peek(1, name)?.clone();
                self.push(a);
                self.push(b);
            }

            // Arithmetic
            Opcode::UnaryNegative => {
                let a = self.pop(name)?;
                let result = match a {
                    Value::Integer(n) => {
                        Value::Integer(n.checked_neg().ok_or_else(|| integer_overflow("negate"))?)
                    }
                    Value::Bool(b) => Value::Integer(-(b as i64)),
                    Value::Float(n) => Value::Float(-n),
                    other => {
                        return Err(RuntimeError::new(format!(
                            "type error: cannot negate {}",
                            other.type_name()
                        )));
                    }
                };
                self.push(result);
            }
            Opcode::UnaryInvert => {
                let a = self.pop(name)?;
                let n = as_int(&a).ok_or_else(|| {
                    RuntimeError::new(format!("type error: cannot invert {}", a.type_name()))
                })?;
                self.push(Value::Integer(!n));
            }
            Opcode::BinaryModulo
            | Opcode::InplaceFloorDivide
            | Opcode::InplaceAdd
            | Opcode::InplaceSubtract
            | Opcode::InplaceMultiply
            | Opcode::InplaceLshift
            | Opcode::InplaceRshift
            | Opcode::InplaceAnd
            | Opcode::InplaceXor
            | Opcode::InplaceOr => {
                let b = self.pop(name)?;
                let a = self.pop(name)?;
                self.push(binary(instr.opcode, a, b)?);
            }

            Opcode::ReturnValue => return Ok(Flow::Return(self.pop(name)?)),

            Opcode::LoadConst => {
                let value = code.consts.get(arg).cloned().ok_or_else(|| {
                    RuntimeError::new(format!("constant index {} out of range", arg))
                })?;
                self.push(value);
            }
            Opcode::CompareOp => {
                let cmp = CompareOp::from_byte(instr.arg).ok_or_else(|| {
                    RuntimeError::new(format!("unknown comparison {}", instr.arg))
                })?;
                let b = self.pop(name)?;
                let a = self.pop(name)?;
                self.push(Value::Bool(compare(cmp, &a, &b)?));
            }

            // Control flow
            Opcode::JumpForward => {
                return Ok(Flow::Jump(instr.offset + INSTRUCTION_WIDTH + arg));
            }
            Opcode::JumpAbsolute => return Ok(Flow::Jump(arg)),
            Opcode::PopJumpIfFalse => {
                if !self.pop(name)?.is_truthy() {
                    return Ok(Flow::Jump(arg));
                }
            }
            Opcode::PopJumpIfTrue => {
                if self.pop(name)?.is_truthy() {
                    return Ok(Flow::Jump(arg));
                }
            }

            // Locals
            Opcode::LoadFast => {
                let value = match self.locals.get(arg) {
                    Some(Some(value)) => value.clone(),
                    Some(None) => {
                        let local = code.varnames.get(arg).map(String::as_str).unwrap_or("?");
                        return Err(unbound_local(local));
                    }
                    None => {
                        return Err(RuntimeError::new(format!("local slot {} out of range", arg)));
                    }
                };
                self.push(value);
            }
            Opcode::StoreFast => {
                let value = self.pop(name)?;
                let slot = self.locals.get_mut(arg).ok_or_else(|| {
                    RuntimeError::new(format!("local slot {} out of range", arg))
                })?;
                *slot = Some(value);
            }
        }

        Ok(Flow::Next)
    }

    // Stack operations

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self, mnemonic: &str) -> Result<Value, RuntimeError> {
        self.stack.pop().ok_or_else(|| stack_underflow(mnemonic))
    }

    fn peek(&self, depth: usize, mnemonic: &str) -> Result<&Value, RuntimeError> {
        self.stack
            .len()
            .checked_sub(depth + 1)
            .and_then(|i| self.stack.get(i))
            .ok_or_else(|| stack_underflow(mnemonic))
    }

    /// Move the top of stack down `n - 1` places: `a b c -- c a b` for 3.
    fn rotate(&mut self, n: usize, mnemonic: &str) -> Result<(), RuntimeError> {
        let len = self.stack.len();
        if len < n {
            return Err(stack_underflow(mnemonic));
        }
        self.stack[len - n..].rotate_right(1);
        Ok(())
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Value operations
// =============================================================================

/// Integer view of a value; booleans count as 0 and 1.
fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(n) => Some(*n),
        Value::Bool(b) => Some(*b as i64),
        _ => None,
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Float(n) => Some(*n),
        other => as_int(other).map(|n| n as f64),
    }
}

fn binary(opcode: Opcode, a: Value, b: Value) -> Result<Value, RuntimeError> {
    let symbol = match opcode {
        Opcode::InplaceAdd => "+",
        Opcode::InplaceSubtract => "-",
        Opcode::InplaceMultiply => "*",
        Opcode::InplaceFloorDivide => "//",
        Opcode::BinaryModulo => "%",
        Opcode::InplaceLshift => "<<",
        Opcode::InplaceRshift => ">>",
        Opcode::InplaceAnd => "&",
        Opcode::InplaceXor => "^",
        _ => "|",
    };
    let mismatch = || type_error(symbol, a.type_name(), b.type_name());

    if let (Value::String(x), Value::String(y), Opcode::InplaceAdd) = (&a, &b, opcode) {
        return Ok(Value::String(format!("{}{}", x, y)));
    }

    if let (Value::Bool(x), Value::Bool(y)) = (&a, &b) {
        match opcode {
            Opcode::InplaceAnd => return Ok(Value::Bool(x & y)),
            Opcode::InplaceOr => return Ok(Value::Bool(x | y)),
            Opcode::InplaceXor => return Ok(Value::Bool(x ^ y)),
            _ => {}
        }
    }

    if let (Some(x), Some(y)) = (as_int(&a), as_int(&b)) {
        return int_binary(opcode, symbol, x, y).map(Value::Integer);
    }

    match (as_float(&a), as_float(&b)) {
        (Some(x), Some(y)) => float_binary(opcode, x, y).ok_or_else(mismatch)?.map(Value::Float),
        _ => Err(mismatch()),
    }
}

fn int_binary(opcode: Opcode, symbol: &str, a: i64, b: i64) -> Result<i64, RuntimeError> {
    let overflow = || integer_overflow(symbol);

    match opcode {
        Opcode::InplaceAdd => a.checked_add(b).ok_or_else(overflow),
        Opcode::InplaceSubtract => a.checked_sub(b).ok_or_else(overflow),
        Opcode::InplaceMultiply => a.checked_mul(b).ok_or_else(overflow),
        Opcode::InplaceFloorDivide => {
            if b == 0 {
                return Err(division_by_zero("integer division"));
            }
            let q = a.checked_div(b).ok_or_else(overflow)?;
            // round toward negative infinity
            if a % b != 0 && (a < 0) != (b < 0) {
                Ok(q - 1)
            } else {
                Ok(q)
            }
        }
        Opcode::BinaryModulo => {
            if b == 0 {
                return Err(division_by_zero("modulo"));
            }
            let r = a.wrapping_rem(b);
            if r != 0 && (r < 0) != (b < 0) {
                Ok(r + b)
            } else {
                Ok(r)
            }
        }
        Opcode::InplaceLshift => {
            if b < 0 {
                return Err(RuntimeError::new("negative shift count"));
            }
            if a == 0 {
                return Ok(0);
            }
            if b >= 64 {
                return Err(overflow());
            }
            let r = a << b;
            if r >> b == a { Ok(r) } else { Err(overflow()) }
        }
        Opcode::InplaceRshift => {
            if b < 0 {
                return Err(RuntimeError::new("negative shift count"));
            }
            Ok(a >> b.min(63))
        }
        Opcode::InplaceAnd => Ok(a & b),
        Opcode::InplaceXor => Ok(a ^ b),
        _ => Ok(a | b),
    }
}

/// Float arithmetic; `None` for operators that need integers.
fn float_binary(opcode: Opcode, a: f64, b: f64) -> Option<Result<f64, RuntimeError>> {
    let result = match opcode {
        Opcode::InplaceAdd => Ok(a + b),
        Opcode::InplaceSubtract => Ok(a - b),
        Opcode::InplaceMultiply => Ok(a * b),
        Opcode::InplaceFloorDivide if b == 0.0 => Err(division_by_zero("float division")),
        Opcode::InplaceFloorDivide => Ok((a / b).floor()),
        Opcode::BinaryModulo if b == 0.0 => Err(division_by_zero("float modulo")),
        Opcode::BinaryModulo => {
            let r = a % b;
            if r != 0.0 && (r < 0.0) != (b < 0.0) {
                Ok(r + b)
            } else {
                Ok(r)
            }
        }
        _ => return None,
    };
    Some(result)
}

fn compare(cmp: CompareOp, a: &Value, b: &Value) -> Result<bool, RuntimeError> {
    let ordering = match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => match (as_int(a), as_int(b)) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => match (as_float(a), as_float(b)) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                // mixed kinds are only ever unequal
                _ => match cmp {
                    CompareOp::Eq => return Ok(false),
                    CompareOp::Ne => return Ok(true),
                    _ => return Err(type_error(cmp.symbol(), a.type_name(), b.type_name())),
                },
            },
        },
    };

    // NaN compares unequal to everything
    let Some(ordering) = ordering else {
        return Ok(cmp == CompareOp::Ne);
    };

    Ok(match cmp {
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
    })
}
