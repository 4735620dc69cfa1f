#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub message: String,
    /// Offset of the instruction that failed, when known.
    pub offset: Option<usize>,
    pub help: Option<String>,
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime error: {}", self.message)?;

        if let Some(offset) = self.offset {
            write!(f, "\n  at offset {:04}", offset)?;
        }
        if let Some(help) = &self.help {
            write!(f, "\n  help: {}", help)?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

impl RuntimeError {
    pub fn new(msg: impl Into<String>) -> Self {
        RuntimeError {
            message: msg.into(),
            offset: None,
            help: None,
        }
    }

    pub fn at(mut self, offset: usize) -> Self {
        self.offset.get_or_insert(offset);
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

pub fn stack_underflow(mnemonic: &str) -> RuntimeError {
    RuntimeError::new(format!("stack underflow in {}", mnemonic))
        .with_help("The compiled code popped more values than it pushed")
}

pub fn type_error(op: &str, a: &str, b: &str) -> RuntimeError {
    RuntimeError::new(format!("type error: unsupported operands for {}: {} and {}", op, a, b))
}

pub fn division_by_zero(op: &str) -> RuntimeError {
    RuntimeError::new(format!("{} by zero", op)).with_help("Check that the divisor is not zero")
}

pub fn integer_overflow(op: &str) -> RuntimeError {
    RuntimeError::new(format!("integer overflow in {}", op))
        .with_help("Integers are 64-bit signed; use a float literal for larger values")
}

pub fn unbound_local(name: &str) -> RuntimeError {
    RuntimeError::new(format!("local '{}' referenced before assignment", name))
        .with_help(format!("Assign it first with 'to {}'", name))
}
