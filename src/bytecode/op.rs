// =============================================================================
// OPCODE - Wordcode instructions
// =============================================================================
//
// Every instruction is two bytes: the opcode followed by a one-byte operand.
// Instructions that take no argument carry a zero operand.

/// Width in bytes of one encoded instruction.
pub const INSTRUCTION_WIDTH: usize = 2;

/// Largest value an operand byte can hold.
pub const MAX_OPERAND: usize = u8::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    // stack ops
    PopTop = 1,
    RotTwo = 2,
    RotThree = 3,
    DupTop = 4,
    DupTopTwo = 5,
    RotFour = 6,

    // unary
    UnaryNegative = 11,
    UnaryInvert = 15,

    // arithmetic
    BinaryModulo = 22,
    InplaceFloorDivide = 28,
    InplaceAdd = 55,
    InplaceSubtract = 56,
    InplaceMultiply = 57,

    // bitwise
    InplaceLshift = 75,
    InplaceRshift = 76,
    InplaceAnd = 77,
    InplaceXor = 78,
    InplaceOr = 79,

    ReturnValue = 83,

    // ==========================================================================
    // Instructions with an operand
    // ==========================================================================
    /// Push `consts[arg]`.
    LoadConst = 100,

    /// Pop two values, push the result of `CompareOp::from(arg)`.
    CompareOp = 107,

    /// Relative jump: target is `offset + INSTRUCTION_WIDTH + arg`.
    JumpForward = 110,

    /// Absolute jump to byte offset `arg`.
    JumpAbsolute = 113,

    /// Pop a value, jump to byte offset `arg` if it is false.
    PopJumpIfFalse = 114,

    /// Pop a value, jump to byte offset `arg` if it is true.
    PopJumpIfTrue = 115,

    /// Push the local in slot `arg`.
    LoadFast = 124,

    /// Pop a value into slot `arg`.
    StoreFast = 125,
}

impl Opcode {
    pub const ALL: [Opcode; 27] = [
        Opcode::PopTop,
        Opcode::RotTwo,
        Opcode::RotThree,
        Opcode::DupTop,
        Opcode::DupTopTwo,
        Opcode::RotFour,
        Opcode::UnaryNegative,
        Opcode::UnaryInvert,
        Opcode::BinaryModulo,
        Opcode::InplaceFloorDivide,
        Opcode::InplaceAdd,
        Opcode::InplaceSubtract,
        Opcode::InplaceMultiply,
        Opcode::InplaceLshift,
        Opcode::InplaceRshift,
        Opcode::InplaceAnd,
        Opcode::InplaceXor,
        Opcode::InplaceOr,
        Opcode::ReturnValue,
        Opcode::LoadConst,
        Opcode::CompareOp,
        Opcode::JumpForward,
        Opcode::JumpAbsolute,
        Opcode::PopJumpIfFalse,
        Opcode::PopJumpIfTrue,
        Opcode::LoadFast,
        Opcode::StoreFast,
    ];

    pub fn from_byte(byte: u8) -> Option<Opcode> {
        Opcode::ALL.iter().copied().find(|op| *op as u8 == byte)
    }

    pub fn has_arg(self) -> bool {
        self as u8 >= Opcode::LoadConst as u8
    }

    /// Operand is a displacement from the end of the instruction.
    pub fn is_relative_jump(self) -> bool {
        matches!(self, Opcode::JumpForward)
    }

    /// Operand is a byte offset into the instruction buffer.
    pub fn is_absolute_jump(self) -> bool {
        matches!(
            self,
            Opcode::JumpAbsolute | Opcode::PopJumpIfFalse | Opcode::PopJumpIfTrue
        )
    }

    pub fn is_jump(self) -> bool {
        self.is_relative_jump() || self.is_absolute_jump()
    }

    /// Control never falls through to the next instruction.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Opcode::JumpForward | Opcode::JumpAbsolute | Opcode::ReturnValue
        )
    }

    /// Returns (pops, pushes).
    pub fn stack_effect(self) -> (usize, usize) {
        use Opcode::*;
        match self {
            PopTop => (1, 0),
            RotTwo => (2, 2),
            RotThree => (3, 3),
            DupTop => (1, 2),
            DupTopTwo => (2, 4),
            RotFour => (4, 4),

            UnaryNegative | UnaryInvert => (1, 1),

            BinaryModulo | InplaceFloorDivide | InplaceAdd | InplaceSubtract
            | InplaceMultiply | InplaceLshift | InplaceRshift | InplaceAnd | InplaceXor
            | InplaceOr | CompareOp => (2, 1),

            ReturnValue => (1, 0),

            LoadConst | LoadFast => (0, 1),
            StoreFast => (1, 0),

            JumpForward | JumpAbsolute => (0, 0),
            PopJumpIfFalse | PopJumpIfTrue => (1, 0),
        }
    }

    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            PopTop => "POP_TOP",
            RotTwo => "ROT_TWO",
            RotThree => "ROT_THREE",
            DupTop => "DUP_TOP",
            DupTopTwo => "DUP_TOP_TWO",
            RotFour => "ROT_FOUR",
            UnaryNegative => "UNARY_NEGATIVE",
            UnaryInvert => "UNARY_INVERT",
            BinaryModulo => "BINARY_MODULO",
            InplaceFloorDivide => "INPLACE_FLOOR_DIVIDE",
            InplaceAdd => "INPLACE_ADD",
            InplaceSubtract => "INPLACE_SUBTRACT",
            InplaceMultiply => "INPLACE_MULTIPLY",
            InplaceLshift => "INPLACE_LSHIFT",
            InplaceRshift => "INPLACE_RSHIFT",
            InplaceAnd => "INPLACE_AND",
            InplaceXor => "INPLACE_XOR",
            InplaceOr => "INPLACE_OR",
            ReturnValue => "RETURN_VALUE",
            LoadConst => "LOAD_CONST",
            CompareOp => "COMPARE_OP",
            JumpForward => "JUMP_FORWARD",
            JumpAbsolute => "JUMP_ABSOLUTE",
            PopJumpIfFalse => "POP_JUMP_IF_FALSE",
            PopJumpIfTrue => "POP_JUMP_IF_TRUE",
            LoadFast => "LOAD_FAST",
            StoreFast => "STORE_FAST",
        }
    }
}

/// Operand of `COMPARE_OP`, numbered by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompareOp {
    Lt = 0,
    Le = 1,
    Eq = 2,
    Ne = 3,
    Gt = 4,
    Ge = 5,
}

impl CompareOp {
    pub fn from_byte(byte: u8) -> Option<CompareOp> {
        Some(match byte {
            0 => CompareOp::Lt,
            1 => CompareOp::Le,
            2 => CompareOp::Eq,
            3 => CompareOp::Ne,
            4 => CompareOp::Gt,
            5 => CompareOp::Ge,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub opcode: Opcode,
    pub arg: u8,
}

impl Instruction {
    /// Resolved target of a jump instruction.
    pub fn jump_target(&self) -> Option<usize> {
        if self.opcode.is_relative_jump() {
            Some(self.offset + INSTRUCTION_WIDTH + self.arg as usize)
        } else if self.opcode.is_absolute_jump() {
            Some(self.arg as usize)
        } else {
            None
        }
    }
}

/// Decode a wordcode buffer. Fails with the offset of the first unknown
/// opcode byte.
pub fn decode(code: &[u8]) -> Result<Vec<Instruction>, usize> {
    code.chunks(INSTRUCTION_WIDTH)
        .enumerate()
        .map(|(i, pair)| {
            let offset = i * INSTRUCTION_WIDTH;
            let opcode = Opcode::from_byte(pair[0]).ok_or(offset)?;
            let arg = pair.get(1).copied().ok_or(offset)?;
            Ok(Instruction {
                offset,
                opcode,
                arg,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_roundtrip_for_every_opcode() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::from_byte(op as u8), Some(op));
        }
        assert_eq!(Opcode::from_byte(0), None);
        assert_eq!(Opcode::from_byte(255), None);
    }

    #[test]
    fn test_has_arg_split() {
        assert!(!Opcode::ReturnValue.has_arg());
        assert!(!Opcode::InplaceAdd.has_arg());
        assert!(Opcode::LoadConst.has_arg());
        assert!(Opcode::PopJumpIfFalse.has_arg());
    }

    #[test]
    fn test_jump_kinds() {
        assert!(Opcode::JumpForward.is_relative_jump());
        assert!(!Opcode::JumpForward.is_absolute_jump());
        assert!(Opcode::PopJumpIfFalse.is_absolute_jump());
        assert!(Opcode::JumpAbsolute.is_absolute_jump());
        assert!(!Opcode::LoadFast.is_jump());
    }

    #[test]
    fn test_jump_target_decoding() {
        let rel = Instruction {
            offset: 4,
            opcode: Opcode::JumpForward,
            arg: 6,
        };
        assert_eq!(rel.jump_target(), Some(12));

        let abs = Instruction {
            offset: 10,
            opcode: Opcode::JumpAbsolute,
            arg: 2,
        };
        assert_eq!(abs.jump_target(), Some(2));

        let plain = Instruction {
            offset: 0,
            opcode: Opcode::DupTop,
            arg: 0,
        };
        assert_eq!(plain.jump_target(), None);
    }

    #[test]
    fn test_decode() {
        let code = [100, 0, 4, 0, 83, 0];
        let ops: Vec<_> = decode(&code)
            .unwrap()
            .into_iter()
            .map(|i| (i.offset, i.opcode, i.arg))
            .collect();
        assert_eq!(
            ops,
            vec![
                (0, Opcode::LoadConst, 0),
                (2, Opcode::DupTop, 0),
                (4, Opcode::ReturnValue, 0)
            ]
        );
    }

    #[test]
    fn test_decode_rejects_unknown_opcode() {
        assert_eq!(decode(&[4, 0, 9, 0]), Err(2));
        assert_eq!(decode(&[4]), Err(0));
    }

    #[test]
    fn test_compare_op_numbering() {
        assert_eq!(CompareOp::Ge as u8, 5);
        assert_eq!(CompareOp::from_byte(2), Some(CompareOp::Eq));
        assert_eq!(CompareOp::from_byte(6), None);
        assert_eq!(CompareOp::Ne.symbol(), "!=");
    }
}
