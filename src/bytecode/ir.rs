use crate::bytecode::op::{self, Instruction};
use crate::lang::value::Value;
use serde::{Deserialize, Serialize};

/// Code object flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CodeFlags(pub u32);

impl CodeFlags {
    /// Locals live in slots, no name lookups.
    pub const OPTIMIZED: CodeFlags = CodeFlags(0x1);
    /// A fresh locals array per call.
    pub const NEWLOCALS: CodeFlags = CodeFlags(0x2);
    /// No free or closure variables.
    pub const NOFREE: CodeFlags = CodeFlags(0x40);

    /// The flag set every compiled unit carries.
    pub const LOCALS_ONLY: CodeFlags =
        CodeFlags(Self::OPTIMIZED.0 | Self::NEWLOCALS.0 | Self::NOFREE.0);

    pub fn contains(self, other: CodeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn names(self) -> Vec<&'static str> {
        [
            (Self::OPTIMIZED, "OPTIMIZED"),
            (Self::NEWLOCALS, "NEWLOCALS"),
            (Self::NOFREE, "NOFREE"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
        .collect()
    }
}

impl std::ops::BitOr for CodeFlags {
    type Output = CodeFlags;

    fn bitor(self, rhs: CodeFlags) -> CodeFlags {
        CodeFlags(self.0 | rhs.0)
    }
}

/// One line-table entry: bytes emitted and source lines advanced since the
/// previous entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDelta {
    pub bytes: usize,
    pub lines: usize,
}

/// The assembled, immutable result of compiling one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeObject {
    pub argcount: usize,
    /// Parameters plus declared locals.
    pub nlocals: usize,
    /// Deepest the operand stack gets.
    pub stacksize: usize,
    pub flags: CodeFlags,
    /// Wordcode: opcode byte, operand byte.
    pub code: Vec<u8>,
    /// `LOAD_CONST k` reads `consts[k]`.
    pub consts: Vec<Value>,
    /// Slot `k` is named `varnames[k]`.
    pub varnames: Vec<String>,
    pub filename: String,
    pub name: String,
    pub first_line: usize,
    pub line_table: Vec<LineDelta>,
}

impl CodeObject {
    pub fn instructions(&self) -> Result<Vec<Instruction>, usize> {
        op::decode(&self.code)
    }

    /// Source line (offset by `first_line`) that emitted the instruction at
    /// `offset`. Instructions added by the assembler have no line.
    pub fn line_for_offset(&self, offset: usize) -> Option<usize> {
        let mut start = 0;
        let mut line = 0;
        for entry in &self.line_table {
            line += entry.lines;
            let end = start + entry.bytes;
            if offset < end {
                return Some(self.first_line + line);
            }
            start = end;
        }
        None
    }

    /// Compact binary form handed to a host VM.
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<CodeObject, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CodeObject {
        CodeObject {
            argcount: 1,
            nlocals: 2,
            stacksize: 2,
            flags: CodeFlags::LOCALS_ONLY,
            code: vec![124, 0, 100, 0, 55, 0, 83, 0],
            consts: vec![Value::Integer(1)],
            varnames: vec!["n".to_string(), "m".to_string()],
            filename: "<test>".to_string(),
            name: "inc".to_string(),
            first_line: 10,
            line_table: vec![
                LineDelta { bytes: 4, lines: 0 },
                LineDelta { bytes: 0, lines: 1 },
                LineDelta { bytes: 2, lines: 1 },
            ],
        }
    }

    #[test]
    fn test_flags() {
        let flags = CodeFlags::OPTIMIZED | CodeFlags::NEWLOCALS | CodeFlags::NOFREE;
        assert_eq!(flags, CodeFlags::LOCALS_ONLY);
        assert_eq!(flags.0, 0x43);
        assert!(flags.contains(CodeFlags::NOFREE));
        assert!(!CodeFlags::OPTIMIZED.contains(CodeFlags::NOFREE));
        assert_eq!(flags.names(), vec!["OPTIMIZED", "NEWLOCALS", "NOFREE"]);
    }

    #[test]
    fn test_line_for_offset() {
        let code = sample();
        assert_eq!(code.line_for_offset(0), Some(10));
        assert_eq!(code.line_for_offset(2), Some(10));
        assert_eq!(code.line_for_offset(4), Some(12));
        // epilogue, not covered by the table
        assert_eq!(code.line_for_offset(6), None);
    }

    #[test]
    fn test_postcard_handoff() {
        let code = sample();
        let bytes = code.to_bytes().unwrap();
        assert_eq!(CodeObject::from_bytes(&bytes).unwrap(), code);
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        assert!(CodeObject::from_bytes(&[0xff]).is_err());
    }
}
