use std::collections::HashMap;

use crate::bytecode::op::{CompareOp, Opcode};

/// What compiling a word does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Emit a fixed instruction sequence, each with a zero operand.
    Template(&'static [Opcode]),

    /// Emit `COMPARE_OP` with the given comparison.
    Compare(CompareOp),

    /// Run a stateful emitter against the compiler context.
    Emit(Emitter),
}

/// Emitters that read or mutate compiler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emitter {
    If,
    Else,
    Then,
    Begin,
    While,
    Repeat,
    Until,
    Again,
    /// `{` opens a local declaration region.
    OpenLocals,
    /// `}` closes it.
    CloseLocals,
    /// `to` turns the next local reference into a store.
    To,
    /// `:` takes the next word as the code object's name.
    Define,
    /// `2/` shifts right by an interned literal `1`.
    Halve,
}

/// Fallback for words the table does not resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultAction {
    EmitLiteral,
    DeclareLocal,
    DefineName,
}

/// Static mapping from source word to compiling action, fixed before
/// compilation starts.
#[derive(Debug, Clone)]
pub struct WordTable {
    words: HashMap<&'static str, Action>,
}

impl WordTable {
    pub fn standard() -> Self {
        use crate::bytecode::op::CompareOp as Cmp;
        use Action::*;
        use Opcode::*;

        let words = HashMap::from([
            // arithmetic
            ("+", Template(&[InplaceAdd])),
            ("-", Template(&[InplaceSubtract])),
            ("*", Template(&[InplaceMultiply])),
            ("/", Template(&[InplaceFloorDivide])),
            ("mod", Template(&[BinaryModulo])),
            ("negate", Template(&[UnaryNegative])),
            ("2*", Template(&[DupTop, InplaceAdd])),
            ("2/", Emit(Emitter::Halve)),
            // bitwise
            ("and", Template(&[InplaceAnd])),
            ("or", Template(&[InplaceOr])),
            ("xor", Template(&[InplaceXor])),
            ("invert", Template(&[UnaryInvert])),
            ("lshift", Template(&[InplaceLshift])),
            ("rshift", Template(&[InplaceRshift])),
            // stack
            ("drop", Template(&[PopTop])),                   // w --
            ("nip", Template(&[RotTwo, PopTop])),            // w1 w2 -- w2
            ("dup", Template(&[DupTop])),                    // w -- w w
            ("over", Template(&[RotTwo, DupTop, RotThree])), // w1 w2 -- w1 w2 w1
            ("tuck", Template(&[DupTop, RotThree])),         // w1 w2 -- w2 w1 w2
            ("swap", Template(&[RotTwo])),                   // w1 w2 -- w2 w1
            ("rot", Template(&[RotThree, RotThree])),        // w1 w2 w3 -- w2 w3 w1
            ("-rot", Template(&[RotThree])),                 // w1 w2 w3 -- w3 w1 w2
            ("2drop", Template(&[PopTop, PopTop])),          // w1 w2 --
            ("2nip", Template(&[RotFour, RotFour, PopTop, PopTop])), // w1 w2 w3 w4 -- w3 w4
            ("2dup", Template(&[DupTopTwo])),                // w1 w2 -- w1 w2 w1 w2
            ("2swap", Template(&[RotFour, RotFour])),        // w1 w2 w3 w4 -- w3 w4 w1 w2
            (";", Template(&[ReturnValue])),
            // comparison
            ("<", Compare(Cmp::Lt)),
            ("<=", Compare(Cmp::Le)),
            ("==", Compare(Cmp::Eq)),
            ("=", Compare(Cmp::Eq)),
            ("!=", Compare(Cmp::Ne)),
            ("<>", Compare(Cmp::Ne)),
            (">", Compare(Cmp::Gt)),
            (">=", Compare(Cmp::Ge)),
            // control flow
            ("if", Emit(Emitter::If)),
            ("else", Emit(Emitter::Else)),
            ("then", Emit(Emitter::Then)),
            ("begin", Emit(Emitter::Begin)),
            ("while", Emit(Emitter::While)),
            ("repeat", Emit(Emitter::Repeat)),
            ("until", Emit(Emitter::Until)),
            ("again", Emit(Emitter::Again)),
            // compiler state
            ("{", Emit(Emitter::OpenLocals)),
            ("}", Emit(Emitter::CloseLocals)),
            ("to", Emit(Emitter::To)),
            (":", Emit(Emitter::Define)),
        ]);

        WordTable { words }
    }

    pub fn get(&self, word: &str) -> Option<Action> {
        self.words.get(word).copied()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains_key(word)
    }
}

impl Default for WordTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates() {
        let table = WordTable::standard();
        assert_eq!(table.get("swap"), Some(Action::Template(&[Opcode::RotTwo])));
        assert_eq!(
            table.get("2*"),
            Some(Action::Template(&[Opcode::DupTop, Opcode::InplaceAdd]))
        );
    }

    #[test]
    fn test_forth_comparison_aliases() {
        let table = WordTable::standard();
        assert_eq!(table.get("="), table.get("=="));
        assert_eq!(table.get("<>"), Some(Action::Compare(CompareOp::Ne)));
    }

    #[test]
    fn test_comparison_words() {
        let table = WordTable::standard();
        let expected = [
            ("<", CompareOp::Lt),
            ("<=", CompareOp::Le),
            ("==", CompareOp::Eq),
            ("!=", CompareOp::Ne),
            (">", CompareOp::Gt),
            (">=", CompareOp::Ge),
        ];
        for (word, cmp) in expected {
            assert_eq!(table.get(word), Some(Action::Compare(cmp)), "{}", word);
        }
    }

    #[test]
    fn test_stateful_words() {
        let table = WordTable::standard();
        assert_eq!(table.get("repeat"), Some(Action::Emit(Emitter::Repeat)));
        assert_eq!(table.get("to"), Some(Action::Emit(Emitter::To)));
        assert_eq!(table.get("2/"), Some(Action::Emit(Emitter::Halve)));
    }

    #[test]
    fn test_unknown_words_fall_through() {
        let table = WordTable::standard();
        assert_eq!(table.get("42"), None);
        assert!(!table.contains("fib"));
        assert!(table.contains("dup"));
    }
}
