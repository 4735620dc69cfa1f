use crate::lexer::Span;

#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// A word with no table entry, no local binding, and no literal reading
    UnknownWord { word: String, line: usize },

    /// An integer literal outside the 64-bit signed range
    LiteralOutOfRange { word: String, line: usize },

    /// A block- or region-closing word with nothing (or the wrong thing) to close
    Unbalanced {
        word: String,
        line: usize,
        reason: String,
    },

    /// Input ended while a block, region or `to` was still pending
    Unclosed { opened_by: String, line: usize },

    /// A local declared twice, or a second `:` name
    DuplicateDeclaration {
        name: String,
        line: usize,
        first_line: usize,
    },

    /// An operand that does not fit in its instruction
    EncodingOverflow {
        word: String,
        line: usize,
        what: &'static str,
        value: usize,
        limit: usize,
    },

    /// The assembled code pops from an empty operand stack
    StackUnderflow { offset: usize, mnemonic: String },

    /// Internal compiler error (shouldn't happen in normal use)
    Internal(String),
}

impl CompileError {
    pub fn unknown_word(word: &str, span: Span) -> Self {
        CompileError::UnknownWord {
            word: word.to_string(),
            line: span.display_line(),
        }
    }

    pub fn literal_out_of_range(word: &str, span: Span) -> Self {
        CompileError::LiteralOutOfRange {
            word: word.to_string(),
            line: span.display_line(),
        }
    }

    pub fn unbalanced(word: &str, span: Span, reason: impl Into<String>) -> Self {
        CompileError::Unbalanced {
            word: word.to_string(),
            line: span.display_line(),
            reason: reason.into(),
        }
    }

    pub fn unclosed(opened_by: &str, span: Span) -> Self {
        CompileError::Unclosed {
            opened_by: opened_by.to_string(),
            line: span.display_line(),
        }
    }

    pub fn duplicate(name: &str, span: Span, first: Span) -> Self {
        CompileError::DuplicateDeclaration {
            name: name.to_string(),
            line: span.display_line(),
            first_line: first.display_line(),
        }
    }

    pub fn overflow(word: &str, span: Span, what: &'static str, value: usize) -> Self {
        CompileError::EncodingOverflow {
            word: word.to_string(),
            line: span.display_line(),
            what,
            value,
            limit: super::op::MAX_OPERAND,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CompileError::Internal(msg.into())
    }

    /// One-based source line, when the error points at one.
    pub fn line(&self) -> Option<usize> {
        match self {
            CompileError::UnknownWord { line, .. }
            | CompileError::LiteralOutOfRange { line, .. }
            | CompileError::Unbalanced { line, .. }
            | CompileError::Unclosed { line, .. }
            | CompileError::DuplicateDeclaration { line, .. }
            | CompileError::EncodingOverflow { line, .. } => Some(*line),
            CompileError::StackUnderflow { .. } | CompileError::Internal(_) => None,
        }
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::UnknownWord { word, line } => {
                write!(f, "compile error: line {}: unknown word '{}'", line, word)?;
                write!(
                    f,
                    "\n  hint: words must be built-ins, declared locals, or literals"
                )
            }
            CompileError::LiteralOutOfRange { word, line } => {
                write!(
                    f,
                    "compile error: line {}: integer literal '{}' does not fit in 64 bits",
                    line, word
                )?;
                write!(f, "\n  hint: write it with a decimal point or exponent for a float")
            }
            CompileError::Unbalanced { word, line, reason } => {
                write!(f, "compile error: line {}: '{}' {}", line, word, reason)
            }
            CompileError::Unclosed { opened_by, line } => {
                write!(
                    f,
                    "compile error: '{}' on line {} is never closed",
                    opened_by, line
                )?;
                let closer = match opened_by.as_str() {
                    "if" | "else" => "then",
                    "begin" => "repeat, until or again",
                    "{" => "}",
                    ":" => "a name",
                    "to" => "a local name",
                    _ => return Ok(()),
                };
                write!(f, "\n  hint: expected {} before end of input", closer)
            }
            CompileError::DuplicateDeclaration {
                name,
                line,
                first_line,
            } => {
                write!(
                    f,
                    "compile error: line {}: '{}' is already declared on line {}",
                    line, name, first_line
                )
            }
            CompileError::EncodingOverflow {
                word,
                line,
                what,
                value,
                limit,
            } => {
                write!(
                    f,
                    "compile error: line {}: '{}' needs {} {}, but operands hold at most {}",
                    line, word, what, value, limit
                )?;
                write!(f, "\n  hint: split the code into smaller units")
            }
            CompileError::StackUnderflow { offset, mnemonic } => {
                write!(
                    f,
                    "compile error: stack underflow at offset {} ({})",
                    offset, mnemonic
                )
            }
            CompileError::Internal(msg) => {
                write!(f, "compile error: internal error: {}", msg)
            }
        }
    }
}

impl std::error::Error for CompileError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(line: usize) -> Span {
        Span { line, col: 1 }
    }

    #[test]
    fn test_unknown_word_display() {
        let err = CompileError::unknown_word("frob", span(2));

        let msg = err.to_string();
        assert!(msg.contains("unknown word 'frob'"));
        assert!(msg.contains("line 3"));
        assert!(msg.contains("hint"));
    }

    #[test]
    fn test_literal_out_of_range_display() {
        let err = CompileError::literal_out_of_range("99999999999999999999", span(0));

        let msg = err.to_string();
        assert!(msg.contains("line 1"));
        assert!(msg.contains("'99999999999999999999' does not fit in 64 bits"));
        assert!(msg.contains("hint"));
        assert_eq!(err.line(), Some(1));
    }

    #[test]
    fn test_unbalanced_display() {
        let err = CompileError::unbalanced("then", span(0), "has no matching if");

        let msg = err.to_string();
        assert!(msg.contains("'then' has no matching if"));
        assert!(msg.contains("line 1"));
    }

    #[test]
    fn test_unclosed_display_names_closer() {
        let msg = CompileError::unclosed("begin", span(4)).to_string();
        assert!(msg.contains("'begin' on line 5 is never closed"));
        assert!(msg.contains("repeat"));

        let msg = CompileError::unclosed("if", span(0)).to_string();
        assert!(msg.contains("expected then"));
    }

    #[test]
    fn test_duplicate_display() {
        let err = CompileError::duplicate("n", span(3), span(1));
        assert!(err.to_string().contains("'n' is already declared on line 2"));
    }

    #[test]
    fn test_overflow_display() {
        let err = CompileError::overflow("repeat", span(0), "jump target", 300);

        let msg = err.to_string();
        assert!(msg.contains("jump target 300"));
        assert!(msg.contains("at most 255"));
    }

    #[test]
    fn test_line_accessor() {
        assert_eq!(CompileError::unknown_word("x", span(9)).line(), Some(10));
        assert_eq!(CompileError::internal("boom").line(), None);
    }

    #[test]
    fn test_error_implements_std_error() {
        let err = CompileError::internal("test");
        let _: &dyn std::error::Error = &err;
    }
}
