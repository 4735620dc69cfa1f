use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// A literal value: a constant-pool entry at compile time and an operand
/// stack entry at run time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// 64-bit signed integer.
    Integer(i64),

    /// 64-bit floating-point number.
    Float(f64),

    /// Boolean value, produced by comparisons.
    Bool(bool),

    /// String literal. Only whitespace-free strings can be written in source.
    String(String),
}

/// Why a word is not a literal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralError {
    /// The word does not have literal syntax at all.
    NotALiteral,
    /// The word is written as an integer but does not fit in `i64`.
    OutOfRange,
}

impl Value {
    /// Parse a source word as a literal.
    ///
    /// Accepts signed decimal integers (with `_` separators), `0x`/`0o`/`0b`
    /// radix integers, floats, `true`/`false`, and quoted strings. A word in
    /// integer syntax never falls back to a float.
    pub fn parse_literal(word: &str) -> Result<Value, LiteralError> {
        match word {
            "true" => return Ok(Value::Bool(true)),
            "false" => return Ok(Value::Bool(false)),
            _ => {}
        }

        if let Some(s) = unquote(word) {
            return Ok(Value::String(s.to_string()));
        }

        if let Some(n) = parse_integer(word) {
            return n.map(Value::Integer);
        }

        parse_float(word)
            .map(Value::Float)
            .ok_or(LiteralError::NotALiteral)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::String(_) => "str",
        }
    }

    /// Truthiness used by conditional jumps: zero, `false` and the empty
    /// string are false, everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Integer(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::Bool(b) => *b,
            Value::String(s) => !s.is_empty(),
        }
    }
}

fn unquote(word: &str) -> Option<&str> {
    let bytes = word.as_bytes();
    if bytes.len() < 2 {
        return None;
    }
    let quote = bytes[0];
    if (quote == b'\'' || quote == b'"') && bytes[bytes.len() - 1] == quote {
        Some(&word[1..word.len() - 1])
    } else {
        None
    }
}

/// `None` if `word` is not in integer syntax.
fn parse_integer(word: &str) -> Option<Result<i64, LiteralError>> {
    let (negative, body) = match word.as_bytes().first()? {
        b'-' => (true, &word[1..]),
        b'+' => (false, &word[1..]),
        _ => (false, word),
    };

    let (radix, digits) = match body.get(..2) {
        Some("0x") | Some("0X") => (16, &body[2..]),
        Some("0o") | Some("0O") => (8, &body[2..]),
        Some("0b") | Some("0B") => (2, &body[2..]),
        _ => (10, body),
    };

    // separators only between digits
    if digits.is_empty() || digits.starts_with('_') || digits.ends_with('_') {
        return None;
    }
    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    if !cleaned.chars().all(|c| c.is_digit(radix)) {
        return None;
    }

    let value = i128::from_str_radix(&cleaned, radix)
        .ok()
        .map(|magnitude| if negative { -magnitude } else { magnitude })
        .and_then(|value| i64::try_from(value).ok())
        .ok_or(LiteralError::OutOfRange);
    Some(value)
}

fn parse_float(word: &str) -> Option<f64> {
    // `f64::from_str` also accepts "inf" and "nan", which are words here
    let starts_numeric = word
        .trim_start_matches(['-', '+'])
        .starts_with(|c: char| c.is_ascii_digit() || c == '.');
    if !starts_numeric {
        return None;
    }
    word.parse::<f64>().ok()
}

impl PartialEq for Value {
    /// Identity equality: floats compare by bit pattern and values of
    /// different variants are never equal, so `1`, `1.0` and `true` stay
    /// distinct constants.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Integer(n) => n.hash(state),
            Value::Float(n) => n.to_bits().hash(state),
            Value::Bool(b) => b.hash(state),
            Value::String(s) => s.hash(state),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{:?}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "'{}'", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_integers() {
        assert_eq!(Value::parse_literal("42"), Ok(Value::Integer(42)));
        assert_eq!(Value::parse_literal("-7"), Ok(Value::Integer(-7)));
        assert_eq!(Value::parse_literal("+3"), Ok(Value::Integer(3)));
        assert_eq!(Value::parse_literal("1_000"), Ok(Value::Integer(1000)));
        assert_eq!(Value::parse_literal("0x1f"), Ok(Value::Integer(31)));
        assert_eq!(Value::parse_literal("0b101"), Ok(Value::Integer(5)));
        assert_eq!(Value::parse_literal("-0o17"), Ok(Value::Integer(-15)));
    }

    #[test]
    fn test_parse_integer_bounds() {
        assert_eq!(
            Value::parse_literal("-9223372036854775808"),
            Ok(Value::Integer(i64::MIN))
        );
        assert_eq!(
            Value::parse_literal("9223372036854775807"),
            Ok(Value::Integer(i64::MAX))
        );
        for word in [
            "9223372036854775808",
            "-9223372036854775809",
            "99999999999999999999",
            "1_000_000_000_000_000_000_000",
            "0x10000000000000000",
            "999999999999999999999999999999999999999999",
        ] {
            assert_eq!(Value::parse_literal(word), Err(LiteralError::OutOfRange), "{}", word);
        }
    }

    #[test]
    fn test_large_values_need_float_syntax() {
        assert_eq!(Value::parse_literal("1e20"), Ok(Value::Float(1e20)));
        assert_eq!(
            Value::parse_literal("99999999999999999999.0"),
            Ok(Value::Float(1e20))
        );
    }

    #[test]
    fn test_parse_floats() {
        assert_eq!(Value::parse_literal("1.5"), Ok(Value::Float(1.5)));
        assert_eq!(Value::parse_literal("-2e3"), Ok(Value::Float(-2000.0)));
        assert_eq!(Value::parse_literal(".25"), Ok(Value::Float(0.25)));
    }

    #[test]
    fn test_parse_other_literals() {
        assert_eq!(Value::parse_literal("true"), Ok(Value::Bool(true)));
        assert_eq!(
            Value::parse_literal("'abc'"),
            Ok(Value::String("abc".to_string()))
        );
        assert_eq!(
            Value::parse_literal("\"x\""),
            Ok(Value::String("x".to_string()))
        );
    }

    #[test]
    fn test_rejects_words() {
        for word in ["dup", "inf", "nan", "-", "+", "'", "1_", "_1", "0x", "2dup", "-rot"] {
            assert_eq!(
                Value::parse_literal(word),
                Err(LiteralError::NotALiteral),
                "{}",
                word
            );
        }
    }

    #[test]
    fn test_identity_equality() {
        assert_ne!(Value::Integer(1), Value::Float(1.0));
        assert_ne!(Value::Integer(1), Value::Bool(true));
        assert_ne!(Value::Float(0.0), Value::Float(-0.0));
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Integer(0).is_truthy());
        assert!(Value::Integer(-1).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
        assert!(Value::Bool(true).is_truthy());
    }
}
