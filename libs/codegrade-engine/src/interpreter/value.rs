use crate::error::Fault;
use crate::sandbox::MAX_VALUE_BYTES;
use std::cmp::Ordering;
use std::fmt;

/// Dynamically typed guest value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

/// Numeric view of a value; booleans coerce to 0/1
#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
        }
    }

    /// Operator of a compound assignment such as `+=`
    pub fn from_compound(c: char) -> Option<Self> {
        match c {
            '+' => Some(BinaryOp::Add),
            '-' => Some(BinaryOp::Sub),
            '*' => Some(BinaryOp::Mul),
            '/' => Some(BinaryOp::Div),
            '%' => Some(BinaryOp::Mod),
            _ => None,
        }
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bool(_) => "bool",
        }
    }

    /// Non-zero, non-empty and `True` are truthy
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bool(b) => *b,
        }
    }

    fn as_number(&self) -> Option<Number> {
        match self {
            Value::Int(i) => Some(Number::Int(*i)),
            Value::Float(f) => Some(Number::Float(*f)),
            Value::Bool(b) => Some(Number::Int(i64::from(*b))),
            Value::Str(_) => None,
        }
    }

    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Str(_), _) | (_, Value::Str(_)) => false,
            _ => match (self.as_number(), other.as_number()) {
                (Some(Number::Int(a)), Some(Number::Int(b))) => a == b,
                (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
                _ => false,
            },
        }
    }

    /// Ordering between two values; mixing strings and numbers is a fault
    pub fn compare(&self, other: &Value, symbol: &str) -> Result<Ordering, Fault> {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            _ => match (self.as_number(), other.as_number()) {
                (Some(Number::Int(a)), Some(Number::Int(b))) => Ok(a.cmp(&b)),
                (Some(a), Some(b)) => a
                    .as_f64()
                    .partial_cmp(&b.as_f64())
                    .ok_or_else(|| Fault::Value("comparison with nan".to_string())),
                _ => Err(Fault::Type(format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    symbol,
                    self.type_name(),
                    other.type_name()
                ))),
            },
        }
    }

    pub fn binary(&self, op: BinaryOp, rhs: &Value) -> Result<Value, Fault> {
        match (op, self, rhs) {
            (BinaryOp::Add, Value::Str(a), Value::Str(b)) => {
                check_string_size(a.len().checked_add(b.len()))?;
                return Ok(Value::Str(format!("{a}{b}")));
            }
            (BinaryOp::Mul, Value::Str(s), Value::Int(n)) | (BinaryOp::Mul, Value::Int(n), Value::Str(s)) => {
                let times = usize::try_from(*n).unwrap_or(0);
                check_string_size(s.len().checked_mul(times))?;
                return Ok(Value::Str(s.repeat(times)));
            }
            _ => {}
        }

        let (Some(a), Some(b)) = (self.as_number(), rhs.as_number()) else {
            return Err(Fault::Type(format!(
                "unsupported operand type(s) for {}: '{}' and '{}'",
                op.symbol(),
                self.type_name(),
                rhs.type_name()
            )));
        };

        match (a, b) {
            (Number::Int(x), Number::Int(y)) => int_binary(op, x, y),
            _ => float_binary(op, a.as_f64(), b.as_f64()),
        }
    }

    /// Unary minus
    pub fn negate(&self) -> Result<Value, Fault> {
        match self.as_number() {
            Some(Number::Int(i)) => Ok(i
                .checked_neg()
                .map(Value::Int)
                .unwrap_or(Value::Float(-(i as f64)))),
            Some(Number::Float(f)) => Ok(Value::Float(-f)),
            None => Err(Fault::Type(format!(
                "bad operand type for unary -: '{}'",
                self.type_name()
            ))),
        }
    }
}

/// Refuse to build a string above [`MAX_VALUE_BYTES`]; `None` means the
/// size itself overflowed
pub fn check_string_size(len: Option<usize>) -> Result<(), Fault> {
    match len {
        Some(len) if len <= MAX_VALUE_BYTES => Ok(()),
        _ => Err(Fault::Memory(format!(
            "string result exceeds {} bytes",
            MAX_VALUE_BYTES
        ))),
    }
}

fn int_binary(op: BinaryOp, x: i64, y: i64) -> Result<Value, Fault> {
    if y == 0 && matches!(op, BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod) {
        return Err(Fault::ZeroDivision);
    }

    // Overflow promotes to float rather than wrapping
    let exact = match op {
        BinaryOp::Add => x.checked_add(y),
        BinaryOp::Sub => x.checked_sub(y),
        BinaryOp::Mul => x.checked_mul(y),
        BinaryOp::Div => return Ok(Value::Float(x as f64 / y as f64)),
        BinaryOp::FloorDiv => x.checked_div(y).map(|q| {
            if x % y != 0 && ((x < 0) != (y < 0)) {
                q - 1
            } else {
                q
            }
        }),
        BinaryOp::Mod => x.checked_rem(y).map(|r| {
            if r != 0 && ((r < 0) != (y < 0)) {
                r + y
            } else {
                r
            }
        }),
        BinaryOp::Pow => {
            if y < 0 {
                return Ok(Value::Float((x as f64).powf(y as f64)));
            }
            u32::try_from(y).ok().and_then(|e| x.checked_pow(e))
        }
    };

    match exact {
        Some(v) => Ok(Value::Int(v)),
        None => float_binary(op, x as f64, y as f64),
    }
}

fn float_binary(op: BinaryOp, x: f64, y: f64) -> Result<Value, Fault> {
    if y == 0.0 && matches!(op, BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod) {
        return Err(Fault::ZeroDivision);
    }

    let v = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => x / y,
        BinaryOp::FloorDiv => (x / y).floor(),
        BinaryOp::Mod => x - y * (x / y).floor(),
        BinaryOp::Pow => x.powf(y),
    };
    Ok(Value::Float(v))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) if x.is_nan() => write!(f, "nan"),
            Value::Float(x) if x.is_infinite() => {
                write!(f, "{}", if *x > 0.0 { "inf" } else { "-inf" })
            }
            Value::Float(x) if x.fract() == 0.0 && x.abs() < 1e16 => write!(f, "{:.1}", x),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_guest_conventions() {
        assert_eq!(Value::Int(-3).to_string(), "-3");
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::Str("hi".into()).to_string(), "hi");
    }

    #[test]
    fn test_oversized_strings_fault_before_allocating() {
        let a = Value::Str("a".to_string());
        let huge = Value::Int(1_000_000_000_000_000);
        assert!(matches!(a.binary(BinaryOp::Mul, &huge), Err(Fault::Memory(_))));
        assert!(matches!(huge.binary(BinaryOp::Mul, &a), Err(Fault::Memory(_))));
        assert!(matches!(
            a.binary(BinaryOp::Mul, &Value::Int(i64::MAX)),
            Err(Fault::Memory(_))
        ));

        let half = Value::Str("x".repeat(MAX_VALUE_BYTES / 2 + 1));
        assert!(matches!(half.binary(BinaryOp::Add, &half), Err(Fault::Memory(_))));

        let at_limit = a.binary(BinaryOp::Mul, &Value::Int(MAX_VALUE_BYTES as i64)).unwrap();
        assert_eq!(at_limit, Value::Str("a".repeat(MAX_VALUE_BYTES)));
        assert_eq!(a.binary(BinaryOp::Mul, &Value::Int(-2)), Ok(Value::Str(String::new())));
    }

    #[test]
    fn test_floor_semantics() {
        assert_eq!(Value::Int(-7).binary(BinaryOp::FloorDiv, &Value::Int(2)), Ok(Value::Int(-4)));
        assert_eq!(Value::Int(-7).binary(BinaryOp::Mod, &Value::Int(2)), Ok(Value::Int(1)));
        assert_eq!(Value::Int(7).binary(BinaryOp::Mod, &Value::Int(-2)), Ok(Value::Int(-1)));
        assert_eq!(Value::Int(7).binary(BinaryOp::Div, &Value::Int(2)), Ok(Value::Float(3.5)));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(Value::Int(1).binary(BinaryOp::Mod, &Value::Int(0)), Err(Fault::ZeroDivision));
        assert_eq!(Value::Float(1.0).binary(BinaryOp::Div, &Value::Int(0)), Err(Fault::ZeroDivision));
    }

    #[test]
    fn test_string_operators() {
        let ab = Value::Str("ab".into());
        assert_eq!(ab.binary(BinaryOp::Add, &Value::Str("c".into())), Ok(Value::Str("abc".into())));
        assert_eq!(ab.binary(BinaryOp::Mul, &Value::Int(3)), Ok(Value::Str("ababab".into())));
        assert!(matches!(ab.binary(BinaryOp::Sub, &Value::Int(1)), Err(Fault::Type(_))));
    }

    #[test]
    fn test_overflow_promotes_to_float() {
        let result = Value::Int(i64::MAX).binary(BinaryOp::Add, &Value::Int(1)).unwrap();
        assert!(matches!(result, Value::Float(_)));
    }

    #[test]
    fn test_mixed_comparison_is_type_error() {
        let err = Value::Str("a".into()).compare(&Value::Int(1), "<").unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: '<' not supported between instances of 'str' and 'int'"
        );
        assert!(Value::Int(1).loosely_equals(&Value::Float(1.0)));
        assert!(Value::Bool(true).loosely_equals(&Value::Int(1)));
        assert!(!Value::Str("1".into()).loosely_equals(&Value::Int(1)));
    }
}
