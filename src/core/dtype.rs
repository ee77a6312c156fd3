//! Element types and dynamically typed values

use serde::{Deserialize, Serialize};
use std::fmt;

/// Size in bytes of a variable-length string slot (u64 heap offset + u32 length)
pub const VAR_STRING_SLOT: usize = 12;

/// Element type of a vector, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dtype {
    Char,
    Short,
    Int,
    Float,
    Double,
    /// Null-padded string of exactly N bytes on disk
    FixedString(u32),
    /// Owned string of any length, stored through the dataset heap
    VarString,
}

impl Dtype {
    /// Width of one encoded element in the data stream
    pub fn width(&self) -> usize {
        match self {
            Dtype::Char => 1,
            Dtype::Short => 2,
            Dtype::Int => 4,
            Dtype::Float => 4,
            Dtype::Double => 8,
            Dtype::FixedString(n) => (*n as usize).max(1),
            Dtype::VarString => VAR_STRING_SLOT,
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Dtype::FixedString(_) | Dtype::VarString)
    }

    pub fn is_numeric(&self) -> bool {
        !self.is_string()
    }

    /// Parse the textual form produced by `Display` (`int`, `string(8)`, `string`)
    pub fn parse(text: &str) -> Option<Dtype> {
        let text = text.trim();
        match text {
            "char" => Some(Dtype::Char),
            "short" => Some(Dtype::Short),
            "int" => Some(Dtype::Int),
            "float" => Some(Dtype::Float),
            "double" => Some(Dtype::Double),
            "string" => Some(Dtype::VarString),
            _ => {
                let width = text.strip_prefix("string(")?.strip_suffix(')')?;
                width.parse().ok().filter(|w| *w > 0).map(Dtype::FixedString)
            }
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dtype::Char => write!(f, "char"),
            Dtype::Short => write!(f, "short"),
            Dtype::Int => write!(f, "int"),
            Dtype::Float => write!(f, "float"),
            Dtype::Double => write!(f, "double"),
            Dtype::FixedString(n) => write!(f, "string({})", n),
            Dtype::VarString => write!(f, "string"),
        }
    }
}

/// A single element of any supported type
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Char(i8),
    Short(i16),
    Int(i32),
    Float(f32),
    Double(f64),
    Str(String),
}

impl Value {
    /// The zero value stored in unwritten slots of `dtype`
    pub fn zero(dtype: Dtype) -> Value {
        match dtype {
            Dtype::Char => Value::Char(0),
            Dtype::Short => Value::Short(0),
            Dtype::Int => Value::Int(0),
            Dtype::Float => Value::Float(0.0),
            Dtype::Double => Value::Double(0.0),
            Dtype::FixedString(_) | Dtype::VarString => Value::Str(String::new()),
        }
    }

    /// Name of the value's type, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Char(_) => "char",
            Value::Short(_) => "short",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Str(_) => "string",
        }
    }

    /// Whether this value can be stored as-is in a slot of `dtype`
    pub fn matches(&self, dtype: Dtype) -> bool {
        matches!(
            (self, dtype),
            (Value::Char(_), Dtype::Char)
                | (Value::Short(_), Dtype::Short)
                | (Value::Int(_), Dtype::Int)
                | (Value::Float(_), Dtype::Float)
                | (Value::Double(_), Dtype::Double)
                | (Value::Str(_), Dtype::FixedString(_) | Dtype::VarString)
        )
    }

    /// Convert between numeric types with `as` semantics.
    ///
    /// Strings only convert to string types and numbers only to numeric
    /// types; anything else yields `None`.
    pub fn coerce(self, dtype: Dtype) -> Option<Value> {
        if self.matches(dtype) {
            return Some(self);
        }
        let number = match self {
            Value::Char(v) => v as f64,
            Value::Short(v) => v as f64,
            Value::Int(v) => v as f64,
            Value::Float(v) => v as f64,
            Value::Double(v) => v,
            Value::Str(_) => return None,
        };
        match dtype {
            Dtype::Char => Some(Value::Char(number as i8)),
            Dtype::Short => Some(Value::Short(number as i16)),
            Dtype::Int => Some(Value::Int(number as i32)),
            Dtype::Float => Some(Value::Float(number as f32)),
            Dtype::Double => Some(Value::Double(number)),
            Dtype::FixedString(_) | Dtype::VarString => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Char(v) => write!(f, "{}", v),
            Value::Short(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Str(v) => f.write_str(v),
        }
    }
}

macro_rules! value_from {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v)
            }
        }
    };
}

value_from!(i8, Char);
value_from!(i16, Short);
value_from!(i32, Int);
value_from!(f32, Float);
value_from!(f64, Double);
value_from!(String, Str);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_display_parse() {
        for dtype in [
            Dtype::Char,
            Dtype::Short,
            Dtype::Int,
            Dtype::Float,
            Dtype::Double,
            Dtype::FixedString(16),
            Dtype::VarString,
        ] {
            assert_eq!(Dtype::parse(&dtype.to_string()), Some(dtype));
        }
        assert_eq!(Dtype::parse("string(0)"), None);
        assert_eq!(Dtype::parse("long"), None);
    }

    #[test]
    fn test_widths() {
        assert_eq!(Dtype::Short.width(), 2);
        assert_eq!(Dtype::Double.width(), 8);
        assert_eq!(Dtype::FixedString(10).width(), 10);
        assert_eq!(Dtype::VarString.width(), VAR_STRING_SLOT);
    }

    #[test]
    fn test_coerce() {
        assert_eq!(Value::Int(7).coerce(Dtype::Double), Some(Value::Double(7.0)));
        assert_eq!(Value::Double(2.9).coerce(Dtype::Int), Some(Value::Int(2)));
        assert_eq!(Value::from("x").coerce(Dtype::FixedString(4)), Some(Value::from("x")));
        assert_eq!(Value::from("x").coerce(Dtype::Int), None);
        assert_eq!(Value::Int(1).coerce(Dtype::VarString), None);
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Float(1.5).to_string(), "1.5");
        assert_eq!(Value::Char(-3).to_string(), "-3");
        assert_eq!(Value::from("abc").to_string(), "abc");
    }
}
