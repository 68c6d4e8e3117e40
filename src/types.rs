//! Field type tokens and value coercion

use std::fmt;
use std::str::FromStr;

use crate::error::CompileError;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Int,
    Float,
    String,
    Html,
    Struct,
}

/// Parsed type token such as `int`, `[]float64` or `array`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeSpec {
    pub kind: Kind,
    pub is_array: bool,
}

impl TypeSpec {
    pub fn parse(token: &str) -> Result<Self, CompileError> {
        let trimmed = token.trim();
        let (base, is_array) = match trimmed.strip_prefix("[]") {
            Some(rest) => (rest.trim(), true),
            None => (trimmed, false),
        };
        let kind = match base.to_ascii_lowercase().as_str() {
            "int" => Kind::Int,
            "float64" | "float" => Kind::Float,
            "string" => Kind::String,
            "html" => Kind::Html,
            "struct" => Kind::Struct,
            "array" => {
                return Ok(Self {
                    kind: Kind::String,
                    is_array: true,
                })
            }
            _ => return Err(CompileError::UnknownType(token.to_string())),
        };
        Ok(Self { kind, is_array })
    }

    pub fn is_struct(&self) -> bool {
        self.kind == Kind::Struct
    }

    /// Convert raw extracted bytes. Failure yields `None`, never an error.
    pub fn coerce(&self, raw: &[u8]) -> Option<Value> {
        match self.kind {
            Kind::Int => std::str::from_utf8(raw).ok()?.parse::<i64>().ok().map(Value::Int),
            Kind::Float => std::str::from_utf8(raw)
                .ok()?
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(Value::Float),
            Kind::String | Kind::Html => String::from_utf8(raw.to_vec()).ok().map(Value::String),
            Kind::Struct => None,
        }
    }
}

impl FromStr for TypeSpec {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.kind {
            Kind::Int => "int",
            Kind::Float => "float64",
            Kind::String => "string",
            Kind::Html => "html",
            Kind::Struct => "struct",
        };
        if self.is_array {
            write!(f, "[]{name}")
        } else {
            f.write_str(name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tokens() {
        assert_eq!(
            "int".parse::<TypeSpec>().unwrap(),
            TypeSpec { kind: Kind::Int, is_array: false }
        );
        assert_eq!(
            "[]float64".parse::<TypeSpec>().unwrap(),
            TypeSpec { kind: Kind::Float, is_array: true }
        );
        assert_eq!(
            " array ".parse::<TypeSpec>().unwrap(),
            TypeSpec { kind: Kind::String, is_array: true }
        );
        assert_eq!(TypeSpec::parse("[]struct").unwrap().to_string(), "[]struct");
        assert!(matches!(
            TypeSpec::parse("bool"),
            Err(CompileError::UnknownType(t)) if t == "bool"
        ));
    }

    #[test]
    fn test_coerce() {
        let int = TypeSpec::parse("int").unwrap();
        assert_eq!(int.coerce(b"42"), Some(Value::Int(42)));
        assert_eq!(int.coerce(b"-7"), Some(Value::Int(-7)));
        assert_eq!(int.coerce(b" 42"), None);
        assert_eq!(int.coerce(b"4.2"), None);
        assert_eq!(int.coerce(b""), None);

        let float = TypeSpec::parse("float64").unwrap();
        assert_eq!(float.coerce(b"1.5"), Some(Value::Float(1.5)));
        assert_eq!(float.coerce(b"NaN"), None);
        assert_eq!(float.coerce(b"abc"), None);

        let string = TypeSpec::parse("string").unwrap();
        assert_eq!(string.coerce(b"caf\xc3\xa9"), Some(Value::from("café")));
        assert_eq!(string.coerce(b"\xff\xfe"), None);
        assert_eq!(string.coerce(b""), Some(Value::from("")));

        assert_eq!(TypeSpec::parse("struct").unwrap().coerce(b"x"), None);
    }
}
