//! Conversion between the declared socket type name and the runtime
//! [`Value`] representation. Hosts supply their own resolver to support
//! custom type names (e.g. a domain-specific `"vector3"`); the builtin
//! resolver covers the primitive names every standard operator relies on.

use crate::error::{FlowError, Result};
use crate::value::Value;

/// Supplied by the host; maps a socket's declared type name to a concrete
/// conversion behavior for literal defaults and values produced by
/// "any"-typed operators.
pub trait SocketTypeResolver: Send + Sync {
    /// Convert `value` to the type named `type_name`, or fail with
    /// [`FlowError::TypeMismatch`]-shaped information the caller attaches
    /// node/socket context to.
    fn convert(&self, type_name: &str, value: Value) -> Result<Value>;

    /// Produce the default value for a socket of the given type, honoring
    /// an explicit literal if present.
    fn default_for(&self, type_name: &str, literal: Option<&Value>) -> Result<Value> {
        match literal {
            Some(v) => self.convert(type_name, v.clone()),
            None => Ok(self.zero_value(type_name)),
        }
    }

    /// The type's zero/empty value when no literal default is declared.
    fn zero_value(&self, type_name: &str) -> Value;
}

/// The default resolver: permissive numeric coercion, `Display`-based
/// stringification, and opaque passthrough for unrecognized type names.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinSocketTypeResolver;

impl SocketTypeResolver for BuiltinSocketTypeResolver {
    fn convert(&self, type_name: &str, value: Value) -> Result<Value> {
        let mismatch = |got: &Value| FlowError::TypeMismatch {
            node: crate::descriptor::NodeId::new(""),
            socket: String::new(),
            expected: type_name.to_string(),
            got: got.type_name().to_string(),
        };

        match type_name {
            "any" | "exec" => Ok(value),
            "int" => match &value {
                Value::Int(_) => Ok(value),
                Value::Float(f) => Ok(Value::Int(*f as i64)),
                Value::Bool(b) => Ok(Value::Int(if *b { 1 } else { 0 })),
                Value::String(s) => s
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| mismatch(&value)),
                _ => Err(mismatch(&value)),
            },
            "float" => match &value {
                Value::Float(_) => Ok(value),
                Value::Int(i) => Ok(Value::Float(*i as f64)),
                Value::String(s) => {
                    s.parse::<f64>().map(Value::Float).map_err(|_| mismatch(&value))
                }
                _ => Err(mismatch(&value)),
            },
            "bool" => match &value {
                Value::Bool(_) => Ok(value),
                Value::Int(i) => Ok(Value::Bool(*i != 0)),
                _ => Err(mismatch(&value)),
            },
            "string" => match value {
                Value::String(_) => Ok(value),
                other => Ok(Value::String(other.to_string())),
            },
            "bytes" => match &value {
                Value::Bytes(_) => Ok(value),
                _ => Err(mismatch(&value)),
            },
            "list" => match &value {
                Value::List(_) => Ok(value),
                _ => Err(mismatch(&value)),
            },
            "dict" => match &value {
                Value::Map(_) => Ok(value),
                _ => Err(mismatch(&value)),
            },
            _ => Ok(value),
        }
    }

    fn zero_value(&self, type_name: &str) -> Value {
        match type_name {
            "int" => Value::Int(0),
            "float" => Value::Float(0.0),
            "bool" => Value::Bool(false),
            "string" => Value::String(String::new()),
            "bytes" => Value::Bytes(Vec::new()),
            "list" => Value::List(Vec::new()),
            "dict" => Value::Map(Default::default()),
            "exec" => Value::Null,
            _ => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_int_to_float() {
        let resolver = BuiltinSocketTypeResolver;
        assert_eq!(resolver.convert("float", Value::Int(3)).unwrap(), Value::Float(3.0));
    }

    #[test]
    fn coerces_any_scalar_to_string() {
        let resolver = BuiltinSocketTypeResolver;
        assert_eq!(
            resolver.convert("string", Value::Int(42)).unwrap(),
            Value::String("42".to_string())
        );
    }

    #[test]
    fn rejects_incompatible_list_conversion() {
        let resolver = BuiltinSocketTypeResolver;
        assert!(resolver.convert("list", Value::Int(1)).is_err());
    }

    #[test]
    fn unknown_type_name_passes_through() {
        let resolver = BuiltinSocketTypeResolver;
        let v = Value::Opaque { type_id: "vector3".into(), data: vec![1, 2, 3] };
        assert_eq!(resolver.convert("vector3", v.clone()).unwrap(), v);
    }
}
