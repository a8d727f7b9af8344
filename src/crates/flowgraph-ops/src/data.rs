//! Pure-data operators: arithmetic, string, list, dict, and JSON
//! conversions. None of these declare execution sockets — each one is a
//! one-shot, side-effect-free transform registered via
//! [`flowgraph_core::binding::InlineOperator`], the route the binder design
//! reserves for large families of trivial, otherwise-ceremonious operators.

use flowgraph_core::binding::InlineOperator;
use flowgraph_core::error::{FlowError, Result};
use flowgraph_core::value::Value;
use flowgraph_core::OperatorRegistry;

use crate::ids;

pub fn register(registry: &mut OperatorRegistry) {
    register_math(registry);
    register_string(registry);
    register_list(registry);
    register_dict(registry);
    register_json(registry);
}

fn type_mismatch(name: &str, socket: &str, expected: &str) -> FlowError {
    FlowError::TypeMismatch {
        node: flowgraph_core::descriptor::NodeId::new(name),
        socket: socket.to_string(),
        expected: expected.to_string(),
        got: "other".to_string(),
    }
}

fn register_math(registry: &mut OperatorRegistry) {
    registry.register_inline(
        ids::ADD,
        "Add",
        InlineOperator::new(|ctx, _c| {
            Box::pin(async move {
                let a = ctx.get_input_float("A")?;
                let b = ctx.get_input_float("B")?;
                ctx.set_output("Result", numeric_result(ctx.get_input_raw("A")?, ctx.get_input_raw("B")?, a + b));
                Ok(())
            })
        }),
    );
    registry.register_inline(
        ids::SUB,
        "Subtract",
        InlineOperator::new(|ctx, _c| {
            Box::pin(async move {
                let a = ctx.get_input_float("A")?;
                let b = ctx.get_input_float("B")?;
                ctx.set_output("Result", numeric_result(ctx.get_input_raw("A")?, ctx.get_input_raw("B")?, a - b));
                Ok(())
            })
        }),
    );
    registry.register_inline(
        ids::MUL,
        "Multiply",
        InlineOperator::new(|ctx, _c| {
            Box::pin(async move {
                let a = ctx.get_input_float("A")?;
                let b = ctx.get_input_float("B")?;
                ctx.set_output("Result", numeric_result(ctx.get_input_raw("A")?, ctx.get_input_raw("B")?, a * b));
                Ok(())
            })
        }),
    );
    registry.register_inline(
        ids::DIV,
        "Divide",
        InlineOperator::new(|ctx, _c| {
            Box::pin(async move {
                let a = ctx.get_input_float("A")?;
                let b = ctx.get_input_float("B")?;
                if b == 0.0 {
                    return Err(FlowError::operator_failure(ctx.node().id.clone(), DivideByZero));
                }
                ctx.set_output("Result", Value::Float(a / b));
                Ok(())
            })
        }),
    );
}

/// `Add`/`Subtract`/`Multiply` stay integral when both inputs are, and fall
/// back to float otherwise — matching how the node graph's numeric sockets
/// coerce (see `BuiltinSocketTypeResolver`).
fn numeric_result(a: Value, b: Value, float_result: f64) -> Value {
    match (a, b) {
        (Value::Int(_), Value::Int(_)) => Value::Int(float_result.round() as i64),
        _ => Value::Float(float_result),
    }
}

#[derive(Debug)]
struct DivideByZero;

impl std::fmt::Display for DivideByZero {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "division by zero")
    }
}

impl std::error::Error for DivideByZero {}

fn register_string(registry: &mut OperatorRegistry) {
    registry.register_inline(
        ids::CONCAT,
        "Concat",
        InlineOperator::new(|ctx, _c| {
            Box::pin(async move {
                let a = ctx.get_input_string("A")?;
                let b = ctx.get_input_string("B")?;
                ctx.set_output("Result", Value::String(format!("{a}{b}")));
                Ok(())
            })
        }),
    );
    registry.register_inline(
        ids::TO_UPPER,
        "To Upper",
        InlineOperator::new(|ctx, _c| {
            Box::pin(async move {
                let s = ctx.get_input_string("Value")?;
                ctx.set_output("Result", Value::String(s.to_uppercase()));
                Ok(())
            })
        }),
    );
    registry.register_inline(
        ids::TO_LOWER,
        "To Lower",
        InlineOperator::new(|ctx, _c| {
            Box::pin(async move {
                let s = ctx.get_input_string("Value")?;
                ctx.set_output("Result", Value::String(s.to_lowercase()));
                Ok(())
            })
        }),
    );
}

fn register_list(registry: &mut OperatorRegistry) {
    registry.register_inline(
        ids::LIST_LEN,
        "List Length",
        InlineOperator::new(|ctx, _c| {
            Box::pin(async move {
                let list = ctx.get_input_raw("List")?;
                let len = list.as_list().ok_or_else(|| type_mismatch("List Length", "List", "list"))?.len();
                ctx.set_output("Result", Value::Int(len as i64));
                Ok(())
            })
        }),
    );
    registry.register_inline(
        ids::LIST_GET,
        "List Get",
        InlineOperator::new(|ctx, _c| {
            Box::pin(async move {
                let list = ctx.get_input_raw("List")?;
                let items = list.as_list().ok_or_else(|| type_mismatch("List Get", "List", "list"))?;
                let index = ctx.get_input_int("Index")?;
                let value = usize::try_from(index).ok().and_then(|i| items.get(i)).cloned().unwrap_or(Value::Null);
                ctx.set_output("Result", value);
                Ok(())
            })
        }),
    );
}

fn register_dict(registry: &mut OperatorRegistry) {
    registry.register_inline(
        ids::DICT_GET,
        "Dict Get",
        InlineOperator::new(|ctx, _c| {
            Box::pin(async move {
                let dict = ctx.get_input_raw("Dict")?;
                let map = dict.as_map().ok_or_else(|| type_mismatch("Dict Get", "Dict", "dict"))?;
                let key = ctx.get_input_string("Key")?;
                ctx.set_output("Result", map.get(&key).cloned().unwrap_or(Value::Null));
                Ok(())
            })
        }),
    );
    registry.register_inline(
        ids::DICT_SET,
        "Dict Set",
        InlineOperator::new(|ctx, _c| {
            Box::pin(async move {
                let dict = ctx.get_input_raw("Dict")?;
                let mut map = dict.as_map().ok_or_else(|| type_mismatch("Dict Set", "Dict", "dict"))?.clone();
                let key = ctx.get_input_string("Key")?;
                let value = ctx.get_input_raw("Value")?;
                map.insert(key, value);
                ctx.set_output("Result", Value::Map(map));
                Ok(())
            })
        }),
    );
}

fn register_json(registry: &mut OperatorRegistry) {
    registry.register_inline(
        ids::JSON_PARSE,
        "JSON Parse",
        InlineOperator::new(|ctx, _c| {
            Box::pin(async move {
                let text = ctx.get_input_string("Text")?;
                let parsed: serde_json::Value = serde_json::from_str(&text)
                    .map_err(|e| FlowError::operator_failure(ctx.node().id.clone(), e))?;
                ctx.set_output("Result", Value::from_json(parsed));
                Ok(())
            })
        }),
    );
    registry.register_inline(
        ids::JSON_STRINGIFY,
        "JSON Stringify",
        InlineOperator::new(|ctx, _c| {
            Box::pin(async move {
                let value = ctx.get_input_raw("Value")?;
                let text = serde_json::to_string(&value.into_json())
                    .map_err(|e| FlowError::operator_failure(ctx.node().id.clone(), e))?;
                ctx.set_output("Result", Value::String(text));
                Ok(())
            })
        }),
    );
}
