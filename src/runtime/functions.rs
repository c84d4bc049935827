//! Plain functions available to every compiled template.

use std::rc::Rc;

use crate::{
    error::RenderResult,
    script::{Key, Value},
};

/// A function registered with [`crate::Engine::add_function`].
pub type Function = Rc<dyn Fn(&[Value]) -> RenderResult<Value>>;

pub const BUILTIN_NAMES: [&str; 14] = [
    "count",
    "in_array",
    "is_array",
    "is_string",
    "is_numeric",
    "strlen",
    "implode",
    "array_keys",
    "range",
    "min",
    "max",
    "strtoupper",
    "strtolower",
    "trim",
];

/// Runs a builtin, or returns `None` when `name` is not one.
pub fn call_builtin(name: &str, args: &[Value]) -> Option<Value> {
    let arg = |i: usize| args.get(i).cloned().unwrap_or_default();
    let value = match name {
        "count" => Value::from(arg(0).count()),
        "in_array" => {
            let needle = arg(0);
            let found = arg(1)
                .as_array()
                .is_some_and(|haystack| haystack.values().any(|v| v.loose_eq(&needle)));
            Value::Bool(found)
        }
        "is_array" => Value::Bool(matches!(arg(0), Value::Array(_))),
        "is_string" => Value::Bool(matches!(arg(0), Value::Str(_) | Value::Html(_))),
        "is_numeric" => Value::Bool(match arg(0) {
            Value::Int(_) | Value::Float(_) => true,
            Value::Str(s) | Value::Html(s) => s.trim().parse::<f64>().is_ok(),
            _ => false,
        }),
        "strlen" => Value::from(arg(0).to_string().len()),
        "implode" => {
            // Both argument orders are accepted.
            let (glue, pieces) = match (arg(0), arg(1)) {
                (Value::Array(pieces), glue) | (glue, Value::Array(pieces)) => {
                    (glue.to_string(), pieces)
                }
                (glue, _) => (glue.to_string(), indexmap::IndexMap::new()),
            };
            let parts: Vec<String> = pieces.values().map(ToString::to_string).collect();
            Value::from(parts.join(&glue))
        }
        "array_keys" => Value::list(
            arg(0)
                .as_array()
                .map(|a| a.keys().map(Key::to_value).collect::<Vec<_>>())
                .unwrap_or_default(),
        ),
        "range" => {
            let (start, end) = (arg(0).to_int(), arg(1).to_int());
            if start <= end {
                Value::list((start..=end).map(Value::Int))
            } else {
                Value::list((end..=start).rev().map(Value::Int))
            }
        }
        "min" | "max" => {
            let values: Vec<Value> = match args {
                [Value::Array(items)] => items.values().cloned().collect(),
                _ => args.to_vec(),
            };
            let pick = values.into_iter().reduce(|best, v| {
                let ordering = v.compare(&best).unwrap_or(std::cmp::Ordering::Equal);
                let better = if name == "min" {
                    ordering.is_lt()
                } else {
                    ordering.is_gt()
                };
                if better { v } else { best }
            });
            pick.unwrap_or(Value::Bool(false))
        }
        "strtoupper" => Value::from(arg(0).to_string().to_uppercase()),
        "strtolower" => Value::from(arg(0).to_string().to_lowercase()),
        "trim" => Value::from(arg(0).to_string().trim()),
        _ => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> Value {
        call_builtin(name, args).unwrap()
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_builtins() {
        assert_eq!(call("count", &[Value::list([1, 2, 3])]), Value::Int(3));
        assert_eq!(call("count", &[Value::Null]), Value::Int(0));
        assert_eq!(
            call("in_array", &[Value::from("2"), Value::list([1, 2])]),
            Value::Bool(true)
        );
        assert_eq!(
            call("implode", &[Value::from(", "), Value::list(["a", "b"])]),
            Value::from("a, b")
        );
        assert_eq!(call("range", &[Value::Int(3), Value::Int(1)]), Value::list([3, 2, 1]));
        assert_eq!(call("max", &[Value::Int(3), Value::Int(7), Value::Int(1)]), Value::Int(7));
        assert_eq!(call("min", &[Value::list([4, 2, 9])]), Value::Int(2));
        assert!(call_builtin("nope", &[]).is_none());
    }
}
