//! Value ordering and attribute access.

use serde_json::Value;
use std::cmp::Ordering;

/// Rank of a value's type: null < bool < number < string < array < object.
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values used by SORT and FILTER comparisons.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            let mut xk: Vec<&String> = x.keys().collect();
            let mut yk: Vec<&String> = y.keys().collect();
            xk.sort();
            yk.sort();
            for (l, r) in xk.iter().zip(&yk) {
                let ord = l.cmp(r).then_with(|| compare_values(&x[*l], &y[*r]));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            xk.len().cmp(&yk.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Follow an attribute path; missing attributes read as null.
pub fn lookup_path<'a>(value: &'a Value, path: &[String]) -> &'a Value {
    static NULL: Value = Value::Null;
    path.iter()
        .try_fold(value, |current, key| current.get(key))
        .unwrap_or(&NULL)
}
