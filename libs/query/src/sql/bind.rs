use super::BindValue;
use crate::value::Value;

pub(super) fn push_text(bind_params: &mut Vec<BindValue>, value: String) -> usize {
    bind_params.push(BindValue::Text(value));
    bind_params.len()
}

pub(super) fn push_value(bind_params: &mut Vec<BindValue>, value: &Value) -> usize {
    bind_params.push(match value {
        Value::Null => BindValue::Null,
        Value::Bool(b) => BindValue::Bool(*b),
        Value::Int(i) => BindValue::Int(*i),
        Value::Float(f) => BindValue::Float(*f),
        Value::Text(s) => BindValue::Text(s.clone()),
        Value::Date(d) => BindValue::Date(*d),
        Value::DateTime(dt) => BindValue::DateTime(*dt),
        Value::Timestamp(ts) => BindValue::Timestamp(*ts),
        Value::Uuid(u) => BindValue::Uuid(*u),
    });
    bind_params.len()
}

/// Push a homogeneous array parameter. The element type follows the first
/// non-null value; integers are widened when mixed with floats.
pub(super) fn push_array(bind_params: &mut Vec<BindValue>, values: &[Value]) -> usize {
    fn collect<T>(values: &[Value], f: impl Fn(&Value) -> Option<T>) -> Vec<T> {
        values.iter().filter_map(f).collect()
    }

    let has_float = values.iter().any(|v| matches!(v, Value::Float(_)));
    let first = values.iter().find(|v| !v.is_null());
    let array = match first {
        Some(Value::Bool(_)) => BindValue::BoolArray(collect(values, |v| match v {
            Value::Bool(b) => Some(*b),
            _ => None,
        })),
        Some(Value::Int(_) | Value::Float(_)) if has_float => {
            BindValue::FloatArray(collect(values, |v| match v {
                Value::Int(i) => Some(*i as f64),
                Value::Float(f) => Some(*f),
                _ => None,
            }))
        }
        Some(Value::Int(_)) => BindValue::IntArray(collect(values, |v| match v {
            Value::Int(i) => Some(*i),
            _ => None,
        })),
        Some(Value::Date(_)) => BindValue::DateArray(collect(values, |v| match v {
            Value::Date(d) => Some(*d),
            _ => None,
        })),
        Some(Value::DateTime(_)) => BindValue::DateTimeArray(collect(values, |v| match v {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        })),
        Some(Value::Timestamp(_)) => BindValue::TimestampArray(collect(values, |v| match v {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        })),
        Some(Value::Uuid(_)) => BindValue::UuidArray(collect(values, |v| match v {
            Value::Uuid(u) => Some(*u),
            _ => None,
        })),
        _ => BindValue::TextArray(collect(values, |v| {
            (!v.is_null()).then(|| v.to_string())
        })),
    };
    bind_params.push(array);
    bind_params.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_one_based() {
        let mut binds = Vec::new();
        assert_eq!(push_text(&mut binds, "a".into()), 1);
        assert_eq!(push_value(&mut binds, &Value::Int(3)), 2);
        assert_eq!(binds[1], BindValue::Int(3));
    }

    #[test]
    fn arrays_widen_mixed_numbers() {
        let mut binds = Vec::new();
        push_array(&mut binds, &[Value::Int(1), Value::Float(2.5)]);
        push_array(&mut binds, &[Value::Int(1), Value::Int(2)]);
        assert_eq!(binds[0], BindValue::FloatArray(vec![1.0, 2.5]));
        assert_eq!(binds[1], BindValue::IntArray(vec![1, 2]));
    }
}
