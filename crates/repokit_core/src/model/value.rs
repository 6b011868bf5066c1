//! Column value comparison shared by in-memory filtering and sorting.
//!
//! # Invariants
//! - Ordering follows SQLite type precedence: NULL < numeric < text < blob.
//! - Integer and real values compare numerically with each other.
//! - Filter literals take the storage class of the column value they are
//!   compared with, the way SQLite applies column affinity to bound
//!   parameters. The entity accessor's `Value` kind stands in for the
//!   declared column type.

use rusqlite::types::Value;
use std::borrow::Cow;
use std::cmp::Ordering;

/// Total order over column values, matching how SQLite sorts mixed columns.
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
        (Value::Real(a), Value::Real(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        (Value::Integer(a), Value::Real(b)) => (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal),
        (Value::Real(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal),
        (Value::Text(a), Value::Text(b)) => a.cmp(b),
        (Value::Blob(a), Value::Blob(b)) => a.cmp(b),
        _ => type_rank(left).cmp(&type_rank(right)),
    }
}

/// Null-safe equality, the in-memory counterpart of SQL `IS`.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    compare_values(left, right) == Ordering::Equal
}

/// Converts `literal` to the storage class of `column` where SQLite would.
///
/// Numeric columns turn well-formed numeric text into a number; text columns
/// render numbers as text. Anything else is compared unchanged.
pub fn apply_affinity<'v>(column: &Value, literal: &'v Value) -> Cow<'v, Value> {
    match (column, literal) {
        (Value::Integer(_) | Value::Real(_), Value::Text(text)) => {
            let trimmed = text.trim();
            if let Ok(integer) = trimmed.parse::<i64>() {
                Cow::Owned(Value::Integer(integer))
            } else if let Some(real) = trimmed.parse::<f64>().ok().filter(|real| real.is_finite()) {
                Cow::Owned(Value::Real(real))
            } else {
                Cow::Borrowed(literal)
            }
        }
        (Value::Text(_), Value::Integer(integer)) => Cow::Owned(Value::Text(integer.to_string())),
        (Value::Text(_), Value::Real(real)) => Cow::Owned(Value::Text(real_to_text(*real))),
        _ => Cow::Borrowed(literal),
    }
}

// SQLite renders integral reals with a trailing `.0`
fn real_to_text(real: f64) -> String {
    if real.is_finite() && real.fract() == 0.0 && real.abs() < 1e15 {
        format!("{real:.1}")
    } else {
        real.to_string()
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Integer(_) | Value::Real(_) => 1,
        Value::Text(_) => 2,
        Value::Blob(_) => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::{apply_affinity, compare_values, values_equal};
    use rusqlite::types::Value;
    use std::cmp::Ordering;

    #[test]
    fn numeric_values_compare_across_storage_classes() {
        assert_eq!(
            compare_values(&Value::Integer(2), &Value::Real(2.5)),
            Ordering::Less
        );
        assert!(values_equal(&Value::Integer(3), &Value::Real(3.0)));
    }

    #[test]
    fn null_sorts_first_and_text_after_numbers() {
        assert_eq!(
            compare_values(&Value::Null, &Value::Integer(-10)),
            Ordering::Less
        );
        assert_eq!(
            compare_values(&Value::Text("1".to_string()), &Value::Integer(99)),
            Ordering::Greater
        );
        assert!(values_equal(&Value::Null, &Value::Null));
    }

    #[test]
    fn literals_take_the_storage_class_of_the_column() {
        let id = Value::Integer(1);
        assert_eq!(
            apply_affinity(&id, &Value::Text(" 1 ".to_string())).into_owned(),
            Value::Integer(1)
        );
        assert_eq!(
            apply_affinity(&id, &Value::Text("2.5".to_string())).into_owned(),
            Value::Real(2.5)
        );
        assert_eq!(
            apply_affinity(&id, &Value::Text("one".to_string())).into_owned(),
            Value::Text("one".to_string())
        );

        let name = Value::Text("Ada".to_string());
        assert_eq!(
            apply_affinity(&name, &Value::Integer(7)).into_owned(),
            Value::Text("7".to_string())
        );
        assert_eq!(
            apply_affinity(&name, &Value::Real(3.0)).into_owned(),
            Value::Text("3.0".to_string())
        );
        assert_eq!(
            apply_affinity(&Value::Null, &Value::Integer(7)).into_owned(),
            Value::Integer(7)
        );
    }
}
