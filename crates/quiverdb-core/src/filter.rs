//! Metadata filtering for vector search.
//!
//! Filters are trees of field-operator-value conditions combined with
//! `and`/`or`, evaluated against a record's JSON metadata. Missing fields
//! compare as not-present: every positive comparison fails, `neq` holds,
//! and `exists` is false.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use quiverdb_core::filter::{Filter, Condition};
//!
//! let filter = Filter::new(Condition::and(vec![
//!     Condition::eq("category", "tech"),
//!     Condition::gt("price", 100),
//! ]));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A filter for metadata-based search refinement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    /// The root condition of the filter.
    pub condition: Condition,
}

impl Filter {
    /// Creates a new filter with the given condition.
    #[must_use]
    pub fn new(condition: Condition) -> Self {
        Self { condition }
    }

    /// Evaluates the filter against metadata.
    ///
    /// `None` metadata matches only filters that hold on an empty document.
    #[must_use]
    pub fn matches(&self, metadata: Option<&Value>) -> bool {
        match metadata {
            Some(value) => self.condition.matches(value),
            None => self.condition.matches(&Value::Null),
        }
    }
}

/// A condition for filtering metadata.
///
/// Field names support dot notation for nested lookup (`"author.name"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// field == value
    Eq {
        /// Field name.
        field: String,
        /// Value to compare against.
        value: Value,
    },
    /// field != value (holds when the field is missing)
    Neq {
        /// Field name.
        field: String,
        /// Value to compare against.
        value: Value,
    },
    /// field > value
    Gt {
        /// Field name.
        field: String,
        /// Value to compare against.
        value: Value,
    },
    /// field >= value
    Gte {
        /// Field name.
        field: String,
        /// Value to compare against.
        value: Value,
    },
    /// field < value
    Lt {
        /// Field name.
        field: String,
        /// Value to compare against.
        value: Value,
    },
    /// field <= value
    Lte {
        /// Field name.
        field: String,
        /// Value to compare against.
        value: Value,
    },
    /// field value is one of the listed values
    In {
        /// Field name.
        field: String,
        /// Accepted values.
        values: Vec<Value>,
    },
    /// String field contains a substring, or array field contains the value
    Contains {
        /// Field name.
        field: String,
        /// Substring or element to search for.
        value: Value,
    },
    /// Field is present and non-null
    Exists {
        /// Field name.
        field: String,
    },
    /// All conditions hold
    And {
        /// Conditions to AND together.
        conditions: Vec<Condition>,
    },
    /// At least one condition holds
    Or {
        /// Conditions to OR together.
        conditions: Vec<Condition>,
    },
}

impl Condition {
    /// Evaluates the condition against a metadata document.
    #[must_use]
    pub fn matches(&self, metadata: &Value) -> bool {
        match self {
            Self::Eq { field, value } => {
                get_field(metadata, field).is_some_and(|v| values_equal(v, value))
            }
            Self::Neq { field, value } => {
                !get_field(metadata, field).is_some_and(|v| values_equal(v, value))
            }
            Self::Gt { field, value } => get_field(metadata, field)
                .and_then(|v| compare_values(v, value))
                .is_some_and(std::cmp::Ordering::is_gt),
            Self::Gte { field, value } => get_field(metadata, field)
                .and_then(|v| compare_values(v, value))
                .is_some_and(std::cmp::Ordering::is_ge),
            Self::Lt { field, value } => get_field(metadata, field)
                .and_then(|v| compare_values(v, value))
                .is_some_and(std::cmp::Ordering::is_lt),
            Self::Lte { field, value } => get_field(metadata, field)
                .and_then(|v| compare_values(v, value))
                .is_some_and(std::cmp::Ordering::is_le),
            Self::In { field, values } => get_field(metadata, field)
                .is_some_and(|v| values.iter().any(|candidate| values_equal(v, candidate))),
            Self::Contains { field, value } => {
                get_field(metadata, field).is_some_and(|v| contains_value(v, value))
            }
            Self::Exists { field } => {
                get_field(metadata, field).is_some_and(|v| !v.is_null())
            }
            Self::And { conditions } => conditions.iter().all(|c| c.matches(metadata)),
            Self::Or { conditions } => conditions.iter().any(|c| c.matches(metadata)),
        }
    }

    // ------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------

    /// field == value
    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// field != value
    #[must_use]
    pub fn neq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Neq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// field > value
    #[must_use]
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gt {
            field: field.into(),
            value: value.into(),
        }
    }

    /// field >= value
    #[must_use]
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gte {
            field: field.into(),
            value: value.into(),
        }
    }

    /// field < value
    #[must_use]
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lt {
            field: field.into(),
            value: value.into(),
        }
    }

    /// field <= value
    #[must_use]
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lte {
            field: field.into(),
            value: value.into(),
        }
    }

    /// field value is one of `values`
    #[must_use]
    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::In {
            field: field.into(),
            values,
        }
    }

    /// String field contains a substring, or array field contains a value
    #[must_use]
    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Contains {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Field is present and non-null
    #[must_use]
    pub fn exists(field: impl Into<String>) -> Self {
        Self::Exists {
            field: field.into(),
        }
    }

    /// All conditions hold
    #[must_use]
    pub fn and(conditions: Vec<Condition>) -> Self {
        Self::And { conditions }
    }

    /// At least one condition holds
    #[must_use]
    pub fn or(conditions: Vec<Condition>) -> Self {
        Self::Or { conditions }
    }
}

/// Gets a field from a JSON document, supporting dot notation.
fn get_field<'a>(metadata: &'a Value, field: &str) -> Option<&'a Value> {
    let mut current = metadata;
    for part in field.split('.') {
        current = current.get(part)?;
    }
    Some(current)
}

/// Compares two JSON values for equality; numbers compare by value.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(fx), Some(fy)) => (fx - fy).abs() < f64::EPSILON,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// Orders two JSON values when they are comparable (numbers or strings).
fn compare_values(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            x.as_f64().and_then(|fx| y.as_f64().map(|fy| (fx, fy)))
                .and_then(|(fx, fy)| fx.partial_cmp(&fy))
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Containment: substring for strings, element membership for arrays.
fn contains_value(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => needle.as_str().is_some_and(|sub| s.contains(sub)),
        Value::Array(items) => items.iter().any(|item| values_equal(item, needle)),
        _ => false,
    }
}
