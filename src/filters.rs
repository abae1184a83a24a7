//! The filter tree accepted by [`crate::datastore::Datastore::filter`].
//!
//! The reference codebase's filter adapter only ever exercises equality in
//! its sample, leaving `And`/`Or`/`Not` declared but untested. Since the
//! wire format already names the higher-order operators (see
//! `SPEC_FULL.md` §4.C), this implementation resolves that open question by
//! supporting the full boolean tree rather than leaving a silent trap for
//! callers who construct one.

use crate::value::FieldValue;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Clone, Debug)]
pub enum Filter {
    Eq { field: String, value: FilterValue },
    Ne { field: String, value: FilterValue },
    Lt { field: String, value: FilterValue },
    Gt { field: String, value: FilterValue },
    Le { field: String, value: FilterValue },
    Ge { field: String, value: FilterValue },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

// `Filter` is recursive (`And`/`Or`/`Not` hold further `Filter`s), and
// deriving `Serialize`/`Deserialize` for a `#[serde(tag = "op")]` enum over a
// recursive type makes serde's internal tagging machinery generate an
// infinitely-nested `TaggedSerializer<TaggedSerializer<...>>` type, which
// overflows the compiler's recursion limit. Going through `serde_json::Value`
// by hand keeps the exact same wire shape (`{"op": "eq", "field":..., "value":...}`,
// snake_case operator names) without asking serde to monomorphize through the
// recursion itself.
impl Serialize for Filter {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        filter_to_value(self).serialize(serializer)
    }
}

fn filter_to_value(filter: &Filter) -> serde_json::Value {
    use serde_json::json;
    match filter {
        Filter::Eq { field, value } => json!({"op": "eq", "field": field, "value": value}),
        Filter::Ne { field, value } => json!({"op": "ne", "field": field, "value": value}),
        Filter::Lt { field, value } => json!({"op": "lt", "field": field, "value": value}),
        Filter::Gt { field, value } => json!({"op": "gt", "field": field, "value": value}),
        Filter::Le { field, value } => json!({"op": "le", "field": field, "value": value}),
        Filter::Ge { field, value } => json!({"op": "ge", "field": field, "value": value}),
        Filter::And(filters) => {
            json!({"op": "and", "0": filters.iter().map(filter_to_value).collect::<Vec<_>>()})
        }
        Filter::Or(filters) => {
            json!({"op": "or", "0": filters.iter().map(filter_to_value).collect::<Vec<_>>()})
        }
        Filter::Not(inner) => json!({"op": "not", "0": filter_to_value(inner)}),
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D>(deserializer: D) -> Result<Filter, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        filter_from_value(&value).map_err(D::Error::custom)
    }
}

fn filter_from_value(value: &serde_json::Value) -> Result<Filter, String> {
    let op = value
        .get("op")
        .and_then(|v| v.as_str())
        .ok_or_else(|| "filter is missing an \"op\" field".to_string())?;
    let field = |key: &str| -> Result<String, String> {
        value
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| format!("filter op {op:?} is missing field {key:?}"))
    };
    let filter_value = || -> Result<FilterValue, String> {
        let raw = value.get("value").ok_or_else(|| format!("filter op {op:?} is missing \"value\""))?;
        serde_json::from_value(raw.clone()).map_err(|e| e.to_string())
    };
    let nested = || -> Result<Filter, String> {
        let raw = value.get("0").ok_or_else(|| format!("filter op {op:?} is missing \"0\""))?;
        filter_from_value(raw)
    };
    let nested_list = || -> Result<Vec<Filter>, String> {
        let raw = value.get("0").ok_or_else(|| format!("filter op {op:?} is missing \"0\""))?;
        raw.as_array()
            .ok_or_else(|| format!("filter op {op:?} expected a list at \"0\""))?
            .iter()
            .map(filter_from_value)
            .collect()
    };
    match op {
        "eq" => Ok(Filter::Eq { field: field("field")?, value: filter_value()? }),
        "ne" => Ok(Filter::Ne { field: field("field")?, value: filter_value()? }),
        "lt" => Ok(Filter::Lt { field: field("field")?, value: filter_value()? }),
        "gt" => Ok(Filter::Gt { field: field("field")?, value: filter_value()? }),
        "le" => Ok(Filter::Le { field: field("field")?, value: filter_value()? }),
        "ge" => Ok(Filter::Ge { field: field("field")?, value: filter_value()? }),
        "and" => Ok(Filter::And(nested_list()?)),
        "or" => Ok(Filter::Or(nested_list()?)),
        "not" => Ok(Filter::Not(Box::new(nested()?))),
        other => Err(format!("unknown filter op {other:?}")),
    }
}

/// A comparable scalar used on the right-hand side of a [`Filter`]
/// comparison. Kept separate from [`FieldValue`] because filters never
/// compare against ids-as-relations, only against plain scalars.
#[derive(Clone, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Int(i64),
    Str(String),
    Bool(bool),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Filter {
        Filter::Eq { field: field.into(), value: value.into() }
    }

    /// Evaluates this filter against one field-value mapping. Missing
    /// fields never match a comparison operator (mirrors SQL `NULL`
    /// semantics: absence is not equal to, nor less than, anything).
    pub fn matches(&self, fields: &std::collections::BTreeMap<String, FieldValue>) -> bool {
        match self {
            Filter::Eq { field, value } => compare(fields, field, value) == Some(std::cmp::Ordering::Equal),
            Filter::Ne { field, value } => {
                matches!(compare(fields, field, value), Some(o) if o != std::cmp::Ordering::Equal)
            }
            Filter::Lt { field, value } => compare(fields, field, value) == Some(std::cmp::Ordering::Less),
            Filter::Gt { field, value } => compare(fields, field, value) == Some(std::cmp::Ordering::Greater),
            Filter::Le { field, value } => {
                matches!(compare(fields, field, value), Some(o) if o != std::cmp::Ordering::Greater)
            }
            Filter::Ge { field, value } => {
                matches!(compare(fields, field, value), Some(o) if o != std::cmp::Ordering::Less)
            }
            Filter::And(filters) => filters.iter().all(|f| f.matches(fields)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(fields)),
            Filter::Not(inner) => !inner.matches(fields),
        }
    }
}

fn compare(
    fields: &std::collections::BTreeMap<String, FieldValue>,
    field: &str,
    value: &FilterValue,
) -> Option<std::cmp::Ordering> {
    let actual = fields.get(field)?;
    match (actual, value) {
        (FieldValue::Id(id), FilterValue::Int(v)) => (*id as i64).partial_cmp(v),
        (FieldValue::Scalar(json), FilterValue::Int(v)) => {
            json.as_i64().and_then(|n| n.partial_cmp(v))
        }
        (FieldValue::Scalar(json), FilterValue::Str(v)) => {
            json.as_str().map(|s| s.cmp(v.as_str()).then(std::cmp::Ordering::Equal))
        }
        (FieldValue::Scalar(json), FilterValue::Bool(v)) => {
            json.as_bool().and_then(|b| b.partial_cmp(v))
        }
        _ => None,
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> FilterValue {
        FilterValue::Int(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> FilterValue {
        FilterValue::Str(v.to_string())
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> FilterValue {
        FilterValue::Bool(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, i64)]) -> std::collections::BTreeMap<String, FieldValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), FieldValue::Id(*v as u64)))
            .collect()
    }

    #[test]
    fn eq_matches_equal_field() {
        let f = Filter::eq("meeting_id", 1i64);
        assert!(f.matches(&fields(&[("meeting_id", 1)])));
        assert!(!f.matches(&fields(&[("meeting_id", 2)])));
    }

    #[test]
    fn and_or_not_compose() {
        let data = fields(&[("meeting_id", 1), ("weight", 10)]);
        let f = Filter::And(vec![Filter::eq("meeting_id", 1i64), Filter::eq("weight", 10i64)]);
        assert!(f.matches(&data));
        let f = Filter::Not(Box::new(Filter::eq("meeting_id", 2i64)));
        assert!(f.matches(&data));
        let f = Filter::Or(vec![Filter::eq("meeting_id", 2i64), Filter::eq("weight", 10i64)]);
        assert!(f.matches(&data));
    }
}
