//! A typed front-matter value that preserves the distinctions YAML 1.2 makes
//! and a plain `serde_json::Value` does not: integers vs. floats, `true`/
//! `false` only (never `yes`/`no`), and dates/datetimes as their own kind
//! rather than opaque strings.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A single front-matter value. Maps preserve key order as written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrontMatterValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    String(String),
    Array(Vec<FrontMatterValue>),
    Map(OrderedMap),
}

/// An insertion-ordered string-keyed map.
///
/// `BTreeMap` would re-sort keys alphabetically on every round-trip, which
/// would fail the "front-matter structure is preserved" invariant for any
/// note whose author didn't happen to write keys in alphabetical order, so
/// order is tracked explicitly alongside a lookup map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderedMap {
    entries: Vec<(String, FrontMatterValue)>,
}

impl OrderedMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, value: FrontMatterValue) {
        if let Some(existing) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            existing.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&FrontMatterValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, FrontMatterValue)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A plain `BTreeMap` view, for callers that don't care about order
    /// (e.g. merging partial frontmatter updates keyed by field name).
    pub fn as_btree(&self) -> BTreeMap<String, FrontMatterValue> {
        self.entries.iter().cloned().collect()
    }
}

impl FromIterator<(String, FrontMatterValue)> for OrderedMap {
    fn from_iter<I: IntoIterator<Item = (String, FrontMatterValue)>>(iter: I) -> Self {
        let mut map = OrderedMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl FrontMatterValue {
    /// Convert from a parsed `serde_yaml::Value`, detecting plain-scalar
    /// dates/datetimes the way a YAML 1.1-aware vault author would expect
    /// (`serde_yaml` itself keeps unquoted dates as strings).
    pub(crate) fn from_yaml(value: serde_yaml::Value) -> FrontMatterValue {
        match value {
            serde_yaml::Value::Null => FrontMatterValue::Null,
            serde_yaml::Value::Bool(b) => FrontMatterValue::Bool(b),
            serde_yaml::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FrontMatterValue::Int(i)
                } else if let Some(f) = n.as_f64() {
                    FrontMatterValue::Float(f)
                } else {
                    FrontMatterValue::Null
                }
            }
            serde_yaml::Value::String(s) => Self::scalar_from_string(s),
            serde_yaml::Value::Sequence(seq) => {
                FrontMatterValue::Array(seq.into_iter().map(Self::from_yaml).collect())
            }
            serde_yaml::Value::Mapping(map) => {
                let mut ordered = OrderedMap::new();
                for (k, v) in map {
                    if let serde_yaml::Value::String(key) = k {
                        ordered.insert(key, Self::from_yaml(v));
                    }
                }
                FrontMatterValue::Map(ordered)
            }
            serde_yaml::Value::Tagged(tagged) => Self::from_yaml(tagged.value),
        }
    }

    fn scalar_from_string(s: String) -> FrontMatterValue {
        if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
            return FrontMatterValue::DateTime(dt.with_timezone(&Utc));
        }
        if let Ok(date) = NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
            return FrontMatterValue::Date(date);
        }
        FrontMatterValue::String(s)
    }

    /// Convert to a `serde_yaml::Value` for serialization.
    pub(crate) fn to_yaml(&self) -> serde_yaml::Value {
        match self {
            FrontMatterValue::Null => serde_yaml::Value::Null,
            FrontMatterValue::Bool(b) => serde_yaml::Value::Bool(*b),
            FrontMatterValue::Int(i) => serde_yaml::Value::Number((*i).into()),
            FrontMatterValue::Float(f) => serde_yaml::Value::Number(
                serde_yaml::Number::from(*f),
            ),
            FrontMatterValue::Date(d) => serde_yaml::Value::String(d.format("%Y-%m-%d").to_string()),
            FrontMatterValue::DateTime(dt) => serde_yaml::Value::String(dt.to_rfc3339()),
            FrontMatterValue::String(s) => serde_yaml::Value::String(s.clone()),
            FrontMatterValue::Array(items) => {
                serde_yaml::Value::Sequence(items.iter().map(|v| v.to_yaml()).collect())
            }
            FrontMatterValue::Map(map) => {
                let mut mapping = serde_yaml::Mapping::new();
                for (k, v) in map.iter() {
                    mapping.insert(serde_yaml::Value::String(k.clone()), v.to_yaml());
                }
                serde_yaml::Value::Mapping(mapping)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_plain_date() {
        let v = FrontMatterValue::scalar_from_string("2026-07-30".to_string());
        assert!(matches!(v, FrontMatterValue::Date(_)));
    }

    #[test]
    fn detects_rfc3339_datetime() {
        let v = FrontMatterValue::scalar_from_string("2026-07-30T10:00:00Z".to_string());
        assert!(matches!(v, FrontMatterValue::DateTime(_)));
    }

    #[test]
    fn leaves_ordinary_strings_alone() {
        let v = FrontMatterValue::scalar_from_string("hello world".to_string());
        assert_eq!(v, FrontMatterValue::String("hello world".to_string()));
    }

    #[test]
    fn ordered_map_preserves_insertion_order() {
        let mut map = OrderedMap::new();
        map.insert("z".to_string(), FrontMatterValue::Int(1));
        map.insert("a".to_string(), FrontMatterValue::Int(2));
        let keys: Vec<_> = map.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec!["z".to_string(), "a".to_string()]);
    }
}
