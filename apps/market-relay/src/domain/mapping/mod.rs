//! Field Normalization
//!
//! Exchanges send compact single-letter field codes (`p`, `q`, `E`, ...).
//! A [`FieldMapping`] renames those codes to canonical names, recursing into
//! nested objects through [`MappingEntry::Group`] entries.
//!
//! # Rules
//!
//! For each key of an object record:
//! - `Leaf(name)`: the value is copied unchanged to `name`
//! - `Group { parent, mapping }`: the value is normalized against `mapping`
//!   and written to `parent`
//! - no entry: the key is dropped
//!
//! Normalization is total. A group over an array normalizes every element, a
//! group over any other non-object value yields an empty object, and a
//! non-object record yields an empty payload.

use std::collections::HashMap;

use serde_json::{Map, Value};

/// Mapping entry for one raw field code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingEntry {
    /// Rename to a canonical field.
    Leaf(String),
    /// Normalize the nested value and store it under `parent`.
    Group {
        /// Canonical name of the nested object.
        parent: String,
        /// Mapping applied to the nested value.
        mapping: FieldMapping,
    },
}

/// Immutable table from raw field codes to mapping entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMapping {
    entries: HashMap<String, MappingEntry>,
}

impl FieldMapping {
    /// Start building a mapping.
    #[must_use]
    pub fn builder() -> FieldMappingBuilder {
        FieldMappingBuilder::default()
    }

    /// Entry for a raw field code.
    #[must_use]
    pub fn get(&self, code: &str) -> Option<&MappingEntry> {
        self.entries.get(code)
    }

    /// Number of top-level entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the mapping has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Normalize a record, consuming it.
    #[must_use]
    pub fn apply(&self, record: Value) -> Map<String, Value> {
        match record {
            Value::Object(object) => self.apply_object(object),
            _ => Map::new(),
        }
    }

    fn apply_object(&self, object: Map<String, Value>) -> Map<String, Value> {
        let mut out = Map::with_capacity(object.len().min(self.entries.len()));

        for (code, value) in object {
            match self.entries.get(&code) {
                Some(MappingEntry::Leaf(name)) => {
                    out.insert(name.clone(), value);
                }
                Some(MappingEntry::Group { parent, mapping }) => {
                    out.insert(parent.clone(), mapping.apply_nested(value));
                }
                None => {}
            }
        }

        out
    }

    fn apply_nested(&self, value: Value) -> Value {
        match value {
            Value::Object(object) => Value::Object(self.apply_object(object)),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|item| self.apply_nested(item)).collect())
            }
            _ => Value::Object(Map::new()),
        }
    }
}

/// Builder for [`FieldMapping`].
#[derive(Debug, Default)]
pub struct FieldMappingBuilder {
    entries: HashMap<String, MappingEntry>,
}

impl FieldMappingBuilder {
    /// Rename `code` to `name`.
    #[must_use]
    pub fn leaf(mut self, code: &str, name: &str) -> Self {
        self.entries
            .insert(code.to_string(), MappingEntry::Leaf(name.to_string()));
        self
    }

    /// Rename several codes at once.
    #[must_use]
    pub fn leaves(self, pairs: &[(&str, &str)]) -> Self {
        pairs
            .iter()
            .fold(self, |builder, (code, name)| builder.leaf(code, name))
    }

    /// Normalize `code` with a nested mapping and store it under `parent`.
    #[must_use]
    pub fn group(
        mut self,
        code: &str,
        parent: &str,
        nested: impl FnOnce(FieldMappingBuilder) -> FieldMappingBuilder,
    ) -> Self {
        let mapping = nested(FieldMappingBuilder::default()).build();
        self.entries.insert(
            code.to_string(),
            MappingEntry::Group {
                parent: parent.to_string(),
                mapping,
            },
        );
        self
    }

    /// Freeze the mapping.
    #[must_use]
    pub fn build(self) -> FieldMapping {
        FieldMapping {
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    fn kline_mapping() -> FieldMapping {
        FieldMapping::builder()
            .leaf("e", "eventType")
            .group("k", "kline", |k| k.leaf("t", "klineStartTime").leaf("i", "interval"))
            .build()
    }

    #[test]
    fn nested_group_is_renamed() {
        let mapping = FieldMapping::builder()
            .group("k", "kline", |k| k.leaf("t", "klineStartTime"))
            .build();

        let out = mapping.apply(json!({"k": {"t": 123}}));
        assert_eq!(Value::Object(out), json!({"kline": {"klineStartTime": 123}}));
    }

    #[test]
    fn unmapped_keys_are_dropped_at_every_level() {
        let out = kline_mapping().apply(json!({
            "e": "kline",
            "x": true,
            "k": {"t": 1, "i": "1m", "B": "0"}
        }));

        assert_eq!(
            Value::Object(out),
            json!({"eventType": "kline", "kline": {"klineStartTime": 1, "interval": "1m"}})
        );
    }

    #[test]
    fn group_over_array_normalizes_each_element() {
        let mapping = FieldMapping::builder()
            .leaf("symbol", "symbol")
            .group("data", "trades", |t| t.leaf("p", "price").leaf("q", "quantity"))
            .build();

        let out = mapping.apply(json!({
            "symbol": "ETHBTC",
            "data": [{"p": "1", "q": "2", "id": 7}, {"p": "3"}]
        }));

        assert_eq!(
            Value::Object(out),
            json!({
                "symbol": "ETHBTC",
                "trades": [{"price": "1", "quantity": "2"}, {"price": "3"}]
            })
        );
    }

    #[test]
    fn group_over_scalar_yields_empty_object() {
        let out = kline_mapping().apply(json!({"k": 5}));
        assert_eq!(Value::Object(out), json!({"kline": {}}));
    }

    #[test]
    fn non_object_record_yields_empty_payload() {
        let mapping = kline_mapping();
        assert!(mapping.apply(json!([1, 2, 3])).is_empty());
        assert!(mapping.apply(json!("text")).is_empty());
        assert!(mapping.apply(Value::Null).is_empty());
    }

    #[test]
    fn missing_keys_are_not_an_error() {
        let out = kline_mapping().apply(json!({}));
        assert!(out.is_empty());
    }

    fn flat_mapping(codes: &[String]) -> FieldMapping {
        codes
            .iter()
            .fold(FieldMapping::builder(), |b, code| {
                b.leaf(code, &format!("canonical_{code}"))
            })
            .build()
    }

    fn json_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            "[a-z0-9.]{0,12}".prop_map(Value::from),
            Just(Value::Null),
        ]
    }

    proptest! {
        #[test]
        fn values_survive_renaming(
            record in prop::collection::hash_map("[a-z]{1,3}", json_leaf(), 0..12)
        ) {
            let codes: Vec<String> = record.keys().cloned().collect();
            let mapping = flat_mapping(&codes);
            let input: Map<String, Value> = record.clone().into_iter().collect();

            let out = mapping.apply(Value::Object(input));

            prop_assert_eq!(out.len(), record.len());
            for (code, value) in &record {
                let canonical = format!("canonical_{code}");
                prop_assert_eq!(out.get(&canonical), Some(value));
            }
        }

        #[test]
        fn unmapped_keys_never_appear(
            mapped in prop::collection::hash_map("[a-m]{1,3}", json_leaf(), 0..8),
            extra in prop::collection::hash_map("[n-z]{1,3}", json_leaf(), 1..8)
        ) {
            let codes: Vec<String> = mapped.keys().cloned().collect();
            let mapping = flat_mapping(&codes);
            let input: Map<String, Value> =
                mapped.clone().into_iter().chain(extra.clone()).collect();

            let out = mapping.apply(Value::Object(input));

            prop_assert_eq!(out.len(), mapped.len());
            for code in extra.keys() {
                let canonical = format!("canonical_{code}");
                prop_assert!(!out.contains_key(code));
                prop_assert!(!out.contains_key(&canonical));
            }
        }
    }
}
