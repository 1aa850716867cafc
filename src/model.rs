//! Normalized configuration value objects.
//!
//! A [`ModelObject`] holds the set of fields read from, or to be written to,
//! one configuration node. It is immutable once built; readers populate a
//! [`ModelBuilder`] field-by-field and the builder is only ever owned by the
//! call that created it. Fields left unset stay absent, they are never
//! defaulted.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single typed field value inside a [`ModelObject`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<FieldValue>),
    Object(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, FieldValue>> {
        match self {
            FieldValue::Object(v) => Some(v),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<u16> for FieldValue {
    fn from(v: u16) -> Self {
        FieldValue::Int(i64::from(v))
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(v: Vec<T>) -> Self {
        FieldValue::List(v.into_iter().map(Into::into).collect())
    }
}

/// Immutable value object for one configuration node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ModelObject {
    fields: BTreeMap<String, FieldValue>,
}

impl ModelObject {
    /// Returns a builder seeded with this object's fields.
    pub fn to_builder(&self) -> ModelBuilder {
        ModelBuilder {
            fields: self.fields.clone(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(FieldValue::as_str)
    }

    pub fn int_field(&self, name: &str) -> Option<i64> {
        self.field(name).and_then(FieldValue::as_int)
    }

    pub fn bool_field(&self, name: &str) -> Option<bool> {
        self.field(name).and_then(FieldValue::as_bool)
    }

    pub fn list_field(&self, name: &str) -> Option<&[FieldValue]> {
        self.field(name).and_then(FieldValue::as_list)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Names of fields whose values differ between `self` and `other`,
    /// including fields present on only one side.
    pub fn changed_fields<'a>(&'a self, other: &'a ModelObject) -> Vec<&'a str> {
        let mut changed = Vec::new();
        for (name, value) in &self.fields {
            if other.fields.get(name) != Some(value) {
                changed.push(name.as_str());
            }
        }
        for name in other.fields.keys() {
            if !self.fields.contains_key(name) {
                changed.push(name.as_str());
            }
        }
        changed.sort_unstable();
        changed.dedup();
        changed
    }
}

/// Accumulator used by readers to populate a [`ModelObject`] field-by-field.
///
/// Merge semantics are field-level: setting a field overwrites only that
/// field, so a later pipeline child can refine a single field without
/// clobbering the rest of the object.
#[derive(Debug, Clone, Default)]
pub struct ModelBuilder {
    fields: BTreeMap<String, FieldValue>,
}

impl ModelBuilder {
    pub fn new() -> Self {
        ModelBuilder::default()
    }

    /// Sets one field, replacing any previous value of that field.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> &mut Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Sets the field only when `value` is present. Absent values leave the
    /// field untouched rather than erasing it.
    pub fn set_opt(
        &mut self,
        name: impl Into<String>,
        value: Option<impl Into<FieldValue>>,
    ) -> &mut Self {
        if let Some(value) = value {
            self.fields.insert(name.into(), value.into());
        }
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field-level merge of another builder into this one. Fields set in
    /// `other` win; fields only present here survive.
    pub fn merge_from(&mut self, other: ModelBuilder) -> &mut Self {
        for (name, value) in other.fields {
            self.fields.insert(name, value);
        }
        self
    }

    pub fn build(self) -> ModelObject {
        ModelObject {
            fields: self.fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_fields_stay_absent() {
        let mut builder = ModelBuilder::new();
        builder.set("id", 12i64).set("name", "up");
        let model = builder.build();

        assert_eq!(model.int_field("id"), Some(12));
        assert_eq!(model.str_field("name"), Some("up"));
        assert!(!model.has_field("status"));
        assert_eq!(model.bool_field("status"), None);
    }

    #[test]
    fn set_opt_ignores_absent_values() {
        let mut builder = ModelBuilder::new();
        builder.set("name", "up");
        builder.set_opt("name", None::<&str>);
        builder.set_opt("status", Some("ACTIVE"));
        let model = builder.build();

        assert_eq!(model.str_field("name"), Some("up"));
        assert_eq!(model.str_field("status"), Some("ACTIVE"));
    }

    #[test]
    fn merge_is_field_level() {
        let mut base = ModelBuilder::new();
        base.set("id", 12i64).set("name", "old");

        let mut refinement = ModelBuilder::new();
        refinement.set("name", "new");

        base.merge_from(refinement);
        let model = base.build();

        assert_eq!(model.int_field("id"), Some(12));
        assert_eq!(model.str_field("name"), Some("new"));
    }

    #[test]
    fn changed_fields_covers_both_sides() {
        let mut a = ModelBuilder::new();
        a.set("id", 1i64).set("name", "a");
        let a = a.build();

        let mut b = ModelBuilder::new();
        b.set("id", 1i64).set("status", "ACTIVE");
        let b = b.build();

        assert_eq!(a.changed_fields(&b), vec!["name", "status"]);
        assert!(a.changed_fields(&a).is_empty());
    }

    #[test]
    fn list_fields_preserve_order() {
        let mut builder = ModelBuilder::new();
        builder.set("trunk-vlans", vec![13i64, 14, 15]);
        let model = builder.build();

        let trunks: Vec<i64> = model
            .list_field("trunk-vlans")
            .expect("list field")
            .iter()
            .filter_map(FieldValue::as_int)
            .collect();
        assert_eq!(trunks, vec![13, 14, 15]);
    }

    #[test]
    fn model_json_round_trip() {
        let mut builder = ModelBuilder::new();
        builder.set("id", 12i64).set("shutdown", false);
        let model = builder.build();

        let json = serde_json::to_string(&model).expect("encode model");
        let decoded: ModelObject = serde_json::from_str(&json).expect("decode model");
        assert_eq!(decoded, model);
    }
}
