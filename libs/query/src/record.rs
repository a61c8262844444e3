//! Rows returned by a store, with their loaded associations

use crate::error::{Error, Result};
use crate::value::Value;
use serde::de::DeserializeOwned;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// An association that has been loaded onto its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded {
    One(Option<Box<Record>>),
    Many(Vec<Record>),
}

impl Loaded {
    pub fn records(&self) -> Vec<&Record> {
        match self {
            Loaded::One(one) => one.iter().map(|r| &**r).collect(),
            Loaded::Many(many) => many.iter().collect(),
        }
    }

    pub fn records_mut(&mut self) -> Vec<&mut Record> {
        match self {
            Loaded::One(one) => one.iter_mut().map(|r| &mut **r).collect(),
            Loaded::Many(many) => many.iter_mut().collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Loaded::One(one) => usize::from(one.is_some()),
            Loaded::Many(many) => many.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub entity: String,
    pub id: Value,
    /// Scalar attribute values keyed by attribute name, including the id.
    pub fields: BTreeMap<String, Value>,
    /// Foreign-key identifiers of to-one associations owned by this row.
    pub references: BTreeMap<String, Value>,
    /// Associations loaded by the fetch executor.
    pub relations: BTreeMap<String, Loaded>,
}

impl Record {
    pub fn new(entity: &str, id_attribute: &str, id: impl Into<Value>) -> Self {
        let id = id.into();
        let mut fields = BTreeMap::new();
        fields.insert(id_attribute.to_string(), id.clone());
        Self {
            entity: entity.to_string(),
            id,
            fields,
            references: BTreeMap::new(),
            relations: BTreeMap::new(),
        }
    }

    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    pub fn with_reference(mut self, attribute: &str, id: impl Into<Value>) -> Self {
        self.references.insert(attribute.to_string(), id.into());
        self
    }

    /// Canonical identity key.
    pub fn key(&self) -> String {
        self.id.key()
    }

    pub fn field(&self, name: &str) -> &Value {
        self.fields.get(name).unwrap_or(&Value::Null)
    }

    pub fn reference(&self, attribute: &str) -> &Value {
        self.references.get(attribute).unwrap_or(&Value::Null)
    }

    pub fn relation(&self, attribute: &str) -> Option<&Loaded> {
        self.relations.get(attribute)
    }

    pub fn set_relation(&mut self, attribute: &str, loaded: Loaded) {
        self.relations.insert(attribute.to_string(), loaded);
    }

    pub fn is_loaded(&self, attribute: &str) -> bool {
        self.relations.contains_key(attribute)
    }

    /// Records loaded under `attribute`, empty when not loaded.
    pub fn related_mut(&mut self, attribute: &str) -> Vec<&mut Record> {
        self.relations
            .get_mut(attribute)
            .map(Loaded::records_mut)
            .unwrap_or_default()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Materialize into a caller type through its serde representation.
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.to_json()).map_err(|e| {
            Error::Store(format!("Cannot materialize {} {}: {e}", self.entity, self.id))
        })
    }
}

/// Fields first, then loaded associations. Unloaded associations are omitted.
impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + self.relations.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        for (name, loaded) in &self.relations {
            match loaded {
                Loaded::One(one) => map.serialize_entry(name, one)?,
                Loaded::Many(many) => map.serialize_entry(name, many)?,
            }
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Author {
        id: i64,
        name: String,
        #[serde(default)]
        books: Vec<Book>,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Book {
        id: i64,
        title: Option<String>,
    }

    #[test]
    fn materializes_nested_relations() {
        let mut author = Record::new("Author", "id", 1).with("name", "Le Guin");
        author.set_relation(
            "books",
            Loaded::Many(vec![
                Record::new("Book", "id", 10).with("title", "The Dispossessed"),
                Record::new("Book", "id", 11).with("title", Value::Null),
            ]),
        );
        let typed: Author = author.to_typed().unwrap();
        assert_eq!(typed.books.len(), 2);
        assert_eq!(typed.books[1].title, None);
    }

    #[test]
    fn unloaded_relations_are_omitted() {
        let author = Record::new("Author", "id", 1)
            .with("name", "Butler")
            .with_reference("publisher", 7);
        let json = author.to_json();
        assert_eq!(json, serde_json::json!({"id": 1, "name": "Butler"}));
        assert!(!author.is_loaded("books"));
        assert_eq!(author.reference("publisher"), &Value::Int(7));
    }
}
