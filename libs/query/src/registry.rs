//! Static entity metadata
//!
//! The registry describes every entity the query language can address:
//! scalar attributes with their semantic types, associations with their
//! relationship kind, target entity and storage mapping, and map/collection
//! valued element attributes. It is built once at startup, either through
//! [`EntityRegistry::builder`] or from a JSON schema document, and is then
//! shared read-only by every compilation and execution.

use crate::error::{Error, Result};
use crate::value::ScalarType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Relationship kind of an association attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    ManyToOne,
    OneToOne,
    OneToMany,
    ManyToMany,
}

impl RelationKind {
    pub fn is_to_many(self) -> bool {
        matches!(self, Self::OneToMany | Self::ManyToMany)
    }

    /// The kind the opposite side of a bidirectional association must have.
    pub fn structural_inverse(self) -> Self {
        match self {
            Self::ManyToOne => Self::OneToMany,
            Self::OneToMany => Self::ManyToOne,
            Self::OneToOne => Self::OneToOne,
            Self::ManyToMany => Self::ManyToMany,
        }
    }
}

/// Join table of a many-to-many association, oriented from one side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinTableDef {
    pub table: String,
    /// Column referencing the identifier of the side the table is oriented from.
    pub owner_column: String,
    /// Column referencing the identifier of the other side.
    pub target_column: String,
}

impl JoinTableDef {
    fn flipped(&self) -> Self {
        Self {
            table: self.table.clone(),
            owner_column: self.target_column.clone(),
            target_column: self.owner_column.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationDef {
    pub kind: RelationKind,
    pub target: String,
    /// Explicitly declared inverse field on the target entity.
    pub inverse: Option<String>,
    /// `true` when this side stores the foreign key or the join table.
    pub owning: bool,
    pub join_column: Option<String>,
    pub join_table: Option<JoinTableDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeKind {
    Scalar(ScalarType),
    Relation(RelationDef),
    Map {
        table: String,
        owner_column: String,
        key_column: String,
        value_column: String,
        key_type: ScalarType,
        value_type: ScalarType,
    },
    Collection {
        table: String,
        owner_column: String,
        value_column: String,
        element_type: ScalarType,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDef {
    pub name: String,
    pub column: String,
    pub nullable: bool,
    pub kind: AttributeKind,
}

impl AttributeDef {
    pub fn scalar_type(&self) -> Option<ScalarType> {
        match &self.kind {
            AttributeKind::Scalar(t) => Some(*t),
            _ => None,
        }
    }

    pub fn relation(&self) -> Option<&RelationDef> {
        match &self.kind {
            AttributeKind::Relation(r) => Some(r),
            _ => None,
        }
    }

    /// Foreign-key column carried by this attribute's own table, if any.
    pub fn foreign_key_column(&self) -> Option<&str> {
        match &self.kind {
            AttributeKind::Relation(r)
                if r.owning && matches!(r.kind, RelationKind::ManyToOne | RelationKind::OneToOne) =>
            {
                r.join_column.as_deref()
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityDef {
    pub name: String,
    pub table: String,
    pub id: String,
    attributes: Vec<AttributeDef>,
    index: HashMap<String, usize>,
}

impl EntityDef {
    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.index.get(name).map(|i| &self.attributes[*i])
    }

    pub fn attributes(&self) -> impl Iterator<Item = &AttributeDef> {
        self.attributes.iter()
    }

    pub fn id_attribute(&self) -> &AttributeDef {
        &self.attributes[self.index[&self.id]]
    }

    pub fn id_type(&self) -> ScalarType {
        self.id_attribute()
            .scalar_type()
            .unwrap_or(ScalarType::Integer)
    }

    pub fn id_column(&self) -> &str {
        &self.id_attribute().column
    }

    pub fn scalars(&self) -> impl Iterator<Item = &AttributeDef> {
        self.attributes
            .iter()
            .filter(|a| matches!(a.kind, AttributeKind::Scalar(_)))
    }

    /// To-one associations whose foreign key lives in this entity's table.
    pub fn foreign_keys(&self) -> impl Iterator<Item = &AttributeDef> {
        self.attributes
            .iter()
            .filter(|a| a.foreign_key_column().is_some())
    }
}

/// Registry of entity metadata, keyed by entity name.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: HashMap<String, EntityDef>,
}

impl EntityRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn entity(&self, name: &str) -> Result<&EntityDef> {
        self.entities
            .get(name)
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn attribute(&self, entity: &str, attribute: &str) -> Result<&AttributeDef> {
        self.entity(entity)?
            .attribute(attribute)
            .ok_or_else(|| Error::attribute_not_found(entity, attribute))
    }

    pub fn relation(&self, entity: &str, attribute: &str) -> Result<&RelationDef> {
        self.attribute(entity, attribute)?
            .relation()
            .ok_or_else(|| {
                Error::InvalidPath(format!("{entity}.{attribute} is not an association"))
            })
    }

    /// Locate the attribute on the target entity that points back at `owner`
    /// through `attribute`.
    ///
    /// An explicitly declared inverse always wins. Otherwise the target's
    /// associations are scanned for exactly one whose target is `owner` and
    /// whose kind is the structural inverse; zero or several candidates are
    /// reported as errors rather than guessed.
    pub fn back_reference(&self, owner: &str, attribute: &str) -> Result<&AttributeDef> {
        let relation = self.relation(owner, attribute)?;
        let target = self.entity(&relation.target)?;

        if let Some(inverse) = &relation.inverse {
            let attr = target
                .attribute(inverse)
                .ok_or_else(|| Error::attribute_not_found(&target.name, inverse))?;
            return match attr.relation() {
                Some(r) if r.target == owner => Ok(attr),
                _ => Err(Error::Schema(format!(
                    "{}.{} is declared as inverse of {owner}.{attribute} but does not reference {owner}",
                    target.name, inverse
                ))),
            };
        }

        let wanted = relation.kind.structural_inverse();
        let candidates: Vec<&AttributeDef> = target
            .attributes()
            .filter(|a| {
                a.relation()
                    .is_some_and(|r| r.target == owner && r.kind == wanted)
            })
            .filter(|a| !(target.name == owner && a.name == attribute))
            .collect();

        match candidates.as_slice() {
            [single] => Ok(single),
            [] => Err(Error::MissingBackReference {
                entity: owner.to_string(),
                attribute: attribute.to_string(),
            }),
            many => Err(Error::AmbiguousBackReference {
                entity: owner.to_string(),
                attribute: attribute.to_string(),
                candidates: many.iter().map(|a| a.name.clone()).collect(),
            }),
        }
    }

    /// Join table of a many-to-many association oriented from `owner`.
    pub fn join_table(&self, owner: &str, attribute: &str) -> Result<JoinTableDef> {
        let relation = self.relation(owner, attribute)?;
        if relation.kind != RelationKind::ManyToMany {
            return Err(Error::InvalidPath(format!(
                "{owner}.{attribute} is not a many-to-many association"
            )));
        }
        if let Some(jt) = &relation.join_table {
            return Ok(jt.clone());
        }
        let inverse = self.back_reference(owner, attribute)?;
        match inverse.relation().and_then(|r| r.join_table.as_ref()) {
            Some(jt) => Ok(jt.flipped()),
            None => Err(Error::Schema(format!(
                "Neither side of {owner}.{attribute} declares a join table"
            ))),
        }
    }

    /// Foreign-key column on the target table that references `owner` for a
    /// one-to-many (or inverse one-to-one) association.
    pub fn inverse_join_column(&self, owner: &str, attribute: &str) -> Result<String> {
        let back = self.back_reference(owner, attribute)?;
        back.foreign_key_column().map(str::to_string).ok_or_else(|| {
            Error::Schema(format!(
                "Back-reference {}.{} of {owner}.{attribute} does not own a join column",
                self.relation(owner, attribute)
                    .map(|r| r.target.clone())
                    .unwrap_or_default(),
                back.name
            ))
        })
    }

    /// Build a registry from a JSON schema document.
    pub fn from_json(input: &str) -> Result<Self> {
        let doc: SchemaDocument = serde_json::from_str(input)
            .map_err(|e| Error::Schema(format!("Invalid schema document: {e}")))?;
        doc.into_registry()
    }
}

/// Builder for [`EntityRegistry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entities: Vec<EntityBuilder>,
}

impl RegistryBuilder {
    pub fn entity(
        mut self,
        name: &str,
        table: &str,
        define: impl FnOnce(EntityBuilder) -> EntityBuilder,
    ) -> Self {
        self.entities.push(define(EntityBuilder::new(name, table)));
        self
    }

    pub fn build(self) -> Result<EntityRegistry> {
        let mut entities = HashMap::new();
        for builder in self.entities {
            let def = builder.finish()?;
            if entities.contains_key(&def.name) {
                return Err(Error::Schema(format!("Duplicate entity '{}'", def.name)));
            }
            entities.insert(def.name.clone(), def);
        }
        let registry = EntityRegistry { entities };
        validate_targets(&registry)?;
        Ok(registry)
    }
}

fn validate_targets(registry: &EntityRegistry) -> Result<()> {
    for entity in registry.entities.values() {
        for attr in entity.attributes() {
            if let Some(rel) = attr.relation() {
                if !registry.entities.contains_key(&rel.target) {
                    return Err(Error::Schema(format!(
                        "{}.{} targets unknown entity '{}'",
                        entity.name, attr.name, rel.target
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Builder for a single entity. Modifiers such as [`EntityBuilder::inverse`]
/// apply to the most recently declared attribute.
#[derive(Debug)]
pub struct EntityBuilder {
    name: String,
    table: String,
    id: Option<String>,
    attributes: Vec<AttributeDef>,
    errors: Vec<String>,
}

impl EntityBuilder {
    fn new(name: &str, table: &str) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            id: None,
            attributes: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn push(mut self, name: &str, kind: AttributeKind, column: String) -> Self {
        self.attributes.push(AttributeDef {
            name: name.to_string(),
            column,
            nullable: true,
            kind,
        });
        self
    }

    fn relation(self, name: &str, target: &str, kind: RelationKind) -> Self {
        let owning = matches!(
            kind,
            RelationKind::ManyToOne | RelationKind::OneToOne | RelationKind::ManyToMany
        );
        let join_column = matches!(kind, RelationKind::ManyToOne | RelationKind::OneToOne)
            .then(|| format!("{name}_id"));
        let join_table = (kind == RelationKind::ManyToMany).then(|| JoinTableDef {
            table: format!("{}_{}", self.table, name),
            owner_column: format!("{}_id", self.table),
            target_column: format!("{}_id", target.to_ascii_lowercase()),
        });
        let column = join_column.clone().unwrap_or_else(|| name.to_string());
        self.push(
            name,
            AttributeKind::Relation(RelationDef {
                kind,
                target: target.to_string(),
                inverse: None,
                owning,
                join_column,
                join_table,
            }),
            column,
        )
    }

    pub fn id(mut self, name: &str, scalar: ScalarType) -> Self {
        self.id = Some(name.to_string());
        let mut this = self.push(name, AttributeKind::Scalar(scalar), name.to_string());
        if let Some(last) = this.attributes.last_mut() {
            last.nullable = false;
        }
        this
    }

    pub fn scalar(self, name: &str, scalar: ScalarType) -> Self {
        self.push(name, AttributeKind::Scalar(scalar), name.to_string())
    }

    pub fn many_to_one(self, name: &str, target: &str) -> Self {
        self.relation(name, target, RelationKind::ManyToOne)
    }

    pub fn one_to_one(self, name: &str, target: &str) -> Self {
        self.relation(name, target, RelationKind::OneToOne)
    }

    pub fn one_to_many(self, name: &str, target: &str) -> Self {
        self.relation(name, target, RelationKind::OneToMany)
    }

    pub fn many_to_many(self, name: &str, target: &str) -> Self {
        self.relation(name, target, RelationKind::ManyToMany)
    }

    pub fn map(self, name: &str, key_type: ScalarType, value_type: ScalarType) -> Self {
        let table = format!("{}_{}", self.table, name);
        let owner_column = format!("{}_id", self.table);
        self.push(
            name,
            AttributeKind::Map {
                table,
                owner_column,
                key_column: "key".to_string(),
                value_column: "value".to_string(),
                key_type,
                value_type,
            },
            name.to_string(),
        )
    }

    pub fn collection(self, name: &str, element_type: ScalarType) -> Self {
        let table = format!("{}_{}", self.table, name);
        let owner_column = format!("{}_id", self.table);
        self.push(
            name,
            AttributeKind::Collection {
                table,
                owner_column,
                value_column: "value".to_string(),
                element_type,
            },
            name.to_string(),
        )
    }

    fn last_mut(&mut self, modifier: &str) -> Option<&mut AttributeDef> {
        if self.attributes.is_empty() {
            self.errors.push(format!(
                "{}: '{modifier}' used before any attribute was declared",
                self.name
            ));
        }
        self.attributes.last_mut()
    }

    fn last_relation_mut(&mut self, modifier: &str) -> Option<&mut RelationDef> {
        let attr = self.last_mut(modifier)?;
        if !matches!(attr.kind, AttributeKind::Relation(_)) {
            let name = attr.name.clone();
            self.errors.push(format!(
                "{}.{name}: '{modifier}' only applies to associations",
                self.name
            ));
            return None;
        }
        match &mut self.attributes.last_mut()?.kind {
            AttributeKind::Relation(r) => Some(r),
            _ => None,
        }
    }

    /// Column name of the last declared scalar attribute.
    pub fn column(mut self, column: &str) -> Self {
        if let Some(attr) = self.last_mut("column") {
            attr.column = column.to_string();
        }
        self
    }

    pub fn not_null(mut self) -> Self {
        if let Some(attr) = self.last_mut("not_null") {
            attr.nullable = false;
        }
        self
    }

    /// Explicit inverse field on the target of the last association.
    pub fn inverse(mut self, field: &str) -> Self {
        if let Some(rel) = self.last_relation_mut("inverse") {
            rel.inverse = Some(field.to_string());
        }
        self
    }

    /// Mark the last association as the non-owning side, mapped by `field` on the target.
    pub fn mapped_by(mut self, field: &str) -> Self {
        if let Some(rel) = self.last_relation_mut("mapped_by") {
            rel.inverse = Some(field.to_string());
            rel.owning = false;
            rel.join_column = None;
            rel.join_table = None;
        }
        self
    }

    pub fn join_column(mut self, column: &str) -> Self {
        if let Some(rel) = self.last_relation_mut("join_column") {
            rel.join_column = Some(column.to_string());
        }
        if let Some(attr) = self.attributes.last_mut() {
            attr.column = column.to_string();
        }
        self
    }

    pub fn join_table(mut self, table: &str, owner_column: &str, target_column: &str) -> Self {
        if let Some(rel) = self.last_relation_mut("join_table") {
            rel.owning = true;
            rel.join_table = Some(JoinTableDef {
                table: table.to_string(),
                owner_column: owner_column.to_string(),
                target_column: target_column.to_string(),
            });
        }
        self
    }

    /// Storage table of the last declared map or collection attribute.
    pub fn element_table(mut self, table: &str, owner_column: &str) -> Self {
        if let Some(attr) = self.last_mut("element_table") {
            match &mut attr.kind {
                AttributeKind::Map {
                    table: t,
                    owner_column: o,
                    ..
                }
                | AttributeKind::Collection {
                    table: t,
                    owner_column: o,
                    ..
                } => {
                    *t = table.to_string();
                    *o = owner_column.to_string();
                }
                _ => {}
            }
        }
        self
    }

    fn finish(self) -> Result<EntityDef> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(Error::Schema(err));
        }
        let id = self
            .id
            .ok_or_else(|| Error::Schema(format!("Entity '{}' declares no id", self.name)))?;
        let mut index = HashMap::new();
        for (i, attr) in self.attributes.iter().enumerate() {
            if index.insert(attr.name.clone(), i).is_some() {
                return Err(Error::Schema(format!(
                    "Duplicate attribute '{}.{}'",
                    self.name, attr.name
                )));
            }
        }
        Ok(EntityDef {
            name: self.name,
            table: self.table,
            id,
            attributes: self.attributes,
            index,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SchemaDocument {
    entities: Vec<EntitySchema>,
}

#[derive(Debug, Deserialize)]
struct EntitySchema {
    name: String,
    table: Option<String>,
    id: IdSchema,
    #[serde(default)]
    attributes: Vec<AttributeSchema>,
}

#[derive(Debug, Deserialize)]
struct IdSchema {
    name: String,
    #[serde(rename = "type")]
    scalar: ScalarType,
}

#[derive(Debug, Deserialize)]
struct AttributeSchema {
    name: String,
    #[serde(rename = "type")]
    scalar: Option<ScalarType>,
    column: Option<String>,
    #[serde(default)]
    not_null: bool,
    relation: Option<RelationKind>,
    target: Option<String>,
    inverse: Option<String>,
    mapped_by: Option<String>,
    join_column: Option<String>,
    join_table: Option<JoinTableSchema>,
    map: Option<MapSchema>,
    collection: Option<CollectionSchema>,
}

#[derive(Debug, Deserialize)]
struct JoinTableSchema {
    table: String,
    owner_column: String,
    target_column: String,
}

#[derive(Debug, Deserialize)]
struct MapSchema {
    key_type: ScalarType,
    value_type: ScalarType,
    table: Option<String>,
    owner_column: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CollectionSchema {
    element_type: ScalarType,
    table: Option<String>,
    owner_column: Option<String>,
}

impl SchemaDocument {
    fn into_registry(self) -> Result<EntityRegistry> {
        let mut builder = EntityRegistry::builder();
        for entity in self.entities {
            let table = entity
                .table
                .clone()
                .unwrap_or_else(|| entity.name.to_ascii_lowercase());
            let mut e = EntityBuilder::new(&entity.name, &table).id(&entity.id.name, entity.id.scalar);
            for attr in entity.attributes {
                e = attr.apply(&entity.name, e)?;
            }
            builder.entities.push(e);
        }
        builder.build()
    }
}

impl AttributeSchema {
    fn apply(self, entity: &str, mut e: EntityBuilder) -> Result<EntityBuilder> {
        if let Some(kind) = self.relation {
            let target = self.target.as_deref().ok_or_else(|| {
                Error::Schema(format!("{entity}.{} declares no target", self.name))
            })?;
            e = e.relation(&self.name, target, kind);
            if let Some(inv) = &self.inverse {
                e = e.inverse(inv);
            }
            if let Some(mb) = &self.mapped_by {
                e = e.mapped_by(mb);
            }
            if let Some(col) = &self.join_column {
                e = e.join_column(col);
            }
            if let Some(jt) = &self.join_table {
                e = e.join_table(&jt.table, &jt.owner_column, &jt.target_column);
            }
        } else if let Some(map) = self.map {
            e = e.map(&self.name, map.key_type, map.value_type);
            if let (Some(t), Some(o)) = (&map.table, &map.owner_column) {
                e = e.element_table(t, o);
            }
        } else if let Some(coll) = self.collection {
            e = e.collection(&self.name, coll.element_type);
            if let (Some(t), Some(o)) = (&coll.table, &coll.owner_column) {
                e = e.element_table(t, o);
            }
        } else {
            let scalar = self.scalar.ok_or_else(|| {
                Error::Schema(format!("{entity}.{} declares no type", self.name))
            })?;
            e = e.scalar(&self.name, scalar);
            if let Some(col) = &self.column {
                e = e.column(col);
            }
        }
        if self.not_null {
            e = e.not_null();
        }
        Ok(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shop() -> EntityRegistry {
        EntityRegistry::builder()
            .entity("Customer", "customer", |e| {
                e.id("id", ScalarType::Integer)
                    .scalar("name", ScalarType::Text)
                    .one_to_many("orders", "Order")
                    .many_to_many("groups", "Group")
            })
            .entity("Order", "orders", |e| {
                e.id("id", ScalarType::Integer)
                    .many_to_one("customer", "Customer")
                    .many_to_one("reviewer", "Customer")
            })
            .entity("Group", "groups", |e| {
                e.id("id", ScalarType::Integer)
                    .many_to_many("members", "Customer")
                    .mapped_by("groups")
            })
            .build()
            .unwrap()
    }

    #[test]
    fn ambiguous_back_reference_is_rejected() {
        let registry = shop();
        let err = registry.back_reference("Customer", "orders").unwrap_err();
        match err {
            Error::AmbiguousBackReference { candidates, .. } => {
                assert_eq!(candidates, vec!["customer", "reviewer"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn explicit_inverse_resolves_ambiguity() {
        let registry = EntityRegistry::builder()
            .entity("Customer", "customer", |e| {
                e.id("id", ScalarType::Integer)
                    .one_to_many("orders", "Order")
                    .inverse("customer")
            })
            .entity("Order", "orders", |e| {
                e.id("id", ScalarType::Integer)
                    .many_to_one("customer", "Customer")
                    .many_to_one("reviewer", "Customer")
            })
            .build()
            .unwrap();
        let back = registry.back_reference("Customer", "orders").unwrap();
        assert_eq!(back.name, "customer");
        assert_eq!(
            registry.inverse_join_column("Customer", "orders").unwrap(),
            "customer_id"
        );
    }

    #[test]
    fn missing_back_reference_is_reported() {
        let registry = EntityRegistry::builder()
            .entity("A", "a", |e| e.id("id", ScalarType::Integer).one_to_many("bs", "B"))
            .entity("B", "b", |e| e.id("id", ScalarType::Integer))
            .build()
            .unwrap();
        assert!(matches!(
            registry.back_reference("A", "bs"),
            Err(Error::MissingBackReference { .. })
        ));
    }

    #[test]
    fn many_to_many_join_table_is_oriented_from_either_side() {
        let registry = shop();
        let owning = registry.join_table("Customer", "groups").unwrap();
        assert_eq!(owning.table, "customer_groups");
        assert_eq!(owning.owner_column, "customer_id");
        let inverse = registry.join_table("Group", "members").unwrap();
        assert_eq!(inverse.owner_column, "group_id");
        assert_eq!(inverse.target_column, "customer_id");
    }

    #[test]
    fn builder_rejects_unknown_targets_and_misplaced_modifiers() {
        let err = EntityRegistry::builder()
            .entity("A", "a", |e| e.id("id", ScalarType::Integer).many_to_one("b", "B"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("unknown entity"));

        let err = EntityRegistry::builder()
            .entity("A", "a", |e| {
                e.id("id", ScalarType::Integer)
                    .scalar("name", ScalarType::Text)
                    .inverse("x")
            })
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("only applies to associations"));
    }

    #[test]
    fn schema_document_builds_registry() {
        let json = r#"{
            "entities": [
                {"name": "Author", "table": "authors", "id": {"name": "id", "type": "integer"},
                 "attributes": [
                    {"name": "name", "type": "text", "not_null": true},
                    {"name": "books", "relation": "one_to_many", "target": "Book"},
                    {"name": "tags", "collection": {"element_type": "text"}},
                    {"name": "props", "map": {"key_type": "text", "value_type": "integer"}}
                 ]},
                {"name": "Book", "id": {"name": "id", "type": "uuid"},
                 "attributes": [
                    {"name": "author", "relation": "many_to_one", "target": "Author", "join_column": "author_fk"}
                 ]}
            ]
        }"#;
        let registry = EntityRegistry::from_json(json).unwrap();
        let book = registry.entity("Book").unwrap();
        assert_eq!(book.table, "book");
        assert_eq!(book.id_type(), ScalarType::Uuid);
        assert_eq!(
            registry.inverse_join_column("Author", "books").unwrap(),
            "author_fk"
        );
        assert!(!registry.attribute("Author", "name").unwrap().nullable);
    }
}
