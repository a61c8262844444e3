//! Dotted attribute path resolution
//!
//! Every non-terminal segment of a path such as `orders.items.sku` becomes a
//! left join node. Nodes are memoized by path prefix for the lifetime of one
//! resolver, so two expressions sharing `orders.items` reuse a single join and
//! do not multiply matching rows.

use crate::error::{Error, Result};
use crate::registry::{AttributeKind, EntityRegistry};
use crate::value::ScalarType;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

pub type JoinId = usize;

/// Row source an attribute is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Root,
    Join(JoinId),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Attribute { name: String, column: String },
    MapKey,
    MapValue,
    Element,
}

/// A resolved attribute reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AttrRef {
    pub source: Source,
    pub column: Column,
}

impl AttrRef {
    pub fn root(name: &str, column: &str) -> Self {
        Self {
            source: Source::Root,
            column: Column::Attribute {
                name: name.to_string(),
                column: column.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinTarget {
    Entity(String),
    Map,
    Collection,
}

/// One left join from `parent` through `attribute` of `owner`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinNode {
    pub id: JoinId,
    pub parent: Source,
    pub owner: String,
    pub attribute: String,
    pub path: String,
    pub target: JoinTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPath {
    pub attr: AttrRef,
    pub scalar: ScalarType,
    /// The path ended on an association and was rewritten to its identifier.
    pub identifier: bool,
}

/// Per-compilation path resolver. Never shared across compilations.
pub struct JoinResolver<'r> {
    registry: &'r EntityRegistry,
    root: String,
    joins: Vec<JoinNode>,
    memo: HashMap<String, JoinId>,
}

impl<'r> JoinResolver<'r> {
    pub fn new(registry: &'r EntityRegistry, root: &str) -> Result<Self> {
        registry.entity(root)?;
        Ok(Self {
            registry,
            root: root.to_string(),
            joins: Vec::new(),
            memo: HashMap::new(),
        })
    }

    pub fn joins(&self) -> &[JoinNode] {
        &self.joins
    }

    pub fn into_joins(self) -> Vec<JoinNode> {
        self.joins
    }

    fn join(
        &mut self,
        path: &str,
        parent: Source,
        owner: &str,
        attribute: &str,
        target: JoinTarget,
    ) -> JoinId {
        if let Some(id) = self.memo.get(path) {
            return *id;
        }
        let id = self.joins.len();
        debug!(path, join = id, "Creating left join");
        self.joins.push(JoinNode {
            id,
            parent,
            owner: owner.to_string(),
            attribute: attribute.to_string(),
            path: path.to_string(),
            target,
        });
        self.memo.insert(path.to_string(), id);
        id
    }

    /// Resolve a dotted path against the root entity.
    pub fn resolve(&mut self, path: &str) -> Result<ResolvedPath> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(Error::InvalidPath(path.to_string()));
        }

        let registry = self.registry;
        let mut entity = registry.entity(&self.root)?;
        let mut source = Source::Root;
        let mut i = 0;

        while i < segments.len() {
            let seg = segments[i];
            let last = i + 1 == segments.len();
            let prefix = segments[..=i].join(".");
            let attr = entity
                .attribute(seg)
                .ok_or_else(|| Error::attribute_not_found(&entity.name, seg))?;

            match &attr.kind {
                AttributeKind::Scalar(scalar) => {
                    if !last {
                        return Err(Error::InvalidPath(format!(
                            "{path}: '{seg}' is not an association"
                        )));
                    }
                    return Ok(ResolvedPath {
                        attr: AttrRef {
                            source,
                            column: Column::Attribute {
                                name: attr.name.clone(),
                                column: attr.column.clone(),
                            },
                        },
                        scalar: *scalar,
                        identifier: seg == entity.id,
                    });
                }
                AttributeKind::Relation(rel) => {
                    let target = registry.entity(&rel.target)?;
                    let id = self.join(
                        &prefix,
                        source,
                        &entity.name,
                        seg,
                        JoinTarget::Entity(target.name.clone()),
                    );
                    source = Source::Join(id);
                    entity = target;
                    if last {
                        let id_attr = target.id_attribute();
                        return Ok(ResolvedPath {
                            attr: AttrRef {
                                source,
                                column: Column::Attribute {
                                    name: id_attr.name.clone(),
                                    column: id_attr.column.clone(),
                                },
                            },
                            scalar: target.id_type(),
                            identifier: true,
                        });
                    }
                }
                AttributeKind::Map {
                    key_type,
                    value_type,
                    ..
                } => {
                    let id = self.join(&prefix, source, &entity.name, seg, JoinTarget::Map);
                    let (column, scalar) = match segments.get(i + 1) {
                        Some(&"key") if i + 2 == segments.len() => (Column::MapKey, *key_type),
                        Some(&"value") if i + 2 == segments.len() => {
                            (Column::MapValue, *value_type)
                        }
                        _ => {
                            return Err(Error::InvalidPath(format!(
                                "{path}: map '{seg}' must be followed by 'key' or 'value'"
                            )))
                        }
                    };
                    return Ok(ResolvedPath {
                        attr: AttrRef {
                            source: Source::Join(id),
                            column,
                        },
                        scalar,
                        identifier: false,
                    });
                }
                AttributeKind::Collection { element_type, .. } => {
                    if !last {
                        return Err(Error::InvalidPath(format!(
                            "{path}: collection '{seg}' has no sub-attributes"
                        )));
                    }
                    let id = self.join(&prefix, source, &entity.name, seg, JoinTarget::Collection);
                    return Ok(ResolvedPath {
                        attr: AttrRef {
                            source: Source::Join(id),
                            column: Column::Element,
                        },
                        scalar: *element_type,
                        identifier: false,
                    });
                }
            }
            i += 1;
        }

        Err(Error::InvalidPath(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> EntityRegistry {
        EntityRegistry::builder()
            .entity("Author", "author", |e| {
                e.id("id", ScalarType::Integer)
                    .scalar("name", ScalarType::Text)
                    .one_to_many("books", "Book")
                    .map("props", ScalarType::Text, ScalarType::Integer)
                    .collection("tags", ScalarType::Text)
            })
            .entity("Book", "book", |e| {
                e.id("id", ScalarType::Integer)
                    .scalar("title", ScalarType::Text)
                    .many_to_one("author", "Author")
            })
            .build()
            .unwrap()
    }

    #[test]
    fn shared_prefixes_reuse_one_join() {
        let registry = registry();
        let mut resolver = JoinResolver::new(&registry, "Author").unwrap();
        let a = resolver.resolve("books.title").unwrap();
        let b = resolver.resolve("books.author.name").unwrap();
        let c = resolver.resolve("books.id").unwrap();
        assert_eq!(a.attr.source, Source::Join(0));
        assert_eq!(b.attr.source, Source::Join(1));
        assert_eq!(c.attr.source, Source::Join(0));
        assert_eq!(resolver.joins().len(), 2);
        assert_eq!(resolver.joins()[1].parent, Source::Join(0));
    }

    #[test]
    fn terminal_association_compares_identifier() {
        let registry = registry();
        let mut resolver = JoinResolver::new(&registry, "Book").unwrap();
        let resolved = resolver.resolve("author").unwrap();
        assert!(resolved.identifier);
        assert_eq!(resolved.scalar, ScalarType::Integer);
        assert_eq!(
            resolved.attr.column,
            Column::Attribute {
                name: "id".into(),
                column: "id".into()
            }
        );
    }

    #[test]
    fn map_and_collection_accessors() {
        let registry = registry();
        let mut resolver = JoinResolver::new(&registry, "Author").unwrap();
        assert_eq!(
            resolver.resolve("props.key").unwrap().attr.column,
            Column::MapKey
        );
        let value = resolver.resolve("props.value").unwrap();
        assert_eq!(value.scalar, ScalarType::Integer);
        assert_eq!(value.attr.source, Source::Join(0));
        assert_eq!(
            resolver.resolve("tags").unwrap().attr.column,
            Column::Element
        );
        assert!(matches!(
            resolver.resolve("props"),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn bad_paths_are_rejected() {
        let registry = registry();
        let mut resolver = JoinResolver::new(&registry, "Author").unwrap();
        assert!(matches!(
            resolver.resolve("name.first"),
            Err(Error::InvalidPath(_))
        ));
        assert!(matches!(
            resolver.resolve("books.isbn"),
            Err(Error::AttributeNotFound { .. })
        ));
        assert!(matches!(resolver.resolve("books..title"), Err(Error::InvalidPath(_))));
    }
}
