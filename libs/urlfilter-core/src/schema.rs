//! Reflected entity model.
//!
//! A [`SchemaRegistry`] holds one [`Schema`] per entity. Relations point at
//! their target by entity name, so cyclic models (`users.orders` /
//! `orders.user`) are representable without reference counting. The registry
//! is built once (programmatically or from YAML) and shared read-only.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Native storage type of a scalar field; drives value coercion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    String,
    #[serde(alias = "int", alias = "integer", alias = "i64")]
    Long,
    #[serde(alias = "bool")]
    Boolean,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    ToOne,
    ToMany,
}

/// Link table for many-to-many relations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinTable {
    pub table: String,
    /// Column in the link table pointing at the owning row.
    pub source_key: String,
    /// Column in the link table pointing at the target row.
    pub target_key: String,
}

/// Storage description of a relation.
///
/// Without `via`, rows match when `owner.local_key = target.foreign_key`.
/// With `via`, `owner.local_key = via.source_key` and
/// `via.target_key = target.foreign_key`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Relation {
    pub target: String,
    pub cardinality: Cardinality,
    pub local_key: String,
    pub foreign_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via: Option<JoinTable>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Scalar {
        #[serde(rename = "type")]
        value_type: ValueType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        column: Option<String>,
    },
    Relation(Relation),
}

/// Borrowed view of one field of a [`Schema`].
#[derive(Clone, Copy, Debug)]
pub struct SchemaField<'a> {
    pub name: &'a str,
    pub kind: &'a FieldKind,
}

impl<'a> SchemaField<'a> {
    pub fn is_collection_valued(&self) -> bool {
        matches!(
            self.kind,
            FieldKind::Relation(Relation {
                cardinality: Cardinality::ToMany,
                ..
            })
        )
    }

    pub fn relation(&self) -> Option<&'a Relation> {
        match self.kind {
            FieldKind::Relation(r) => Some(r),
            FieldKind::Scalar { .. } => None,
        }
    }

    pub fn value_type(&self) -> Option<ValueType> {
        match self.kind {
            FieldKind::Scalar { value_type, .. } => Some(*value_type),
            FieldKind::Relation(_) => None,
        }
    }

    /// Storage column of a scalar field (defaults to the field name).
    pub fn column(&self) -> Option<&'a str> {
        match self.kind {
            FieldKind::Scalar { column, .. } => Some(column.as_deref().unwrap_or(self.name)),
            FieldKind::Relation(_) => None,
        }
    }
}

fn default_primary_key() -> String {
    "id".to_string()
}

/// Shape of one entity type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Schema {
    #[serde(skip)]
    name: String,
    pub table: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldKind>,
}

impl Schema {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            primary_key: default_primary_key(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    pub fn scalar(mut self, name: impl Into<String>, value_type: ValueType) -> Self {
        self.fields.insert(
            name.into(),
            FieldKind::Scalar {
                value_type,
                column: None,
            },
        );
        self
    }

    pub fn scalar_column(
        mut self,
        name: impl Into<String>,
        column: impl Into<String>,
        value_type: ValueType,
    ) -> Self {
        self.fields.insert(
            name.into(),
            FieldKind::Scalar {
                value_type,
                column: Some(column.into()),
            },
        );
        self
    }

    pub fn relation(mut self, name: impl Into<String>, relation: Relation) -> Self {
        self.fields.insert(name.into(), FieldKind::Relation(relation));
        self
    }

    /// Many-to-one / one-to-one: `local_key` lives on this table.
    pub fn to_one(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        local_key: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relation(
            name,
            Relation {
                target: target.into(),
                cardinality: Cardinality::ToOne,
                local_key: local_key.into(),
                foreign_key: foreign_key.into(),
                via: None,
            },
        )
    }

    /// One-to-many: `foreign_key` lives on the target table.
    pub fn to_many(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        local_key: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relation(
            name,
            Relation {
                target: target.into(),
                cardinality: Cardinality::ToMany,
                local_key: local_key.into(),
                foreign_key: foreign_key.into(),
                via: None,
            },
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self, name: &str) -> Option<SchemaField<'_>> {
        self.fields
            .get_key_value(name)
            .map(|(name, kind)| SchemaField { name, kind })
    }

    pub fn fields(&self) -> impl Iterator<Item = SchemaField<'_>> {
        self.fields
            .iter()
            .map(|(name, kind)| SchemaField { name, kind })
    }
}

/// One relation traversal of a resolved path.
#[derive(Clone, Copy, Debug)]
pub struct Hop<'a> {
    pub field: SchemaField<'a>,
    pub relation: &'a Relation,
    pub target: &'a Schema,
}

/// Result of resolving a dotted path: the traversals plus the leaf field.
#[derive(Clone, Debug)]
pub struct ResolvedPath<'a> {
    pub hops: Vec<Hop<'a>>,
    pub leaf: SchemaField<'a>,
    pub value_type: ValueType,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRegistry {
    #[serde(default)]
    entities: BTreeMap<String, Schema>,
}

/// All entity schemas of a model, keyed by entity name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRegistry")]
pub struct SchemaRegistry {
    entities: BTreeMap<String, Schema>,
}

impl TryFrom<RawRegistry> for SchemaRegistry {
    type Error = Error;

    fn try_from(raw: RawRegistry) -> Result<Self> {
        let mut registry = SchemaRegistry::new();
        for (name, mut schema) in raw.entities {
            schema.name = name;
            registry = registry.with(schema);
        }
        registry.validate()?;
        Ok(registry)
    }
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, schema: Schema) -> Self {
        self.entities.insert(schema.name.clone(), schema);
        self
    }

    pub fn schema(&self, entity: &str) -> Result<&Schema> {
        self.entities
            .get(entity)
            .ok_or_else(|| Error::SchemaResolution {
                path: entity.to_string(),
                reason: "unknown entity".to_string(),
            })
    }

    pub fn entities(&self) -> impl Iterator<Item = &Schema> {
        self.entities.values()
    }

    /// Checks that every relation target exists and every key is named.
    pub fn validate(&self) -> Result<()> {
        for schema in self.entities.values() {
            if schema.table.trim().is_empty() || schema.primary_key.trim().is_empty() {
                return Err(Error::SchemaResolution {
                    path: schema.name.clone(),
                    reason: "table and primary key must be set".to_string(),
                });
            }
            for field in schema.fields() {
                let Some(relation) = field.relation() else {
                    continue;
                };
                let path = format!("{}.{}", schema.name, field.name);
                if !self.entities.contains_key(&relation.target) {
                    return Err(Error::SchemaResolution {
                        path,
                        reason: format!("relation targets unknown entity `{}`", relation.target),
                    });
                }
                let via_ok = relation.via.as_ref().map_or(true, |v| {
                    !v.table.is_empty() && !v.source_key.is_empty() && !v.target_key.is_empty()
                });
                if relation.local_key.is_empty() || relation.foreign_key.is_empty() || !via_ok {
                    return Err(Error::SchemaResolution {
                        path,
                        reason: "relation keys must not be empty".to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Follows a relation field to the schema of its target (the element
    /// schema for to-many relations). Non-relations are rejected.
    pub fn related<'a>(&'a self, owner: &Schema, field: &SchemaField<'a>) -> Result<&'a Schema> {
        let relation = field.relation().ok_or_else(|| Error::SchemaResolution {
            path: format!("{}.{}", owner.name, field.name),
            reason: "not a relation".to_string(),
        })?;
        self.schema(&relation.target)
    }

    /// Resolves `segments` against `root`: every segment but the last must be
    /// a relation, the last must be a scalar.
    pub fn resolve_path<'a>(
        &'a self,
        root: &'a Schema,
        segments: &[String],
    ) -> Result<ResolvedPath<'a>> {
        let full = segments.join(".");
        let (leaf_name, traversals) = segments.split_last().ok_or_else(|| Error::SchemaResolution {
            path: full.clone(),
            reason: "empty field path".to_string(),
        })?;

        let mut current = root;
        let mut hops = Vec::with_capacity(traversals.len());
        for segment in traversals {
            let field = lookup(current, segment, &full)?;
            let relation = field.relation().ok_or_else(|| Error::SchemaResolution {
                path: full.clone(),
                reason: format!("`{segment}` is not a relation of `{}`", current.name),
            })?;
            let target = self.schema(&relation.target)?;
            hops.push(Hop {
                field,
                relation,
                target,
            });
            current = target;
        }

        let leaf = lookup(current, leaf_name, &full)?;
        let value_type = leaf.value_type().ok_or_else(|| Error::SchemaResolution {
            path: full.clone(),
            reason: format!("`{leaf_name}` is a relation, not a comparable field"),
        })?;

        Ok(ResolvedPath {
            hops,
            leaf,
            value_type,
        })
    }
}

fn lookup<'a>(schema: &'a Schema, name: &str, full: &str) -> Result<SchemaField<'a>> {
    schema.field(name).ok_or_else(|| Error::SchemaResolution {
        path: full.to_string(),
        reason: format!("unknown field `{name}` on `{}`", schema.name),
    })
}
