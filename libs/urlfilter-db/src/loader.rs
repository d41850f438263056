//! Batched eager loading of a [`FetchGraph`] onto JSON rows.
//!
//! Every graph edge costs exactly one `IN (…)` query, whatever the number of
//! parent rows: children of all parents are fetched together, loaded one
//! level deeper, then distributed back to their owners.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use anyhow::Context;
use sea_orm::sea_query::{Alias, Asterisk, Expr, JoinType, Order, Query, SelectStatement};
use sea_orm::{ConnectionTrait, FromQueryResult, JsonValue};
use tracing::debug;
use urlfilter_core::{Cardinality, FetchGraph, Relation, Schema, SchemaRegistry};

/// Column carrying the owner key of rows fetched through a link table.
pub const OWNER_KEY: &str = "__owner_key";

type LoadFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

pub struct EagerLoader<'a, C> {
    conn: &'a C,
    registry: &'a SchemaRegistry,
}

impl<'a, C: ConnectionTrait> EagerLoader<'a, C> {
    pub fn new(conn: &'a C, registry: &'a SchemaRegistry) -> Self {
        Self { conn, registry }
    }

    /// Attaches every relation of `graph` to `rows` (rows of `owner`).
    pub fn load<'b>(
        &'b self,
        owner: &'b Schema,
        rows: &'b mut [JsonValue],
        graph: &'b FetchGraph,
    ) -> LoadFuture<'b>
    where
        'a: 'b,
    {
        Box::pin(async move {
            if rows.is_empty() {
                return Ok(());
            }
            for (name, child_graph) in graph.nodes() {
                let field = owner
                    .field(name)
                    .with_context(|| format!("`{name}` is not a field of `{}`", owner.name()))?;
                let relation = field
                    .relation()
                    .with_context(|| format!("`{name}` is not a relation of `{}`", owner.name()))?;
                let target = self.registry.schema(&relation.target)?;

                let keys = distinct_keys(rows, &relation.local_key);
                let mut children = if keys.is_empty() {
                    Vec::new()
                } else {
                    let stmt = child_select(target, relation, keys.into_values().collect());
                    let backend = self.conn.get_database_backend();
                    JsonValue::find_by_statement(backend.build(&stmt))
                        .all(self.conn)
                        .await
                        .with_context(|| format!("loading `{}.{name}`", owner.name()))?
                };
                debug!(
                    relation = %format!("{}.{name}", owner.name()),
                    rows = children.len(),
                    "eager-loaded relation"
                );

                let owner_column = if relation.via.is_some() {
                    OWNER_KEY
                } else {
                    relation.foreign_key.as_str()
                };
                let owners: Vec<Option<String>> = children
                    .iter_mut()
                    .map(|child| {
                        let key = child.get(owner_column).and_then(key_string);
                        if relation.via.is_some() {
                            if let Some(obj) = child.as_object_mut() {
                                obj.remove(OWNER_KEY);
                            }
                        }
                        key
                    })
                    .collect();

                self.load(target, &mut children, child_graph).await?;

                let mut grouped: HashMap<String, Vec<JsonValue>> = HashMap::new();
                for (key, child) in owners.into_iter().zip(children) {
                    if let Some(key) = key {
                        grouped.entry(key).or_default().push(child);
                    }
                }
                attach(rows, name, relation, &grouped);
            }
            Ok(())
        })
    }
}

fn attach(
    rows: &mut [JsonValue],
    name: &str,
    relation: &Relation,
    grouped: &HashMap<String, Vec<JsonValue>>,
) {
    for row in rows.iter_mut() {
        let matches = row
            .get(&relation.local_key)
            .and_then(key_string)
            .and_then(|k| grouped.get(&k));
        let value = match relation.cardinality {
            Cardinality::ToOne => matches
                .and_then(|m| m.first().cloned())
                .unwrap_or(JsonValue::Null),
            Cardinality::ToMany => JsonValue::Array(matches.cloned().unwrap_or_default()),
        };
        if let Some(obj) = row.as_object_mut() {
            obj.insert(name.to_string(), value);
        }
    }
}

/// Join keys are compared by their JSON text so `7` matches `7` whatever
/// integer width the driver reported.
fn key_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn key_value(value: &JsonValue) -> Option<sea_orm::Value> {
    match value {
        JsonValue::Number(n) => n.as_i64().map(Into::into).or_else(|| n.as_f64().map(Into::into)),
        JsonValue::String(s) => Some(s.clone().into()),
        JsonValue::Bool(b) => Some((*b).into()),
        _ => None,
    }
}

fn distinct_keys(rows: &[JsonValue], column: &str) -> HashMap<String, sea_orm::Value> {
    rows.iter()
        .filter_map(|row| row.get(column))
        .filter_map(|v| Some((key_string(v)?, key_value(v)?)))
        .collect()
}

fn child_select(
    target: &Schema,
    relation: &Relation,
    keys: Vec<sea_orm::Value>,
) -> SelectStatement {
    let t = Alias::new(&target.table);
    let mut q = Query::select();
    q.column((t.clone(), Asterisk)).from(t.clone());
    match &relation.via {
        Some(via) => {
            let link = Alias::new(&via.table);
            q.expr_as(
                Expr::col((link.clone(), Alias::new(&via.source_key))),
                Alias::new(OWNER_KEY),
            )
            .join(
                JoinType::InnerJoin,
                link.clone(),
                Expr::col((link.clone(), Alias::new(&via.target_key)))
                    .equals((t.clone(), Alias::new(&relation.foreign_key))),
            )
            .and_where(Expr::col((link, Alias::new(&via.source_key))).is_in(keys));
        }
        None => {
            q.and_where(Expr::col((t.clone(), Alias::new(&relation.foreign_key))).is_in(keys));
        }
    }
    q.order_by((t, Alias::new(&target.primary_key)), Order::Asc);
    q
}
