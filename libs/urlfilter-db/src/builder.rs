//! Filter predicates → `sea_query::Condition` plus the joins they need.

use sea_orm::sea_query::{Alias, Condition, Expr, SimpleExpr};
use urlfilter_core::{Hop, PredicateBuilder, Schema, SchemaField, Value};

/// Separator between relation names in a join alias.
const ALIAS_SEP: &str = "__";

/// `INNER JOIN <table> AS <alias> ON <left_alias>.<left_column> = <alias>.<right_column>`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinSpec {
    pub table: String,
    pub alias: String,
    pub left_alias: String,
    pub left_column: String,
    pub right_column: String,
}

impl JoinSpec {
    pub fn on(&self) -> SimpleExpr {
        Expr::col((Alias::new(&self.left_alias), Alias::new(&self.left_column)))
            .equals((Alias::new(&self.alias), Alias::new(&self.right_column)))
    }
}

/// Entity (or, once a column is set, attribute) reached from the root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SqlPath {
    /// Ordinal of the filter entry this path was started for.
    entry: usize,
    alias: String,
    /// Dotted relation chain, empty at the root.
    relations: String,
    column: Option<String>,
    joins: Vec<JoinSpec>,
}

impl SqlPath {
    pub fn alias(&self) -> &str {
        &self.alias
    }

    fn expr(&self) -> Expr {
        let column = self.column.as_deref().unwrap_or("*");
        Expr::col((Alias::new(&self.alias), Alias::new(column)))
    }
}

/// A condition together with every join it refers to.
#[derive(Clone, Debug)]
pub struct SqlPredicate {
    pub condition: Condition,
    pub joins: Vec<JoinSpec>,
}

impl SqlPredicate {
    fn leaf(path: SqlPath, expr: SimpleExpr) -> Self {
        Self {
            condition: Condition::all().add(expr),
            joins: path.joins,
        }
    }
}

/// Alias the root table is selected under.
pub fn root_alias(root: &Schema) -> &str {
    &root.table
}

fn push_join(joins: &mut Vec<JoinSpec>, join: JoinSpec) {
    if !joins.iter().any(|j| j.alias == join.alias) {
        joins.push(join);
    }
}

/// Every [`root`](PredicateBuilder::root) call opens a new filter entry with
/// its own join aliases, so two filters under the same to-many relation may
/// match different child rows. Joins are shared only inside one entry.
#[derive(Clone, Debug, Default)]
pub struct SqlBuilder {
    entries: usize,
}

impl SqlBuilder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PredicateBuilder for SqlBuilder {
    type Path = SqlPath;
    type Predicate = SqlPredicate;

    fn root(&mut self, schema: &Schema) -> SqlPath {
        self.entries += 1;
        SqlPath {
            entry: self.entries,
            alias: root_alias(schema).to_string(),
            relations: String::new(),
            column: None,
            joins: Vec::new(),
        }
    }

    fn join(&mut self, from: &SqlPath, hop: &Hop<'_>) -> SqlPath {
        let relations = if from.relations.is_empty() {
            hop.field.name.to_string()
        } else {
            format!("{}{ALIAS_SEP}{}", from.relations, hop.field.name)
        };
        let alias = format!("j{}_{relations}", from.entry);
        let rel = hop.relation;

        let mut joins = from.joins.clone();
        match &rel.via {
            Some(via) => {
                let link_alias = format!("{alias}{ALIAS_SEP}via");
                push_join(
                    &mut joins,
                    JoinSpec {
                        table: via.table.clone(),
                        alias: link_alias.clone(),
                        left_alias: from.alias.clone(),
                        left_column: rel.local_key.clone(),
                        right_column: via.source_key.clone(),
                    },
                );
                push_join(
                    &mut joins,
                    JoinSpec {
                        table: hop.target.table.clone(),
                        alias: alias.clone(),
                        left_alias: link_alias,
                        left_column: via.target_key.clone(),
                        right_column: rel.foreign_key.clone(),
                    },
                );
            }
            None => push_join(
                &mut joins,
                JoinSpec {
                    table: hop.target.table.clone(),
                    alias: alias.clone(),
                    left_alias: from.alias.clone(),
                    left_column: rel.local_key.clone(),
                    right_column: rel.foreign_key.clone(),
                },
            ),
        }

        SqlPath {
            entry: from.entry,
            alias,
            relations,
            column: None,
            joins,
        }
    }

    fn get(&mut self, from: &SqlPath, field: &SchemaField<'_>) -> SqlPath {
        SqlPath {
            column: field.column().map(str::to_string),
            ..from.clone()
        }
    }

    fn equal(&mut self, path: SqlPath, value: Value) -> SqlPredicate {
        let expr = path.expr().eq(sea_value(value));
        SqlPredicate::leaf(path, expr)
    }

    fn like(&mut self, path: SqlPath, pattern: String) -> SqlPredicate {
        let expr = path.expr().like(pattern);
        SqlPredicate::leaf(path, expr)
    }

    fn is_in(&mut self, path: SqlPath, values: Vec<Value>) -> SqlPredicate {
        let expr = path.expr().is_in(values.into_iter().map(sea_value));
        SqlPredicate::leaf(path, expr)
    }

    fn between(&mut self, path: SqlPath, lower: i64, upper: i64) -> SqlPredicate {
        let expr = path.expr().between(lower, upper);
        SqlPredicate::leaf(path, expr)
    }

    fn and(&mut self, left: SqlPredicate, right: SqlPredicate) -> SqlPredicate {
        let mut joins = left.joins;
        for join in right.joins {
            push_join(&mut joins, join);
        }
        SqlPredicate {
            condition: Condition::all().add(left.condition).add(right.condition),
            joins,
        }
    }
}

pub fn sea_value(value: Value) -> sea_orm::Value {
    match value {
        Value::Long(v) => v.into(),
        Value::Boolean(v) => v.into(),
        Value::String(v) => v.into(),
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::sea_query::{Query, SqliteQueryBuilder};
    use urlfilter_core::{
        Cardinality, FilterCompiler, JoinTable, QueryParams, Relation, SchemaRegistry, ValueType,
    };

    use super::*;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new()
            .with(
                Schema::new("users", "users")
                    .scalar("id", ValueType::Long)
                    .scalar_column("name", "full_name", ValueType::String)
                    .to_many("orders", "orders", "id", "user_id")
                    .relation(
                        "roles",
                        Relation {
                            target: "roles".into(),
                            cardinality: Cardinality::ToMany,
                            local_key: "id".into(),
                            foreign_key: "id".into(),
                            via: Some(JoinTable {
                                table: "user_roles".into(),
                                source_key: "user_id".into(),
                                target_key: "role_id".into(),
                            }),
                        },
                    ),
            )
            .with(
                Schema::new("orders", "orders")
                    .scalar("id", ValueType::Long)
                    .scalar("total", ValueType::Long)
                    .to_one("user", "users", "user_id", "id"),
            )
            .with(
                Schema::new("roles", "roles")
                    .scalar("id", ValueType::Long)
                    .scalar("code", ValueType::String),
            )
    }

    fn where_sql(entity: &str, pairs: &[(&str, &str)]) -> (String, Vec<JoinSpec>) {
        let reg = registry();
        let root = reg.schema(entity).unwrap();
        let params: QueryParams = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let pred = FilterCompiler::new(&reg, root)
            .compile(&params, &mut SqlBuilder::new())
            .unwrap()
            .unwrap();
        let sql = Query::select()
            .expr(Expr::val(1))
            .cond_where(pred.condition)
            .to_string(SqliteQueryBuilder);
        (sql, pred.joins)
    }

    #[test]
    fn renders_scalar_operators() {
        let (sql, joins) = where_sql(
            "orders",
            &[("f_total", "10,20"), ("f_total_op", "between"), ("f_id", "3,1"), ("f_id_op", "in")],
        );
        assert!(joins.is_empty());
        assert!(sql.contains(r#""orders"."id" IN (3, 1)"#), "{sql}");
        assert!(sql.contains(r#""orders"."total" BETWEEN 10 AND 20"#), "{sql}");
        assert!(sql.contains(" AND "), "{sql}");
    }

    #[test]
    fn uses_declared_column_and_like_pattern() {
        let (sql, _) = where_sql("users", &[("f_name", "Al"), ("f_name_op", "like")]);
        assert!(sql.contains(r#""users"."full_name" LIKE '%Al%'"#), "{sql}");
    }

    #[test]
    fn to_one_traversal_adds_one_join() {
        let (sql, joins) = where_sql("orders", &[("f_user.name", "Bob")]);
        assert_eq!(joins.len(), 1);
        assert_eq!(joins[0].alias, "j1_user");
        assert_eq!(joins[0].left_column, "user_id");
        assert_eq!(joins[0].right_column, "id");
        assert!(sql.contains(r#""j1_user"."full_name" = 'Bob'"#), "{sql}");
    }

    #[test]
    fn nested_path_chains_joins_within_one_entry() {
        let (sql, joins) = where_sql("orders", &[("f_user.orders.total", "5")]);
        let aliases: Vec<_> = joins.iter().map(|j| j.alias.as_str()).collect();
        assert_eq!(aliases, vec!["j1_user", "j1_user__orders"]);
        assert_eq!(joins[1].left_alias, "j1_user");
        assert!(sql.contains(r#""j1_user__orders"."total" = 5"#), "{sql}");
    }

    #[test]
    fn each_filter_entry_joins_independently() {
        let (sql, joins) = where_sql("users", &[("f_orders.total", "25"), ("f_orders.id", "11")]);
        let aliases: Vec<_> = joins.iter().map(|j| j.alias.as_str()).collect();
        assert_eq!(aliases, vec!["j1_orders", "j2_orders"]);
        assert!(joins.iter().all(|j| j.left_alias == "users"));
        assert!(sql.contains(r#""j1_orders"."id" = 11"#), "{sql}");
        assert!(sql.contains(r#""j2_orders"."total" = 25"#), "{sql}");
    }

    #[test]
    fn many_to_many_goes_through_link_table() {
        let (sql, joins) = where_sql("users", &[("f_roles.code", "admin")]);
        assert_eq!(joins.len(), 2);
        assert_eq!(joins[0].table, "user_roles");
        assert_eq!(joins[0].alias, "j1_roles__via");
        assert_eq!(joins[1].left_alias, "j1_roles__via");
        assert_eq!(joins[1].left_column, "role_id");
        assert!(sql.contains(r#""j1_roles"."code" = 'admin'"#), "{sql}");
    }
}
