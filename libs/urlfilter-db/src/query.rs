//! SELECT / COUNT statements for one page of root rows.

use sea_orm::sea_query::{Alias, Asterisk, Expr, JoinType, Order, Query, SelectStatement};
use urlfilter_core::{PageRequest, Schema};

use crate::builder::{root_alias, SqlPredicate};

pub const TOTAL_COLUMN: &str = "total";

fn apply_predicate(q: &mut SelectStatement, predicate: Option<&SqlPredicate>) {
    let Some(predicate) = predicate else {
        return;
    };
    for join in &predicate.joins {
        q.join_as(
            JoinType::InnerJoin,
            Alias::new(&join.table),
            Alias::new(&join.alias),
            join.on(),
        );
    }
    q.cond_where(predicate.condition.clone());
}

fn has_joins(predicate: Option<&SqlPredicate>) -> bool {
    predicate.is_some_and(|p| !p.joins.is_empty())
}

/// `SELECT [DISTINCT] root.* … ORDER BY root.pk LIMIT … OFFSET …`
///
/// To-many joins can repeat a root row, hence DISTINCT whenever the
/// predicate joins anything.
pub fn build_select(
    root: &Schema,
    predicate: Option<&SqlPredicate>,
    page: PageRequest,
) -> SelectStatement {
    let alias = Alias::new(root_alias(root));
    let mut q = Query::select();
    q.column((alias.clone(), Asterisk)).from(Alias::new(&root.table));
    if has_joins(predicate) {
        q.distinct();
    }
    apply_predicate(&mut q, predicate);
    q.order_by((alias, Alias::new(&root.primary_key)), Order::Asc)
        .limit(page.limit)
        .offset(page.offset);
    q
}

/// `SELECT COUNT(DISTINCT root.pk) AS total …`
pub fn build_count(root: &Schema, predicate: Option<&SqlPredicate>) -> SelectStatement {
    let alias = Alias::new(root_alias(root));
    let mut q = Query::select();
    q.expr_as(
        Expr::col((alias, Alias::new(&root.primary_key))).count_distinct(),
        Alias::new(TOTAL_COLUMN),
    )
    .from(Alias::new(&root.table));
    apply_predicate(&mut q, predicate);
    q
}

#[cfg(test)]
mod tests {
    use sea_orm::sea_query::SqliteQueryBuilder;
    use urlfilter_core::{FilterCompiler, QueryParams, SchemaRegistry, ValueType};

    use super::*;
    use crate::builder::SqlBuilder;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new()
            .with(
                Schema::new("orders", "orders")
                    .with_primary_key("order_id")
                    .scalar("status", ValueType::String)
                    .to_one("user", "users", "user_id", "id"),
            )
            .with(
                Schema::new("users", "users")
                    .scalar("id", ValueType::Long)
                    .scalar("name", ValueType::String),
            )
    }

    fn predicate(reg: &SchemaRegistry, pairs: &[(&str, &str)]) -> Option<SqlPredicate> {
        let root = reg.schema("orders").unwrap();
        let params: QueryParams = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        FilterCompiler::new(reg, root)
            .compile(&params, &mut SqlBuilder::new())
            .unwrap()
    }

    #[test]
    fn unfiltered_select_is_plain() {
        let reg = registry();
        let root = reg.schema("orders").unwrap();
        let sql = build_select(root, None, PageRequest::new(40, 20)).to_string(SqliteQueryBuilder);
        assert_eq!(
            sql,
            r#"SELECT "orders".* FROM "orders" ORDER BY "orders"."order_id" ASC LIMIT 20 OFFSET 40"#
        );
    }

    #[test]
    fn joined_select_is_distinct() {
        let reg = registry();
        let root = reg.schema("orders").unwrap();
        let pred = predicate(&reg, &[("f_user.name", "Al"), ("f_user.name_op", "like")]);
        let page = PageRequest::new(0, 10);
        let sql = build_select(root, pred.as_ref(), page).to_string(SqliteQueryBuilder);
        assert!(sql.starts_with(r#"SELECT DISTINCT "orders".*"#), "{sql}");
        assert!(
            sql.contains(
                r#"INNER JOIN "users" AS "j1_user" ON "orders"."user_id" = "j1_user"."id""#
            ),
            "{sql}"
        );
        assert!(sql.contains(r#""j1_user"."name" LIKE '%Al%'"#), "{sql}");
    }

    #[test]
    fn filter_without_join_is_not_distinct() {
        let reg = registry();
        let root = reg.schema("orders").unwrap();
        let pred = predicate(&reg, &[("f_status", "open")]);
        let page = PageRequest::new(0, 10);
        let sql = build_select(root, pred.as_ref(), page).to_string(SqliteQueryBuilder);
        assert!(!sql.contains("DISTINCT"), "{sql}");
        assert!(sql.contains(r#"WHERE "orders"."status" = 'open'"#), "{sql}");
    }

    #[test]
    fn count_uses_distinct_primary_key() {
        let reg = registry();
        let root = reg.schema("orders").unwrap();
        let pred = predicate(&reg, &[("f_user.id", "7")]);
        let sql = build_count(root, pred.as_ref()).to_string(SqliteQueryBuilder);
        assert!(
            sql.starts_with(
                r#"SELECT COUNT(DISTINCT "orders"."order_id") AS "total" FROM "orders""#
            ),
            "{sql}"
        );
        assert!(sql.contains(r#""j1_user"."id" = 7"#), "{sql}");
        assert!(!sql.contains("LIMIT"), "{sql}");
    }
}
