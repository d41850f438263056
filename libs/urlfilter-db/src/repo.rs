use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use sea_orm::{ConnectionTrait, FromQueryResult, JsonValue};
use tracing::debug;
use urlfilter_core::{
    FetchGraph, Page, PageInfo, PageRequest, Schema, SchemaRegistry, SearchRepository,
};

use crate::builder::{SqlBuilder, SqlPredicate};
use crate::loader::EagerLoader;
use crate::query::{build_count, build_select};

#[derive(Debug, FromQueryResult)]
struct TotalRow {
    total: i64,
}

/// Schema-driven search over any SeaORM connection. Rows come back as JSON
/// objects keyed by column, with eager-loaded relations nested under the
/// relation name.
pub struct SeaOrmSearchRepository<C> {
    conn: C,
    registry: Arc<SchemaRegistry>,
}

impl<C: ConnectionTrait> SeaOrmSearchRepository<C> {
    pub fn new(conn: C, registry: Arc<SchemaRegistry>) -> Self {
        Self { conn, registry }
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn into_inner(self) -> C {
        self.conn
    }
}

#[async_trait]
impl<C: ConnectionTrait + Send> SearchRepository for SeaOrmSearchRepository<C> {
    type Builder = SqlBuilder;
    type Item = JsonValue;

    fn predicate_builder(&self) -> SqlBuilder {
        SqlBuilder::new()
    }

    async fn find_page(
        &self,
        root: &Schema,
        predicate: Option<SqlPredicate>,
        graph: &FetchGraph,
        page: PageRequest,
    ) -> anyhow::Result<Page<JsonValue>> {
        let backend = self.conn.get_database_backend();

        let count = backend.build(&build_count(root, predicate.as_ref()));
        let total = TotalRow::find_by_statement(count)
            .one(&self.conn)
            .await
            .with_context(|| format!("counting `{}`", root.name()))?
            .map_or(0, |row| row.total);

        let select = backend.build(&build_select(root, predicate.as_ref(), page));
        debug!(entity = root.name(), sql = %select, "page query");
        let mut rows = JsonValue::find_by_statement(select)
            .all(&self.conn)
            .await
            .with_context(|| format!("selecting `{}`", root.name()))?;

        EagerLoader::new(&self.conn, &self.registry)
            .load(root, &mut rows, graph)
            .await?;

        Ok(Page::new(
            rows,
            PageInfo {
                offset: page.offset,
                limit: page.limit,
                total: u64::try_from(total).unwrap_or_default(),
            },
        ))
    }
}
