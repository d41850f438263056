//! Paginated search over a storage port.
//!
//! [`QueryPlanner`] turns a request into a predicate plus fetch graph;
//! [`FilterSearch`] hands the plan to a [`SearchRepository`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::access::{AccessRules, Permission, SecurityContext};
use crate::compiler::{FilterCompiler, PredicateBuilder};
use crate::error::{Result, SearchError};
use crate::filter::FilterExpression;
use crate::graph::FetchGraph;
use crate::mapper::{QueryParams, UrlMapper};
use crate::page::{LimitCfg, Page, PageRequest};
use crate::schema::{Schema, SchemaRegistry};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchSettings {
    /// Naming convention used when the caller does not pick one.
    pub mapper: UrlMapper,
    pub default_page_size: u64,
    pub max_page_size: u64,
    pub strict_booleans: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            mapper: UrlMapper::V1,
            default_page_size: 20,
            max_page_size: 1000,
            strict_booleans: false,
        }
    }
}

impl SearchSettings {
    pub fn limit_cfg(&self) -> LimitCfg {
        LimitCfg {
            default: self.default_page_size,
            max: self.max_page_size,
        }
    }
}

/// Who is asking, and under which permission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessScope {
    pub permission: Permission,
    pub security: SecurityContext,
}

impl AccessScope {
    pub fn new(permission: Permission, security: SecurityContext) -> Self {
        Self {
            permission,
            security,
        }
    }
}

/// Compiled form of one search request.
#[derive(Debug)]
pub struct SearchPlan<P> {
    /// Access conjunct first, then the caller's filters. `None` when both
    /// are empty.
    pub predicate: Option<P>,
    pub graph: FetchGraph,
}

/// Storage side of a search.
#[async_trait]
pub trait SearchRepository: Send + Sync {
    type Builder: PredicateBuilder + Send;
    type Item: Send;

    fn predicate_builder(&self) -> Self::Builder;

    async fn find_page(
        &self,
        root: &Schema,
        predicate: Option<<Self::Builder as PredicateBuilder>::Predicate>,
        graph: &FetchGraph,
        page: PageRequest,
    ) -> anyhow::Result<Page<Self::Item>>;
}

#[derive(Clone, Debug)]
pub struct QueryPlanner {
    registry: Arc<SchemaRegistry>,
    rules: AccessRules,
    settings: SearchSettings,
}

impl QueryPlanner {
    pub fn new(registry: Arc<SchemaRegistry>, settings: SearchSettings) -> Self {
        Self {
            registry,
            rules: AccessRules::default(),
            settings,
        }
    }

    pub fn with_rules(mut self, rules: AccessRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    pub fn plan<B: PredicateBuilder>(
        &self,
        entity: &str,
        params: &QueryParams,
        mapper: UrlMapper,
        access: &AccessScope,
        builder: &mut B,
    ) -> Result<SearchPlan<B::Predicate>> {
        let root = self.registry.schema(entity)?;
        let compiler = FilterCompiler::new(&self.registry, root)
            .with_mapper(mapper)
            .with_strict_booleans(self.settings.strict_booleans);

        let forced: Vec<FilterExpression> = self
            .rules
            .resolve(&access.permission, &access.security)?
            .iter()
            .map(|f| f.to_expression())
            .collect();
        let access_predicate = compiler.compile_expressions(&forced, builder)?;
        let caller_predicate = compiler.compile(params, builder)?;

        let predicate = match (access_predicate, caller_predicate) {
            (Some(forced), Some(caller)) => Some(builder.and(forced, caller)),
            (forced, caller) => forced.or(caller),
        };
        let graph = FetchGraph::from_params(params, root, &self.registry)?;

        Ok(SearchPlan { predicate, graph })
    }
}

/// Search entry point: planner plus storage.
pub struct FilterSearch<R> {
    repo: R,
    planner: QueryPlanner,
}

impl<R: SearchRepository> FilterSearch<R> {
    pub fn new(repo: R, planner: QueryPlanner) -> Self {
        Self { repo, planner }
    }

    pub fn planner(&self) -> &QueryPlanner {
        &self.planner
    }

    /// Mapper and window taken from settings and the `page`/`size`
    /// parameters.
    pub async fn search(
        &self,
        entity: &str,
        params: &QueryParams,
        access: &AccessScope,
    ) -> std::result::Result<Page<R::Item>, SearchError> {
        let settings = self.planner.settings();
        let page = PageRequest::from_params(params, settings.limit_cfg())?;
        self.search_by_filter(entity, params, page, settings.mapper, access)
            .await
    }

    pub async fn search_by_filter(
        &self,
        entity: &str,
        params: &QueryParams,
        page: PageRequest,
        mapper: UrlMapper,
        access: &AccessScope,
    ) -> std::result::Result<Page<R::Item>, SearchError> {
        let mut builder = self.repo.predicate_builder();
        let plan = match self.planner.plan(entity, params, mapper, access, &mut builder) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(entity, error = %e, "rejected search request");
                return Err(e.into());
            }
        };

        let root = self.planner.registry().schema(entity)?;
        info!(
            entity,
            filtered = plan.predicate.is_some(),
            graph = %plan.graph,
            offset = page.offset,
            limit = page.limit,
            "executing search"
        );
        self.repo
            .find_page(root, plan.predicate, &plan.graph, page)
            .await
            .map_err(SearchError::Storage)
    }
}
