//! Compiles URL query parameters into storage predicates and eager-load
//! graphs over a reflected entity schema.
//!
//! ```text
//! params ──► UrlMapper ──► FilterCompiler ──► PredicateBuilder::Predicate
//!                               │ (SchemaRegistry)
//!        ──► FetchGraph::from_params ──► FetchGraph
//! Permission ──► AccessRules ──► AccessFilter (forced conjunct)
//! ```

pub mod access;
pub mod ast;
pub mod compiler;
pub mod error;
pub mod filter;
pub mod graph;
pub mod mapper;
pub mod page;
pub mod problem;
pub mod schema;
pub mod search;

pub use access::{AccessFilter, AccessRule, AccessRules, Permission, Principal, SecurityContext};
pub use ast::{DescribeBuilder, Expr, FieldRef};
pub use compiler::{compile_filter, FilterCompiler, PredicateBuilder};
pub use error::{Error, Result, SearchError};
pub use filter::{FilterExpression, Operator, Value};
pub use graph::{EmbeddedPath, FetchGraph, EMBEDDED_PARAM};
pub use mapper::{QueryParams, UrlMapper};
pub use page::{clamp_limit, LimitCfg, Page, PageInfo, PageRequest};
pub use problem::{ErrDef, Problem, APPLICATION_PROBLEM_JSON};
pub use schema::{
    Cardinality, FieldKind, Hop, JoinTable, Relation, ResolvedPath, Schema, SchemaField,
    SchemaRegistry, ValueType,
};
pub use search::{
    AccessScope, FilterSearch, QueryPlanner, SearchPlan, SearchRepository, SearchSettings,
};
