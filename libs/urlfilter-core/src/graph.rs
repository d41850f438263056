//! Eager-load graphs built from the `embedded` parameter.
//!
//! `embedded=orders.items,user` names the relations to load together with the
//! root rows. Each dotted entry is folded into the nested text form
//! `orders(items)`, parsed against the schema and merged into one
//! [`FetchGraph`], so shared prefixes are loaded once.

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::error::{Error, Result};
use crate::mapper::QueryParams;
use crate::schema::{Schema, SchemaRegistry};

pub const EMBEDDED_PARAM: &str = "embedded";

/// Ordered chain of relation names, outermost first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmbeddedPath(Vec<String>);

impl EmbeddedPath {
    /// `None` for blank entries.
    pub fn parse(entry: &str) -> Option<Self> {
        let entry = entry.trim();
        if entry.is_empty() {
            return None;
        }
        Some(Self(entry.split('.').map(|s| s.trim().to_string()).collect()))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Folds `a.b.c` into `a(b(c))`.
    pub fn to_graph_text(&self) -> String {
        self.0
            .iter()
            .rev()
            .fold(String::new(), |inner, outer| {
                if inner.is_empty() {
                    outer.clone()
                } else {
                    format!("{outer}({inner})")
                }
            })
    }
}

/// Relations to eager-load, as a tree keyed by relation name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchGraph {
    nodes: BTreeMap<String, FetchGraph>,
}

impl FetchGraph {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn get(&self, relation: &str) -> Option<&FetchGraph> {
        self.nodes.get(relation)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&str, &FetchGraph)> {
        self.nodes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Reads [`EMBEDDED_PARAM`] from the request. Missing or blank means no
    /// eager loading.
    pub fn from_params(
        params: &QueryParams,
        root: &Schema,
        registry: &SchemaRegistry,
    ) -> Result<Self> {
        let Some(raw) = params.get(EMBEDDED_PARAM) else {
            return Ok(Self::empty());
        };
        Self::from_embedded(raw, root, registry)
    }

    pub fn from_embedded(raw: &str, root: &Schema, registry: &SchemaRegistry) -> Result<Self> {
        let paths: Vec<EmbeddedPath> = raw.split(',').filter_map(EmbeddedPath::parse).collect();
        debug!(entity = root.name(), embedded = raw, paths = paths.len(), "compiling fetch graph");

        let mut graph = Self::empty();
        for path in &paths {
            let sub = Self::parse(&path.to_graph_text(), root, registry)?;
            graph.merge(sub);
        }
        Ok(graph)
    }

    /// Parses `name`, `name(child, child…)` lists, checking every node is a
    /// relation of the entity reached so far.
    pub fn parse(text: &str, root: &Schema, registry: &SchemaRegistry) -> Result<Self> {
        let mut parser = Parser {
            text,
            pos: 0,
            registry,
        };
        let graph = parser.list(root)?;
        parser.skip_ws();
        if parser.pos < text.len() {
            return Err(parser.error(format!("unexpected `{}`", &text[parser.pos..])));
        }
        Ok(graph)
    }

    /// Unions `other` into `self`, coalescing shared prefixes.
    pub fn merge(&mut self, other: FetchGraph) {
        for (name, child) in other.nodes {
            self.nodes.entry(name).or_default().merge(child);
        }
    }
}

impl fmt::Display for FetchGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, child)) in self.nodes.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(name)?;
            if !child.is_empty() {
                write!(f, "({child})")?;
            }
        }
        Ok(())
    }
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
    registry: &'a SchemaRegistry,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: impl Into<String>) -> Error {
        Error::GraphResolution {
            graph: self.text.to_string(),
            reason: reason.into(),
        }
    }

    fn skip_ws(&mut self) {
        let rest = &self.text[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Result<&'a str> {
        self.skip_ws();
        let rest = &self.text[self.pos..];
        let len = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.error(format!("expected a relation name at offset {}", self.pos)));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    fn list(&mut self, owner: &Schema) -> Result<FetchGraph> {
        let mut graph = FetchGraph::empty();
        loop {
            let name = self.ident()?;
            let field = owner
                .field(name)
                .ok_or_else(|| {
                    self.error(format!("unknown relation `{name}` on `{}`", owner.name()))
                })?;
            if field.relation().is_none() {
                return Err(self.error(format!("`{name}` on `{}` is not a relation", owner.name())));
            }
            let target = self
                .registry
                .related(owner, &field)
                .map_err(|e| self.error(e.to_string()))?;

            let child = if self.eat('(') {
                let child = self.list(target)?;
                if !self.eat(')') {
                    return Err(self.error("missing `)`"));
                }
                child
            } else {
                FetchGraph::empty()
            };
            graph.nodes.entry(name.to_string()).or_default().merge(child);

            if !self.eat(',') {
                return Ok(graph);
            }
        }
    }
}
