//! Storage-independent predicate tree.
//!
//! [`DescribeBuilder`] compiles filters into [`Expr`] values instead of a
//! database query. It backs `explain` output and lets the compiler be
//! exercised without a database.

use std::fmt;

use crate::compiler::PredicateBuilder;
use crate::filter::Value;
use crate::schema::{Hop, Schema, SchemaField};

/// Path from the root entity to an attribute: the relations traversed, then
/// the attribute itself once selected.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldRef {
    pub joins: Vec<String>,
    pub field: Option<String>,
}

impl FieldRef {
    pub fn new(path: &str) -> Self {
        let mut joins: Vec<String> = path.split('.').map(str::to_string).collect();
        let field = joins.pop();
        Self { joins, field }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = self.joins.iter().map(String::as_str).chain(self.field.as_deref());
        if let Some(first) = parts.next() {
            f.write_str(first)?;
        }
        for part in parts {
            write!(f, ".{part}")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    Eq(FieldRef, Value),
    Like(FieldRef, String),
    In(FieldRef, Vec<Value>),
    Between(FieldRef, i64, i64),
    And(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Flattens nested `And` nodes into their leaves, left to right.
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Expr::And(l, r) => {
                let mut out = l.conjuncts();
                out.extend(r.conjuncts());
                out
            }
            leaf => vec![leaf],
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Eq(p, v) => write!(f, "{p} = {v}"),
            Expr::Like(p, pattern) => write!(f, "{p} like '{pattern}'"),
            Expr::In(p, values) => {
                write!(f, "{p} in (")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str(")")
            }
            Expr::Between(p, lo, hi) => write!(f, "{p} between {lo} and {hi}"),
            Expr::And(l, r) => write!(f, "({l}) and ({r})"),
        }
    }
}

/// Predicate builder producing [`Expr`] trees.
#[derive(Debug, Default)]
pub struct DescribeBuilder {
    traversals: usize,
}

impl DescribeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of relation traversals requested so far.
    pub fn traversals(&self) -> usize {
        self.traversals
    }
}

impl PredicateBuilder for DescribeBuilder {
    type Path = FieldRef;
    type Predicate = Expr;

    fn root(&mut self, _schema: &Schema) -> FieldRef {
        FieldRef::default()
    }

    fn join(&mut self, from: &FieldRef, hop: &Hop<'_>) -> FieldRef {
        self.traversals += 1;
        let mut joins = from.joins.clone();
        joins.push(hop.field.name.to_string());
        FieldRef { joins, field: None }
    }

    fn get(&mut self, from: &FieldRef, field: &SchemaField<'_>) -> FieldRef {
        FieldRef {
            joins: from.joins.clone(),
            field: Some(field.name.to_string()),
        }
    }

    fn equal(&mut self, path: FieldRef, value: Value) -> Expr {
        Expr::Eq(path, value)
    }

    fn like(&mut self, path: FieldRef, pattern: String) -> Expr {
        Expr::Like(path, pattern)
    }

    fn is_in(&mut self, path: FieldRef, values: Vec<Value>) -> Expr {
        Expr::In(path, values)
    }

    fn between(&mut self, path: FieldRef, lower: i64, upper: i64) -> Expr {
        Expr::Between(path, lower, upper)
    }

    fn and(&mut self, left: Expr, right: Expr) -> Expr {
        Expr::And(Box::new(left), Box::new(right))
    }
}
