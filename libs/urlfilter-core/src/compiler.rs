//! Filter parameters → predicate compiler.
//!
//! The compiler walks each decomposed filter through the schema, coerces its
//! literals and asks a [`PredicateBuilder`] for the matching predicate shape.
//! Every per-field predicate is conjoined; there is no OR and no negation.

use tracing::debug;

use crate::error::{Error, Result};
use crate::filter::{FilterExpression, Operator, Value};
use crate::mapper::{QueryParams, UrlMapper};
use crate::schema::{Hop, Schema, SchemaField, SchemaRegistry, ValueType};

/// Query-criteria capability of the storage layer.
///
/// `Path` designates either an entity reached through joins or, after
/// [`get`](Self::get), one of its attributes.
pub trait PredicateBuilder {
    type Path: Clone;
    type Predicate: Send;

    fn root(&mut self, schema: &Schema) -> Self::Path;
    fn join(&mut self, from: &Self::Path, hop: &Hop<'_>) -> Self::Path;
    fn get(&mut self, from: &Self::Path, field: &SchemaField<'_>) -> Self::Path;

    fn equal(&mut self, path: Self::Path, value: Value) -> Self::Predicate;
    fn like(&mut self, path: Self::Path, pattern: String) -> Self::Predicate;
    fn is_in(&mut self, path: Self::Path, values: Vec<Value>) -> Self::Predicate;
    fn between(&mut self, path: Self::Path, lower: i64, upper: i64) -> Self::Predicate;
    fn and(&mut self, left: Self::Predicate, right: Self::Predicate) -> Self::Predicate;
}

/// Compiles filters against one root entity.
#[derive(Clone, Copy, Debug)]
pub struct FilterCompiler<'a> {
    registry: &'a SchemaRegistry,
    root: &'a Schema,
    mapper: UrlMapper,
    strict_booleans: bool,
}

impl<'a> FilterCompiler<'a> {
    pub fn new(registry: &'a SchemaRegistry, root: &'a Schema) -> Self {
        Self {
            registry,
            root,
            mapper: UrlMapper::default(),
            strict_booleans: false,
        }
    }

    pub fn with_mapper(mut self, mapper: UrlMapper) -> Self {
        self.mapper = mapper;
        self
    }

    /// Reject boolean literals other than `true`/`false` instead of reading
    /// them as `false`.
    pub fn with_strict_booleans(mut self, strict: bool) -> Self {
        self.strict_booleans = strict;
        self
    }

    /// Returns `None` when no parameter is a filter: callers apply no
    /// filtering at all in that case.
    pub fn compile<B: PredicateBuilder>(
        &self,
        params: &QueryParams,
        builder: &mut B,
    ) -> Result<Option<B::Predicate>> {
        let expressions = self.mapper.decompose(params);
        self.compile_expressions(&expressions, builder)
    }

    pub fn compile_expressions<B: PredicateBuilder>(
        &self,
        expressions: &[FilterExpression],
        builder: &mut B,
    ) -> Result<Option<B::Predicate>> {
        let mut acc: Option<B::Predicate> = None;
        for expr in expressions {
            let predicate = self.compile_expression(expr, builder)?;
            acc = Some(match acc {
                Some(left) => builder.and(left, predicate),
                None => predicate,
            });
        }
        Ok(acc)
    }

    pub fn compile_expression<B: PredicateBuilder>(
        &self,
        expr: &FilterExpression,
        builder: &mut B,
    ) -> Result<B::Predicate> {
        let resolved = self.registry.resolve_path(self.root, &expr.field_path)?;

        let mut path = builder.root(self.root);
        for hop in &resolved.hops {
            path = builder.join(&path, hop);
        }
        let path = builder.get(&path, &resolved.leaf);

        let field = expr.field();
        let value_type = resolved.value_type;
        debug!(
            field = %field,
            operator = %expr.operator,
            value_type = ?value_type,
            joins = resolved.hops.len(),
            "resolved filter field"
        );

        match expr.operator {
            Operator::Like => {
                if value_type != ValueType::String {
                    return Err(Error::UnsupportedOperator {
                        field,
                        operator: Operator::Like,
                        reason: "pattern matching needs a string field",
                    });
                }
                Ok(builder.like(path, format!("%{}%", expr.raw_value)))
            }
            Operator::Between => {
                if value_type != ValueType::Long {
                    return Err(Error::UnsupportedOperator {
                        field,
                        operator: Operator::Between,
                        reason: "ranges need an integral field",
                    });
                }
                match self.coerce(expr, value_type)?.as_slice() {
                    [Value::Long(lower), Value::Long(upper)] => {
                        Ok(builder.between(path, *lower, *upper))
                    }
                    _ => Err(Error::ValueCoercion {
                        field,
                        value: expr.raw_value.clone(),
                        expected: "exactly two comma-separated integers",
                    }),
                }
            }
            Operator::In => {
                let values = self.coerce(expr, value_type)?;
                Ok(builder.is_in(path, values))
            }
            Operator::Eq => {
                // extra comma-separated values are coerced but not compared
                let first = self.coerce(expr, value_type)?.into_iter().next().ok_or_else(|| {
                    Error::ValueCoercion {
                        field,
                        value: expr.raw_value.clone(),
                        expected: "a value",
                    }
                })?;
                Ok(builder.equal(path, first))
            }
        }
    }

    fn coerce(&self, expr: &FilterExpression, value_type: ValueType) -> Result<Vec<Value>> {
        expr.pieces()
            .map(|piece| coerce_value(&expr.field_path, piece, value_type, self.strict_booleans))
            .collect()
    }
}

fn coerce_value(
    field_path: &[String],
    piece: &str,
    value_type: ValueType,
    strict_booleans: bool,
) -> Result<Value> {
    let invalid = |expected| Error::ValueCoercion {
        field: field_path.join("."),
        value: piece.to_string(),
        expected,
    };
    match value_type {
        ValueType::Long => piece
            .trim()
            .parse::<i64>()
            .map(Value::Long)
            .map_err(|_| invalid("an integer")),
        ValueType::Boolean if strict_booleans => match piece.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Boolean(true)),
            "false" => Ok(Value::Boolean(false)),
            _ => Err(invalid("`true` or `false`")),
        },
        ValueType::Boolean => Ok(Value::Boolean(piece.eq_ignore_ascii_case("true"))),
        ValueType::String | ValueType::Other => Ok(Value::String(piece.to_string())),
    }
}

/// One-shot form of [`FilterCompiler::compile`].
pub fn compile_filter<B: PredicateBuilder>(
    params: &QueryParams,
    registry: &SchemaRegistry,
    root: &Schema,
    builder: &mut B,
    mapper: UrlMapper,
) -> Result<Option<B::Predicate>> {
    FilterCompiler::new(registry, root)
        .with_mapper(mapper)
        .compile(params, builder)
}
