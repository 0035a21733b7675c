//! Binding and execution
//!
//! [`BoundQuery::bind`] resolves bind variables against a parsed query and
//! fixes the set of collections it reads. [`BoundQuery::execute`] turns the
//! bound query into a lazy row sequence over catalog snapshots; only SORT
//! materializes rows. Nested loops walk the cross product of their
//! snapshots, innermost loop fastest.

use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeSet;

use super::lexer::CompareOp;
use super::parser::{AttributePath, Condition, Operand, Operation, Projection, Query, Source};
use super::value::{compare_values, lookup_path};
use crate::catalog::{Catalog, Snapshot};
use crate::error::{CatalogError, CursordError, QueryError, Result};

/// Lazily produced result rows.
pub type Rows = Box<dyn Iterator<Item = Value> + Send>;

/// One document per loop, in loop order.
type Binding = Vec<Value>;

type Bindings = Box<dyn Iterator<Item = Binding> + Send>;

/// Attribute path resolved to a loop position.
#[derive(Debug, Clone, PartialEq)]
struct BoundPath {
    slot: usize,
    attributes: Vec<String>,
}

impl BoundPath {
    fn resolve(query: &Query, path: &AttributePath) -> Result<Self> {
        let slot = query
            .variable_index(&path.variable)
            .ok_or_else(|| QueryError::UnknownVariable(path.variable.clone()))?;
        Ok(Self {
            slot,
            attributes: path.attributes.clone(),
        })
    }

    fn lookup<'a>(&self, binding: &'a Binding) -> &'a Value {
        match binding.get(self.slot) {
            Some(doc) => lookup_path(doc, &self.attributes),
            None => &Value::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct BoundCondition {
    path: BoundPath,
    op: CompareOp,
    value: Value,
}

impl BoundCondition {
    fn matches(&self, binding: &Binding) -> bool {
        let ord = compare_values(self.path.lookup(binding), &self.value);
        match self.op {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum BoundOperation {
    Filter(BoundCondition),
    Sort { path: BoundPath, descending: bool },
    Limit { offset: usize, count: usize },
}

/// A query with every bind parameter resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundQuery {
    /// Collection of each loop, outermost first
    collections: Vec<String>,
    operations: Vec<BoundOperation>,
    projection: BoundPath,
}

impl BoundQuery {
    /// Resolve `bind_vars` for `query`.
    ///
    /// Every declared parameter needs a value, every supplied value must be
    /// declared, and collection parameters must be strings.
    pub fn bind(query: &Query, bind_vars: &Map<String, Value>) -> Result<Self> {
        let declared = query.declared_parameters();
        for name in &declared {
            if !bind_vars.contains_key(name) {
                return Err(QueryError::MissingBindParameter(name.clone()).into());
            }
        }
        if let Some(extra) = bind_vars.keys().find(|k| !declared.contains(k)) {
            return Err(QueryError::UndeclaredBindParameter(extra.clone()).into());
        }

        let collections = query
            .loops
            .iter()
            .map(|l| -> Result<String> {
                match &l.source {
                    Source::Collection(name) => Ok(name.clone()),
                    Source::CollectionParam(name) => {
                        let key = format!("@{name}");
                        match bind_vars.get(&key) {
                            Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
                            _ => Err(QueryError::InvalidBindParameter(key).into()),
                        }
                    }
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let operations = query
            .operations
            .iter()
            .map(|op| -> Result<BoundOperation> {
                Ok(match op {
                    Operation::Filter(Condition { path, op, operand }) => {
                        let value = match operand {
                            Operand::Literal(v) => v.clone(),
                            Operand::Param(name) => bind_vars
                                .get(name)
                                .cloned()
                                .ok_or_else(|| QueryError::MissingBindParameter(name.clone()))?,
                        };
                        BoundOperation::Filter(BoundCondition {
                            path: BoundPath::resolve(query, path)?,
                            op: *op,
                            value,
                        })
                    }
                    Operation::Sort { path, descending } => BoundOperation::Sort {
                        path: BoundPath::resolve(query, path)?,
                        descending: *descending,
                    },
                    Operation::Limit { offset, count } => BoundOperation::Limit {
                        offset: *offset,
                        count: *count,
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let projection = match &query.projection {
            Projection::Document(variable) => BoundPath::resolve(
                query,
                &AttributePath {
                    variable: variable.clone(),
                    attributes: Vec::new(),
                },
            )?,
            Projection::Path(path) => BoundPath::resolve(query, path)?,
        };

        Ok(Self {
            collections,
            operations,
            projection,
        })
    }

    /// Collections the query reads; fixed once bound.
    pub fn referenced_collections(&self) -> BTreeSet<String> {
        self.collections.iter().cloned().collect()
    }

    /// Start execution against `database`, returning the lazy row sequence.
    pub async fn execute(&self, catalog: &Catalog, database: &str) -> Result<Rows> {
        let mut snapshots = Vec::with_capacity(self.collections.len());
        for collection in &self.collections {
            let snapshot = catalog
                .snapshot(database, collection)
                .await
                .map_err(|e| match e {
                    CursordError::Catalog(CatalogError::CollectionNotFound(name)) => {
                        QueryError::CollectionNotFound(name).into()
                    }
                    other => other,
                })?;
            snapshots.push(snapshot);
        }

        let mut bindings: Bindings = Box::new(CrossProduct::new(snapshots));
        for op in &self.operations {
            bindings = match op.clone() {
                BoundOperation::Filter(cond) => {
                    Box::new(bindings.filter(move |b| cond.matches(b)))
                }
                BoundOperation::Sort { path, descending } => {
                    let mut all: Vec<Binding> = bindings.collect();
                    all.sort_by(|a, b| {
                        let ord = compare_values(path.lookup(a), path.lookup(b));
                        if descending { ord.reverse() } else { ord }
                    });
                    Box::new(all.into_iter())
                }
                BoundOperation::Limit { offset, count } => {
                    Box::new(bindings.skip(offset).take(count))
                }
            };
        }

        let projection = self.projection.clone();
        Ok(Box::new(
            bindings.map(move |binding| projection.lookup(&binding).clone()),
        ))
    }
}

/// Iterates every combination of documents from the loop snapshots.
struct CrossProduct {
    snapshots: Vec<Snapshot>,
    /// Next position per loop; `None` once exhausted
    positions: Option<Vec<usize>>,
}

impl CrossProduct {
    fn new(snapshots: Vec<Snapshot>) -> Self {
        let positions = (!snapshots.is_empty() && snapshots.iter().all(|s| !s.is_empty()))
            .then(|| vec![0; snapshots.len()]);
        Self {
            snapshots,
            positions,
        }
    }
}

impl Iterator for CrossProduct {
    type Item = Binding;

    fn next(&mut self) -> Option<Binding> {
        let positions = self.positions.as_mut()?;
        let binding = positions
            .iter()
            .zip(&self.snapshots)
            .map(|(&pos, snapshot)| snapshot[pos].clone())
            .collect();

        // advance like an odometer, innermost loop first
        let mut level = positions.len();
        loop {
            if level == 0 {
                self.positions = None;
                break;
            }
            level -= 1;
            positions[level] += 1;
            if positions[level] < self.snapshots[level].len() {
                break;
            }
            positions[level] = 0;
        }
        Some(binding)
    }
}
