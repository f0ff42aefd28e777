//! Document query matching
//!
//! A small MongoDB-flavoured query language evaluated against arbitrary JSON
//! documents. Queries are compiled once (at rule load) into a typed tree and
//! evaluated many times.
//!
//! ```text
//! {"type": "signup", "age": {"$gte": 18}, "$or": [{"plan": "pro"}, {"trial": true}]}
//! ```
//!
//! Top-level keys are ANDed. A key resolves to one or more candidate values
//! (see [`path`]); the clause holds if any candidate satisfies it.

mod operator;
pub mod path;
mod value;

#[cfg(test)]
mod proptests;

pub use operator::Operator;

use operator::{compile_regex, is_operator_map, pattern_matches};
use path::Candidate;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;
use value::{contains, values_equal};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query must be an object, found {0}")]
    NotAnObject(&'static str),
    #[error("{operator} expects a list operand")]
    ExpectedList { operator: String },
    #[error("{operator} expects a string operand")]
    ExpectedString { operator: String },
    #[error("{operator} expects a list of query objects")]
    ExpectedQueryList { operator: String },
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A compiled query
#[derive(Debug, Clone, Default)]
pub struct Query {
    clauses: Vec<Clause>,
}

#[derive(Debug, Clone)]
pub enum Clause {
    Field { path: String, expr: Expr },
    /// `$or`
    Any(Vec<Query>),
    /// `$and`
    All(Vec<Query>),
}

/// What a field's candidates are matched against
#[derive(Debug, Clone)]
pub enum Expr {
    /// Scalar or list: equality, or membership when the candidate is a list
    Equals(Value),
    /// Object with at least one plain key: exact structural equality
    Document(Value),
    /// Object whose keys are all operators, ANDed
    Operators(Vec<Operator>),
    /// Compiled pattern, only constructible programmatically
    Pattern(Regex),
}

/// `None` matches everything.
pub fn matches(document: &Value, query: Option<&Query>) -> bool {
    query.map_or(true, |q| q.matches(document))
}

impl Query {
    pub fn from_value(value: &Value) -> Result<Self, QueryError> {
        let Value::Object(map) = value else {
            return Err(QueryError::NotAnObject(type_name(value)));
        };

        let mut clauses = Vec::with_capacity(map.len());
        for (key, search) in map {
            let clause = match (key.as_str(), search) {
                ("$or", Value::Array(items)) => Clause::Any(compile_all(key, items)?),
                ("$and", Value::Array(items)) => Clause::All(compile_all(key, items)?),
                _ => Clause::Field {
                    path: key.clone(),
                    expr: Expr::compile(search)?,
                },
            };
            clauses.push(clause);
        }
        Ok(Self { clauses })
    }

    /// Add `path` matched against `expr`
    #[cfg(test)]
    #[must_use]
    pub fn with_field(mut self, path: impl Into<String>, expr: Expr) -> Self {
        self.clauses.push(Clause::Field {
            path: path.into(),
            expr,
        });
        self
    }

    pub fn matches(&self, document: &Value) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::Field { path, expr } => field_matches(document, path, expr),
            Clause::Any(queries) => queries.iter().any(|q| q.matches(document)),
            Clause::All(queries) => queries.iter().all(|q| q.matches(document)),
        })
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        for clause in &self.clauses {
            match clause {
                Clause::Field { path, expr } => {
                    map.insert(path.clone(), expr.to_value());
                }
                Clause::Any(queries) => {
                    map.insert("$or".to_string(), queries_to_value(queries));
                }
                Clause::All(queries) => {
                    map.insert("$and".to_string(), queries_to_value(queries));
                }
            }
        }
        Value::Object(map)
    }
}

impl Expr {
    pub fn compile(search: &Value) -> Result<Self, QueryError> {
        match search {
            Value::Object(map) if is_operator_map(map) => {
                let ops = map
                    .iter()
                    .map(|(name, operand)| Operator::compile(name, operand))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Expr::Operators(ops))
            }
            Value::Object(_) => Ok(Expr::Document(search.clone())),
            other => Ok(Expr::Equals(other.clone())),
        }
    }

    #[cfg(test)]
    pub fn pattern(pattern: &str) -> Result<Self, QueryError> {
        compile_regex(pattern).map(Expr::Pattern)
    }

    fn matches(&self, candidate: Candidate<'_>, document: &Value, path: &str) -> bool {
        match self {
            Expr::Equals(search) => match candidate {
                // a null search also selects documents lacking the field
                Candidate::Missing => search.is_null(),
                Candidate::Present(found) => {
                    values_equal(found, search)
                        || matches!(found, Value::Array(items) if contains(items, search))
                }
            },
            Expr::Document(search) => candidate.value().is_some_and(|v| values_equal(v, search)),
            Expr::Operators(ops) => ops.iter().all(|op| op.evaluate(candidate, document, path)),
            Expr::Pattern(re) => pattern_matches(re, candidate),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Expr::Equals(v) | Expr::Document(v) => v.clone(),
            Expr::Operators(ops) => Value::Object(
                ops.iter()
                    .map(|op| (op.name().to_string(), op.operand()))
                    .collect(),
            ),
            Expr::Pattern(re) => {
                let mut map = Map::new();
                map.insert("$regex".to_string(), Value::String(re.as_str().to_string()));
                Value::Object(map)
            }
        }
    }
}

/// Match one field clause. A path that resolves to nothing is evaluated as a
/// single missing candidate.
pub(crate) fn field_matches(document: &Value, path: &str, expr: &Expr) -> bool {
    let candidates = path::resolve(document, path);
    if candidates.is_empty() {
        return expr.matches(Candidate::Missing, document, path);
    }
    candidates
        .into_iter()
        .any(|candidate| expr.matches(candidate, document, path))
}

fn compile_all(operator: &str, items: &[Value]) -> Result<Vec<Query>, QueryError> {
    items
        .iter()
        .map(|item| {
            if item.is_object() {
                Query::from_value(item)
            } else {
                Err(QueryError::ExpectedQueryList {
                    operator: operator.to_string(),
                })
            }
        })
        .collect()
}

fn queries_to_value(queries: &[Query]) -> Value {
    Value::Array(queries.iter().map(Query::to_value).collect())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

impl Serialize for Query {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Query {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Query::from_value(&value).map_err(serde::de::Error::custom)
    }
}
