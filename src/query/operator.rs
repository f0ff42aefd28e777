//! Field operators (`$gt`, `$in`, `$elemMatch`, ...)

use super::path::Candidate;
use super::value::{as_list, compare, contains, is_truthy, values_equal};
use super::{field_matches, Expr, Query, QueryError};
use regex::Regex;
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// A single operator inside an operator map such as `{"$gte": 3, "$lt": 9}`
#[derive(Debug, Clone)]
pub enum Operator {
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    All(Vec<Value>),
    Exists(bool),
    Regex(Regex),
    ElemMatch(Query),
    Not(Box<Expr>),
    /// Unrecognised operators never match
    Unknown { name: String, operand: Value },
}

impl Operator {
    pub fn compile(name: &str, operand: &Value) -> Result<Self, QueryError> {
        let op = match name {
            "$ne" => Operator::Ne(operand.clone()),
            "$gt" => Operator::Gt(operand.clone()),
            "$gte" => Operator::Gte(operand.clone()),
            "$lt" => Operator::Lt(operand.clone()),
            "$lte" => Operator::Lte(operand.clone()),
            "$in" => Operator::In(list_operand(name, operand)?),
            "$nin" => Operator::Nin(list_operand(name, operand)?),
            "$all" => Operator::All(list_operand(name, operand)?),
            "$exists" => Operator::Exists(is_truthy(operand)),
            "$regex" => {
                let Value::String(pattern) = operand else {
                    return Err(QueryError::ExpectedString {
                        operator: name.to_string(),
                    });
                };
                Operator::Regex(compile_regex(pattern)?)
            }
            "$elemMatch" => Operator::ElemMatch(Query::from_value(operand)?),
            "$not" => Operator::Not(Box::new(Expr::compile(operand)?)),
            _ => Operator::Unknown {
                name: name.to_string(),
                operand: operand.clone(),
            },
        };
        Ok(op)
    }

    pub fn name(&self) -> &str {
        match self {
            Operator::Ne(_) => "$ne",
            Operator::Gt(_) => "$gt",
            Operator::Gte(_) => "$gte",
            Operator::Lt(_) => "$lt",
            Operator::Lte(_) => "$lte",
            Operator::In(_) => "$in",
            Operator::Nin(_) => "$nin",
            Operator::All(_) => "$all",
            Operator::Exists(_) => "$exists",
            Operator::Regex(_) => "$regex",
            Operator::ElemMatch(_) => "$elemMatch",
            Operator::Not(_) => "$not",
            Operator::Unknown { name, .. } => name,
        }
    }

    pub fn operand(&self) -> Value {
        match self {
            Operator::Ne(v) | Operator::Gt(v) | Operator::Gte(v) | Operator::Lt(v) | Operator::Lte(v) => {
                v.clone()
            }
            Operator::In(items) | Operator::Nin(items) | Operator::All(items) => {
                Value::Array(items.clone())
            }
            Operator::Exists(flag) => Value::Bool(*flag),
            Operator::Regex(re) => Value::String(re.as_str().to_string()),
            Operator::ElemMatch(query) => query.to_value(),
            Operator::Not(expr) => expr.to_value(),
            Operator::Unknown { operand, .. } => operand.clone(),
        }
    }

    /// Evaluate against one candidate of the field at `path` in `document`.
    ///
    /// `$not` re-evaluates the whole field rather than the single candidate.
    pub fn evaluate(&self, candidate: Candidate<'_>, document: &Value, path: &str) -> bool {
        match self {
            Operator::Ne(operand) => candidate.value().map_or(true, |v| !values_equal(v, operand)),
            Operator::Gt(operand) => ordered(candidate, operand, |o| o == Ordering::Greater),
            Operator::Gte(operand) => ordered(candidate, operand, |o| o != Ordering::Less),
            Operator::Lt(operand) => ordered(candidate, operand, |o| o == Ordering::Less),
            Operator::Lte(operand) => ordered(candidate, operand, |o| o != Ordering::Greater),
            Operator::In(list) => as_list(candidate)
                .iter()
                .any(|c| c.value().is_some_and(|v| contains(list, v))),
            Operator::Nin(list) => as_list(candidate)
                .iter()
                .all(|c| c.value().map_or(true, |v| !contains(list, v))),
            Operator::All(list) => {
                let held = as_list(candidate);
                list.iter().all(|wanted| {
                    held.iter()
                        .any(|c| c.value().is_some_and(|v| values_equal(v, wanted)))
                })
            }
            Operator::Exists(wanted) => *wanted == !candidate.is_missing(),
            Operator::Regex(re) => pattern_matches(re, candidate),
            Operator::ElemMatch(query) => match candidate {
                Candidate::Present(Value::Array(items)) => items.iter().any(|item| query.matches(item)),
                _ => false,
            },
            Operator::Not(expr) => !field_matches(document, path, expr),
            Operator::Unknown { .. } => false,
        }
    }
}

fn ordered(candidate: Candidate<'_>, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    candidate
        .value()
        .and_then(|v| compare(v, operand))
        .is_some_and(accept)
}

/// True if the candidate, or any string element of it, matches `re`
pub fn pattern_matches(re: &Regex, candidate: Candidate<'_>) -> bool {
    as_list(candidate).iter().any(|c| match c.value() {
        Some(Value::String(s)) => re.is_match(s),
        _ => false,
    })
}

pub fn compile_regex(pattern: &str) -> Result<Regex, QueryError> {
    Regex::new(pattern).map_err(|source| QueryError::InvalidRegex {
        pattern: pattern.to_string(),
        source,
    })
}

fn list_operand(name: &str, operand: &Value) -> Result<Vec<Value>, QueryError> {
    match operand {
        Value::Array(items) => Ok(items.clone()),
        _ => Err(QueryError::ExpectedList {
            operator: name.to_string(),
        }),
    }
}

/// An object is an operator map when every key starts with `$` (`{}` included)
pub fn is_operator_map(map: &Map<String, Value>) -> bool {
    map.keys().all(|k| k.starts_with('$'))
}
