//! Field-path resolution for the matcher
//!
//! A path such as `items.0.sku` or `items.sku` is resolved into zero or more
//! candidate values. Lists reached mid-path are either indexed (numeric
//! segment) or fanned out over their object elements (named segment).

use serde_json::Value;

pub const PATH_SEPARATOR: char = '.';

/// A value produced by resolving a field path
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Candidate<'a> {
    /// The path did not lead to a real value
    Missing,
    Present(&'a Value),
}

impl<'a> Candidate<'a> {
    pub fn is_missing(&self) -> bool {
        matches!(self, Candidate::Missing)
    }

    pub fn value(&self) -> Option<&'a Value> {
        match self {
            Candidate::Missing => None,
            Candidate::Present(value) => Some(value),
        }
    }
}

/// Resolve `path` against `document`.
///
/// An empty result means the path went through a list and no element could
/// supply the next segment; callers treat that the same as a single
/// `Candidate::Missing`.
pub fn resolve<'a>(document: &'a Value, path: &str) -> Vec<Candidate<'a>> {
    let segments: Vec<&str> = if path.is_empty() {
        Vec::new()
    } else {
        path.split(PATH_SEPARATOR).collect()
    };
    let mut out = Vec::new();
    descend(document, &segments, &mut out);
    out
}

fn descend<'a>(node: &'a Value, segments: &[&str], out: &mut Vec<Candidate<'a>>) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(Candidate::Present(node));
        return;
    };

    match node {
        Value::Object(map) => match map.get(*head) {
            Some(child) => descend(child, rest, out),
            None => out.push(Candidate::Missing),
        },
        Value::Array(items) => {
            if let Ok(index) = head.parse::<usize>() {
                if let Some(item) = items.get(index) {
                    descend(item, rest, out);
                }
                return;
            }
            for item in items {
                if let Value::Object(map) = item {
                    if let Some(child) = map.get(*head) {
                        descend(child, rest, out);
                    }
                }
            }
        }
        _ => out.push(Candidate::Missing),
    }
}
