use serde_json::Value;
use std::cmp::Ordering;

use crate::model::{value_text, Row, SortDirection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
}

/// Backend-neutral row predicate. Values are compared in their text form so
/// that request parameters (always text) compare equal to typed columns.
///
/// A null column never satisfies `Compare`, `Like`, `In` or `NotIn`.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        column: String,
        op: CompareOp,
        value: String,
    },
    /// Case-insensitive substring match
    Like { column: String, term: String },
    In { column: String, values: Vec<String> },
    NotIn { column: String, values: Vec<String> },
    IsNull { column: String },
    /// At least one row reachable through `relation` satisfies `predicate`.
    /// Tested as an existence check so base rows are never duplicated.
    Related {
        relation: String,
        predicate: Box<Predicate>,
    },
    Any(Vec<Predicate>),
    All(Vec<Predicate>),
}

impl Predicate {
    pub fn always() -> Self {
        Predicate::All(Vec::new())
    }

    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Predicate::Compare {
            column: column.into(),
            op: CompareOp::Eq,
            value: value.into(),
        }
    }

    pub fn like(column: impl Into<String>, term: impl Into<String>) -> Self {
        Predicate::Like {
            column: column.into(),
            term: term.into(),
        }
    }

    pub fn related(relation: impl Into<String>, predicate: Predicate) -> Self {
        Predicate::Related {
            relation: relation.into(),
            predicate: Box::new(predicate),
        }
    }

    pub fn is_always(&self) -> bool {
        match self {
            Predicate::All(parts) => parts.iter().all(Predicate::is_always),
            _ => false,
        }
    }

    /// AND-combines, flattening nested `All`s and dropping trivially true parts.
    pub fn and(self, other: Predicate) -> Predicate {
        let mut parts = Vec::new();
        for predicate in [self, other] {
            match predicate {
                Predicate::All(inner) => parts.extend(inner.into_iter().filter(|p| !p.is_always())),
                p => parts.push(p),
            }
        }
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Predicate::All(parts)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub direction: SortDirection,
}

/// Everything a backend needs to answer one list query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub predicate: Predicate,
    pub sort: SortKey,
    /// Relations to preload onto each returned row
    pub relations: Vec<String>,
}

/// Looks up the rows reachable from `row` through a named relation.
pub trait RelationResolver {
    fn related_rows<'a>(&'a self, relation: &str, row: &Row) -> Vec<&'a Row>;
}

/// Resolver for rows that have no relations (the far side of a hop).
pub struct NoRelations;

impl RelationResolver for NoRelations {
    fn related_rows<'a>(&'a self, _relation: &str, _row: &Row) -> Vec<&'a Row> {
        Vec::new()
    }
}

/// In-process predicate evaluation and ordering.
pub struct PredicateEvaluator;

impl PredicateEvaluator {
    pub fn matches(row: &Row, predicate: &Predicate, relations: &dyn RelationResolver) -> bool {
        match predicate {
            Predicate::Compare { column, op, value } => match row.text(column) {
                Some(actual) => match op {
                    CompareOp::Eq => actual == *value,
                    CompareOp::Ne => actual != *value,
                },
                None => false,
            },

            Predicate::Like { column, term } => match row.text(column) {
                Some(actual) => actual.to_lowercase().contains(&term.to_lowercase()),
                None => false,
            },

            Predicate::In { column, values } => match row.text(column) {
                Some(actual) => values.contains(&actual),
                None => false,
            },

            Predicate::NotIn { column, values } => match row.text(column) {
                Some(actual) => !values.contains(&actual),
                None => false,
            },

            Predicate::IsNull { column } => matches!(row.get(column), None | Some(Value::Null)),

            Predicate::Related {
                relation,
                predicate,
            } => relations
                .related_rows(relation, row)
                .into_iter()
                .any(|related| Self::matches(related, predicate, &NoRelations)),

            Predicate::Any(parts) => parts.iter().any(|p| Self::matches(row, p, relations)),

            Predicate::All(parts) => parts.iter().all(|p| Self::matches(row, p, relations)),
        }
    }

    /// Orders two rows by `column`. Nulls sort last ascending and first
    /// descending, matching Postgres defaults.
    pub fn compare_rows(a: &Row, b: &Row, column: &str, direction: SortDirection) -> Ordering {
        let ordering = Self::compare_values(a.get(column), b.get(column));
        match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }

    fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
        let left = left.filter(|v| !v.is_null());
        let right = right.filter(|v| !v.is_null());
        match (left, right) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(Value::Number(l)), Some(Value::Number(r))) => {
                match (l.as_f64(), r.as_f64()) {
                    (Some(lf), Some(rf)) => lf.partial_cmp(&rf).unwrap_or(Ordering::Equal),
                    _ => Ordering::Equal,
                }
            }
            (Some(Value::Bool(l)), Some(Value::Bool(r))) => l.cmp(r),
            (Some(l), Some(r)) => {
                let l = value_text(l).unwrap_or_default();
                let r = value_text(r).unwrap_or_default();
                // Numeric strings compare numerically, everything else lexicographically
                match (l.parse::<f64>(), r.parse::<f64>()) {
                    (Ok(lf), Ok(rf)) => lf.partial_cmp(&rf).unwrap_or(Ordering::Equal),
                    _ => l.cmp(&r),
                }
            }
        }
    }
}
