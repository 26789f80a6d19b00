use std::cmp::Ordering;

use bson::{Bson, Document};
use regex::Regex;

use crate::compare::{compare_values, values_equal};
use crate::expression::{Expression, InValue};
use crate::path::candidates;

impl Expression {
    /// Evaluate this expression against a document.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Expression::And(children) => children.iter().all(|c| c.matches(doc)),
            Expression::Or(children) => children.iter().any(|c| c.matches(doc)),
            Expression::Nor(children) => !children.iter().any(|c| c.matches(doc)),
            Expression::Eq(field, value) => eq_matches(doc, field, value),
            Expression::Ne(field, value) => !eq_matches(doc, field, value),
            Expression::Gt(field, value) => range_matches(doc, field, value, Ordering::is_gt),
            Expression::Gte(field, value) => range_matches(doc, field, value, Ordering::is_ge),
            Expression::Lt(field, value) => range_matches(doc, field, value, Ordering::is_lt),
            Expression::Lte(field, value) => range_matches(doc, field, value, Ordering::is_le),
            Expression::In(field, values) => in_matches(doc, field, values),
            Expression::Nin(field, values) => !in_matches(doc, field, values),
            Expression::Regex(field, re) => candidates(doc, field)
                .into_iter()
                .any(|v| regex_matches(re, v)),
            Expression::Exists(field, should_exist) => {
                !candidates(doc, field).is_empty() == *should_exist
            }
        }
    }
}

/// Equality against `null` also matches a missing field.
fn eq_matches(doc: &Document, field: &str, value: &Bson) -> bool {
    let found = candidates(doc, field);
    if matches!(value, Bson::Null) && found.is_empty() {
        return true;
    }
    found.into_iter().any(|v| values_equal(v, value))
}

fn range_matches(doc: &Document, field: &str, value: &Bson, pred: fn(Ordering) -> bool) -> bool {
    candidates(doc, field)
        .into_iter()
        .any(|v| compare_values(v, value).is_some_and(pred))
}

fn in_matches(doc: &Document, field: &str, values: &[InValue]) -> bool {
    values.iter().any(|entry| match entry {
        InValue::Pattern(re) => candidates(doc, field)
            .into_iter()
            .any(|v| regex_matches(re, v)),
        InValue::Value(value) => eq_matches(doc, field, value),
    })
}

fn regex_matches(re: &Regex, value: &Bson) -> bool {
    match value {
        Bson::String(s) => re.is_match(s),
        Bson::Symbol(s) => re.is_match(s),
        _ => false,
    }
}
