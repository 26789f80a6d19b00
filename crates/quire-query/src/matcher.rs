use bson::Document;

use crate::expression::Expression;
use crate::parse_filter::{FilterParseError, parse_filter};

/// Decides whether a document satisfies a query predicate.
///
/// Predicates are compiled once per operation and evaluated against every
/// candidate document.
pub trait Matcher: Send + Sync {
    type Predicate;

    fn parse(&self, filter: &Document) -> Result<Self::Predicate, FilterParseError>;

    fn matches(&self, doc: &Document, predicate: &Self::Predicate) -> bool;
}

/// The default [`Matcher`], backed by [`Expression`] trees.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionMatcher;

impl Matcher for ExpressionMatcher {
    type Predicate = Expression;

    fn parse(&self, filter: &Document) -> Result<Expression, FilterParseError> {
        parse_filter(filter)
    }

    fn matches(&self, doc: &Document, predicate: &Expression) -> bool {
        predicate.matches(doc)
    }
}
