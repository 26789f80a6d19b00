use bson::Bson;
use regex::Regex;

/// A recursive filter expression tree.
///
/// Owns its field paths and operands so it can outlive the filter document
/// it was parsed from.
#[derive(Debug, Clone)]
pub enum Expression {
    // Logical
    And(Vec<Expression>),
    Or(Vec<Expression>),
    Nor(Vec<Expression>),
    // Comparison
    Eq(String, Bson),
    Ne(String, Bson),
    Gt(String, Bson),
    Gte(String, Bson),
    Lt(String, Bson),
    Lte(String, Bson),
    In(String, Vec<InValue>),
    Nin(String, Vec<InValue>),
    // Pattern, compiled at parse time
    Regex(String, Regex),
    // Existence
    Exists(String, bool),
}

/// One entry of an `$in` / `$nin` list.
#[derive(Debug, Clone)]
pub enum InValue {
    Value(Bson),
    Pattern(Regex),
}

impl Expression {
    /// The expression that matches every document.
    pub fn all() -> Self {
        Expression::And(Vec::new())
    }
}
