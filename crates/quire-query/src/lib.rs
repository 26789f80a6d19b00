mod compare;
mod eval;
mod expression;
mod matcher;
pub mod mutation;
mod parse_filter;
mod path;

pub use compare::{compare_values, values_equal};
pub use expression::{Expression, InValue};
pub use matcher::{ExpressionMatcher, Matcher};
pub use mutation::{
    FieldMutation, Mutation, MutationOp, UpdateError, UpdateParseError, UpdateSpec, parse_update,
};
pub use parse_filter::{FilterParseError, parse_filter};
