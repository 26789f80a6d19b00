use bson::{Bson, Document};
use regex::{Regex, RegexBuilder};

use crate::expression::{Expression, InValue};

/// Parse error for filter documents.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterParseError(pub String);

impl std::fmt::Display for FilterParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for FilterParseError {}

/// Parse a filter document into an [`Expression`] tree.
///
/// An empty filter matches every document. Top-level keys are either field
/// conditions or one of `$and`, `$or`, `$nor`; any other `$`-prefixed key
/// (an update modifier such as `$set`, say) is rejected.
pub fn parse_filter(filter: &Document) -> Result<Expression, FilterParseError> {
    let mut children = Vec::new();

    for (key, value) in filter {
        match key.as_str() {
            "$and" => children.push(Expression::And(parse_logical_array(key, value)?)),
            "$or" => children.push(Expression::Or(parse_logical_array(key, value)?)),
            "$nor" => children.push(Expression::Nor(parse_logical_array(key, value)?)),
            k if k.starts_with('$') => {
                return Err(FilterParseError(format!("unknown top level operator: {k}")));
            }
            _ => parse_field_condition(key, value, &mut children)?,
        }
    }

    if children.len() == 1 {
        Ok(children.remove(0))
    } else {
        Ok(Expression::And(children))
    }
}

fn parse_logical_array(op: &str, value: &Bson) -> Result<Vec<Expression>, FilterParseError> {
    let Bson::Array(items) = value else {
        return Err(FilterParseError(format!("{op} must be an array")));
    };
    if items.is_empty() {
        return Err(FilterParseError(format!(
            "{op} must be a nonempty array"
        )));
    }
    items
        .iter()
        .map(|item| match item {
            Bson::Document(sub) => parse_filter(sub),
            _ => Err(FilterParseError(format!(
                "{op} entries need to be full objects"
            ))),
        })
        .collect()
}

fn is_operator_doc(value: &Bson) -> bool {
    matches!(value, Bson::Document(d) if d.keys().next().is_some_and(|k| k.starts_with('$')))
}

/// A field condition is either an implicit `$eq` or an operator sub-document.
fn parse_field_condition(
    field: &str,
    value: &Bson,
    out: &mut Vec<Expression>,
) -> Result<(), FilterParseError> {
    match value {
        Bson::RegularExpression(re) => {
            out.push(Expression::Regex(
                field.to_string(),
                compile_regex(&re.pattern, &re.options)?,
            ));
        }
        Bson::Document(ops) if is_operator_doc(value) => parse_operators(field, ops, out)?,
        _ => out.push(Expression::Eq(field.to_string(), value.clone())),
    }
    Ok(())
}

fn parse_operators(
    field: &str,
    ops: &Document,
    out: &mut Vec<Expression>,
) -> Result<(), FilterParseError> {
    let path = || field.to_string();
    let options = match ops.get("$options") {
        Some(Bson::String(s)) => s.as_str(),
        Some(_) => return Err(FilterParseError("$options has to be a string".into())),
        None => "",
    };

    for (op, operand) in ops {
        let expr = match op.as_str() {
            "$eq" => Expression::Eq(path(), operand.clone()),
            "$ne" => Expression::Ne(path(), operand.clone()),
            "$gt" => Expression::Gt(path(), operand.clone()),
            "$gte" => Expression::Gte(path(), operand.clone()),
            "$lt" => Expression::Lt(path(), operand.clone()),
            "$lte" => Expression::Lte(path(), operand.clone()),
            "$in" => Expression::In(path(), array_operand(op, operand)?),
            "$nin" => Expression::Nin(path(), array_operand(op, operand)?),
            "$exists" => Expression::Exists(path(), truthy(operand)),
            "$regex" => {
                let regex = match operand {
                    Bson::String(pattern) => compile_regex(pattern, options)?,
                    Bson::RegularExpression(re) => {
                        let opts = if options.is_empty() { re.options.as_str() } else { options };
                        compile_regex(&re.pattern, opts)?
                    }
                    _ => return Err(FilterParseError("$regex has to be a string".into())),
                };
                Expression::Regex(path(), regex)
            }
            "$options" => {
                if !ops.contains_key("$regex") {
                    return Err(FilterParseError("$options needs a $regex".into()));
                }
                continue;
            }
            other => {
                return Err(FilterParseError(format!("unknown operator: {other}")));
            }
        };
        out.push(expr);
    }
    Ok(())
}

fn array_operand(op: &str, operand: &Bson) -> Result<Vec<InValue>, FilterParseError> {
    let Bson::Array(items) = operand else {
        return Err(FilterParseError(format!("{op} needs an array")));
    };
    items
        .iter()
        .map(|item| match item {
            Bson::RegularExpression(re) => {
                Ok(InValue::Pattern(compile_regex(&re.pattern, &re.options)?))
            }
            other => Ok(InValue::Value(other.clone())),
        })
        .collect()
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

fn compile_regex(pattern: &str, options: &str) -> Result<Regex, FilterParseError> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in options.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => {
                return Err(FilterParseError(format!("invalid regex option: {other}")));
            }
        };
    }
    builder
        .build()
        .map_err(|e| FilterParseError(format!("invalid regex: {e}")))
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    #[test]
    fn in_compiles_patterns_with_options() {
        let re = bson::Regex { pattern: "^x".into(), options: "i".into() };
        match parse_filter(&doc! { "a": { "$in": [re, 1] } }).unwrap() {
            Expression::In(_, values) => {
                assert!(matches!(&values[0], InValue::Pattern(p) if p.is_match("X")));
                assert!(matches!(values[1], InValue::Value(Bson::Int32(1))));
            }
            other => panic!("expected In, got {other:?}"),
        }
    }

    #[test]
    fn in_rejects_bad_patterns() {
        let bad = bson::Regex { pattern: "(".into(), options: String::new() };
        assert!(parse_filter(&doc! { "a": { "$in": [bad] } }).is_err());
        let bad_flag = bson::Regex { pattern: "a".into(), options: "q".into() };
        assert!(parse_filter(&doc! { "a": { "$nin": [bad_flag] } }).is_err());
    }

    #[test]
    fn empty_filter_is_match_all() {
        match parse_filter(&doc! {}).unwrap() {
            Expression::And(children) => assert!(children.is_empty()),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn single_condition_is_not_wrapped() {
        assert!(matches!(
            parse_filter(&doc! { "a": 1 }).unwrap(),
            Expression::Eq(ref f, Bson::Int32(1)) if f == "a"
        ));
    }

    #[test]
    fn operator_doc_expands_to_conjunction() {
        match parse_filter(&doc! { "a": { "$gt": 1, "$lt": 5 } }).unwrap() {
            Expression::And(children) => assert_eq!(children.len(), 2),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn update_modifier_is_unknown_top_level_operator() {
        let err = parse_filter(&doc! { "$set": { "a": 1 } }).unwrap_err();
        assert_eq!(err.0, "unknown top level operator: $set");
    }

    #[test]
    fn unknown_field_operator_rejected() {
        let err = parse_filter(&doc! { "a": { "$near": 1 } }).unwrap_err();
        assert!(err.0.contains("$near"));
    }

    #[test]
    fn logical_operators_need_nonempty_arrays() {
        assert!(parse_filter(&doc! { "$or": [] }).is_err());
        assert!(parse_filter(&doc! { "$or": { "a": 1 } }).is_err());
        assert!(parse_filter(&doc! { "$or": [1] }).is_err());
        assert!(parse_filter(&doc! { "$or": [{ "a": 1 }, { "b": 2 }] }).is_ok());
    }

    #[test]
    fn plain_subdocument_is_equality() {
        assert!(matches!(
            parse_filter(&doc! { "a": { "b": 1 } }).unwrap(),
            Expression::Eq(_, Bson::Document(_))
        ));
    }

    #[test]
    fn regex_options_and_errors() {
        assert!(parse_filter(&doc! { "a": { "$regex": "^x", "$options": "i" } }).is_ok());
        assert!(parse_filter(&doc! { "a": { "$regex": "(" } }).is_err());
        assert!(parse_filter(&doc! { "a": { "$regex": "x", "$options": "q" } }).is_err());
        assert!(parse_filter(&doc! { "a": { "$options": "i" } }).is_err());
    }

    #[test]
    fn in_requires_array() {
        assert!(parse_filter(&doc! { "a": { "$in": 1 } }).is_err());
        assert!(parse_filter(&doc! { "a": { "$in": [1, 2] } }).is_ok());
    }
}
