use std::fmt;

use bson::{Bson, Document};

/// A document that must not be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A field name starts with `$`. Carries the full path of the field.
    DollarPrefixedField(String),
    /// A field name contains `.`. Carries the full path of the field.
    DottedField(String),
    IdRegex,
    IdArray,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DollarPrefixedField(path) => {
                write!(f, "field name cannot start with $: '{path}'")
            }
            Self::DottedField(path) => write!(f, "field name cannot contain .: '{path}'"),
            Self::IdRegex => write!(f, "_id cannot be a regex"),
            Self::IdArray => write!(f, "_id cannot be an array"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Check that a document is admissible for storage.
///
/// Rules apply in this order and the first violated one is reported:
/// `$`-prefixed names anywhere, dotted names anywhere, a regex top-level
/// `_id`, an array top-level `_id`. Nested `_id` fields are ordinary fields.
pub fn validate_for_storage(doc: &Document) -> Result<(), ValidationError> {
    if let Some(path) = find_field(doc, None, &|name| name.starts_with('$')) {
        return Err(ValidationError::DollarPrefixedField(path));
    }
    if let Some(path) = find_field(doc, None, &|name| name.contains('.')) {
        return Err(ValidationError::DottedField(path));
    }
    match doc.get("_id") {
        Some(Bson::RegularExpression(_)) => Err(ValidationError::IdRegex),
        Some(Bson::Array(_)) => Err(ValidationError::IdArray),
        _ => Ok(()),
    }
}

fn join(parent: Option<&str>, name: &str) -> String {
    match parent {
        Some(p) => format!("{p}.{name}"),
        None => name.to_string(),
    }
}

/// Depth-first search for the first field name rejected by `bad`.
fn find_field(doc: &Document, parent: Option<&str>, bad: &dyn Fn(&str) -> bool) -> Option<String> {
    for (name, value) in doc {
        let path = join(parent, name);
        if bad(name) {
            return Some(path);
        }
        if let Some(found) = find_in_value(value, &path, bad) {
            return Some(found);
        }
    }
    None
}

fn find_in_value(value: &Bson, path: &str, bad: &dyn Fn(&str) -> bool) -> Option<String> {
    match value {
        Bson::Document(sub) => find_field(sub, Some(path), bad),
        Bson::Array(items) => items.iter().enumerate().find_map(|(i, item)| {
            let item_path = format!("{path}.{i}");
            find_in_value(item, &item_path, bad)
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use bson::{Regex, doc};

    use super::*;

    fn regex(pattern: &str) -> Bson {
        Bson::RegularExpression(Regex {
            pattern: pattern.to_string(),
            options: String::new(),
        })
    }

    #[test]
    fn plain_document_is_valid() {
        let doc = doc! { "_id": 1, "a": { "b": [1, { "c": 2 }] } };
        assert!(validate_for_storage(&doc).is_ok());
    }

    #[test]
    fn dotted_top_level_field() {
        let doc = doc! { "_id": 1, "a.a": 1 };
        assert_eq!(
            validate_for_storage(&doc),
            Err(ValidationError::DottedField("a.a".into()))
        );
    }

    #[test]
    fn dotted_embedded_field() {
        let doc = doc! { "_id": 1, "a": { "a.a": 1 } };
        assert_eq!(
            validate_for_storage(&doc),
            Err(ValidationError::DottedField("a.a.a".into()))
        );
    }

    #[test]
    fn dollar_prefix_wins_over_nested_dot() {
        let doc = doc! { "_id": 1, "$a": { "a.a": 1 } };
        assert_eq!(
            validate_for_storage(&doc),
            Err(ValidationError::DollarPrefixedField("$a".into()))
        );
    }

    #[test]
    fn dollar_prefix_wins_over_earlier_dot() {
        let doc = doc! { "a.b": 1, "c": { "$d": 1 } };
        assert_eq!(
            validate_for_storage(&doc),
            Err(ValidationError::DollarPrefixedField("c.$d".into()))
        );
    }

    #[test]
    fn dollar_prefix_inside_array_element() {
        let doc = doc! { "a": [1, { "$b": 1 }] };
        assert_eq!(
            validate_for_storage(&doc),
            Err(ValidationError::DollarPrefixedField("a.1.$b".into()))
        );
    }

    #[test]
    fn dollar_prefixed_top_level_field() {
        let doc = doc! { "_id": 1, "$a": 1 };
        assert_eq!(
            validate_for_storage(&doc),
            Err(ValidationError::DollarPrefixedField("$a".into()))
        );
    }

    #[test]
    fn regex_id_rejected_even_when_not_first() {
        let doc = doc! { "_id": regex("a") };
        assert_eq!(validate_for_storage(&doc), Err(ValidationError::IdRegex));
        let doc = doc! { "a": 2, "_id": regex("a") };
        assert_eq!(validate_for_storage(&doc), Err(ValidationError::IdRegex));
        assert_eq!(ValidationError::IdRegex.to_string(), "_id cannot be a regex");
    }

    #[test]
    fn array_id_rejected() {
        let doc = doc! { "_id": [9] };
        assert_eq!(validate_for_storage(&doc), Err(ValidationError::IdArray));
    }

    #[test]
    fn nested_id_is_exempt() {
        assert!(validate_for_storage(&doc! { "a": { "_id": [9] } }).is_ok());
        assert!(validate_for_storage(&doc! { "b": 1, "a": { "_id": [9] } }).is_ok());
        assert!(validate_for_storage(&doc! { "a": { "_id": regex("x") } }).is_ok());
    }

    #[test]
    fn field_errors_win_over_id_errors() {
        let doc = doc! { "_id": [9], "a.b": 1 };
        assert_eq!(
            validate_for_storage(&doc),
            Err(ValidationError::DottedField("a.b".into()))
        );
    }
}
