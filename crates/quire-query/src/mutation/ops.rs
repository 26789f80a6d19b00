use bson::{Bson, Document};

use super::UpdateError;

/// Resolve a dot-path to its parent document and leaf field name.
///
/// For `"address.city"`, walks into `doc["address"]` and returns
/// `(&mut sub_doc, "city")`. With `create`, missing intermediate documents
/// are created; without it, a missing intermediate yields `None`.
pub(crate) fn resolve_parent_mut<'d, 'p>(
    doc: &'d mut Document,
    path: &'p str,
    create: bool,
) -> Result<Option<(&'d mut Document, &'p str)>, UpdateError> {
    let (parents, leaf) = match path.rsplit_once('.') {
        Some((parents, leaf)) => (Some(parents), leaf),
        None => (None, path),
    };

    let mut current = doc;
    for segment in parents.into_iter().flat_map(|p| p.split('.')) {
        if !current.contains_key(segment) {
            if !create {
                return Ok(None);
            }
            current.insert(segment, Document::new());
        }
        current = match current.get_mut(segment) {
            Some(Bson::Document(sub)) => sub,
            Some(other) => {
                return Err(UpdateError::Apply(format!(
                    "cannot use the part ({segment}) of ({path}) to traverse the element ({other})"
                )));
            }
            None => return Ok(None),
        };
    }
    Ok(Some((current, leaf)))
}

/// `$set`: set field to value, creating it if missing.
pub(crate) fn op_set(doc: &mut Document, field: &str, value: &Bson) -> bool {
    if doc.get(field) == Some(value) {
        return false;
    }
    doc.insert(field, value.clone());
    true
}

/// `$unset`: remove a field.
pub(crate) fn op_unset(doc: &mut Document, field: &str) -> bool {
    doc.remove(field).is_some()
}

/// `$inc`: add to a numeric field. A missing field counts as zero.
///
/// i32 + i32 stays i32 unless it overflows, any i64 operand widens to i64,
/// and any double operand yields a double.
pub(crate) fn op_inc(doc: &mut Document, field: &str, amount: &Bson) -> Result<bool, UpdateError> {
    let Some(current) = doc.get(field) else {
        doc.insert(field, amount.clone());
        return Ok(true);
    };

    let result = match (current, amount) {
        (Bson::Int32(a), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(*a as i64 + *b as i64),
        },
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(checked_long(field, *a as i64, *b)?),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(checked_long(field, *a, *b as i64)?),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(checked_long(field, *a, *b)?),
        (Bson::Double(a), Bson::Double(b)) => Bson::Double(a + b),
        (Bson::Int32(a), Bson::Double(b)) => Bson::Double(*a as f64 + b),
        (Bson::Int64(a), Bson::Double(b)) => Bson::Double(*a as f64 + b),
        (Bson::Double(a), Bson::Int32(b)) => Bson::Double(a + *b as f64),
        (Bson::Double(a), Bson::Int64(b)) => Bson::Double(a + *b as f64),
        (other, _) => {
            return Err(UpdateError::Apply(format!(
                "Cannot apply $inc to a value of non-numeric type. {{ {field}: {other} }}"
            )));
        }
    };

    let changed = doc.get(field) != Some(&result);
    doc.insert(field, result);
    Ok(changed)
}

fn checked_long(field: &str, a: i64, b: i64) -> Result<i64, UpdateError> {
    a.checked_add(b).ok_or_else(|| {
        UpdateError::Apply(format!("$inc on {field} overflows a 64-bit integer"))
    })
}

/// `$push`: append to an array field, creating the array if missing.
pub(crate) fn op_push(doc: &mut Document, field: &str, value: &Bson) -> Result<bool, UpdateError> {
    match doc.get_mut(field) {
        Some(Bson::Array(items)) => {
            items.push(value.clone());
            Ok(true)
        }
        Some(other) => Err(UpdateError::Apply(format!(
            "The field '{field}' must be an array but is of type {:?}",
            other.element_type()
        ))),
        None => {
            doc.insert(field, Bson::Array(vec![value.clone()]));
            Ok(true)
        }
    }
}

/// `$pop`: drop the first or last element of an array field.
pub(crate) fn op_pop(doc: &mut Document, field: &str, first: bool) -> Result<bool, UpdateError> {
    match doc.get_mut(field) {
        Some(Bson::Array(items)) if items.is_empty() => Ok(false),
        Some(Bson::Array(items)) => {
            if first {
                items.remove(0);
            } else {
                items.pop();
            }
            Ok(true)
        }
        Some(_) => Err(UpdateError::Apply(format!(
            "Path '{field}' contains an element of non-array type"
        ))),
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    // ── resolve_parent_mut ──────────────────────────────────────

    #[test]
    fn resolve_flat_field() {
        let mut doc = doc! { "a": 1 };
        let (parent, leaf) = resolve_parent_mut(&mut doc, "a", false).unwrap().unwrap();
        assert_eq!(leaf, "a");
        assert_eq!(parent.get_i32("a").unwrap(), 1);
    }

    #[test]
    fn resolve_nested_field() {
        let mut doc = doc! { "address": { "city": "Austin" } };
        let (parent, leaf) = resolve_parent_mut(&mut doc, "address.city", false)
            .unwrap()
            .unwrap();
        assert_eq!(leaf, "city");
        assert_eq!(parent.get_str("city").unwrap(), "Austin");
    }

    #[test]
    fn resolve_missing_without_create() {
        let mut doc = doc! { "a": 1 };
        assert!(resolve_parent_mut(&mut doc, "x.y", false).unwrap().is_none());
    }

    #[test]
    fn resolve_creates_intermediates() {
        let mut doc = doc! {};
        let (parent, leaf) = resolve_parent_mut(&mut doc, "a.b.c", true).unwrap().unwrap();
        parent.insert(leaf, 1);
        assert_eq!(doc, doc! { "a": { "b": { "c": 1 } } });
    }

    #[test]
    fn resolve_through_scalar_fails() {
        let mut doc = doc! { "a": 5 };
        assert!(matches!(
            resolve_parent_mut(&mut doc, "a.b", true),
            Err(UpdateError::Apply(_))
        ));
    }

    // ── operators ───────────────────────────────────────────────

    #[test]
    fn set_reports_change() {
        let mut doc = doc! { "a": 1 };
        assert!(!op_set(&mut doc, "a", &Bson::Int32(1)));
        assert!(op_set(&mut doc, "a", &Bson::Int32(2)));
        assert!(op_set(&mut doc, "b", &Bson::Int32(3)));
        assert_eq!(doc, doc! { "a": 2, "b": 3 });
    }

    #[test]
    fn unset_missing_is_noop() {
        let mut doc = doc! { "a": 1 };
        assert!(!op_unset(&mut doc, "b"));
        assert!(op_unset(&mut doc, "a"));
        assert!(doc.is_empty());
    }

    #[test]
    fn inc_promotes_types() {
        let mut doc = doc! { "a": i32::MAX, "b": 1, "c": 1 };
        op_inc(&mut doc, "a", &Bson::Int32(1)).unwrap();
        op_inc(&mut doc, "b", &Bson::Double(0.5)).unwrap();
        op_inc(&mut doc, "c", &Bson::Int64(2)).unwrap();
        op_inc(&mut doc, "d", &Bson::Int32(4)).unwrap();
        assert_eq!(doc.get("a"), Some(&Bson::Int64(i32::MAX as i64 + 1)));
        assert_eq!(doc.get("b"), Some(&Bson::Double(1.5)));
        assert_eq!(doc.get("c"), Some(&Bson::Int64(3)));
        assert_eq!(doc.get("d"), Some(&Bson::Int32(4)));
    }

    #[test]
    fn inc_long_overflow_fails() {
        let mut doc = doc! { "n": i64::MAX };
        assert!(matches!(op_inc(&mut doc, "n", &Bson::Int32(1)), Err(UpdateError::Apply(_))));
        assert!(matches!(op_inc(&mut doc, "n", &Bson::Int64(1)), Err(UpdateError::Apply(_))));
        assert_eq!(doc.get_i64("n").unwrap(), i64::MAX);

        let mut doc = doc! { "n": -1 };
        assert!(matches!(op_inc(&mut doc, "n", &Bson::Int64(i64::MIN)), Err(UpdateError::Apply(_))));
        assert_eq!(doc.get_i32("n").unwrap(), -1);
    }

    #[test]
    fn inc_by_zero_is_unchanged() {
        let mut doc = doc! { "a": 5 };
        assert!(!op_inc(&mut doc, "a", &Bson::Int32(0)).unwrap());
    }

    #[test]
    fn inc_non_numeric_fails() {
        let mut doc = doc! { "a": "x" };
        assert!(op_inc(&mut doc, "a", &Bson::Int32(1)).is_err());
    }

    #[test]
    fn push_and_pop() {
        let mut doc = doc! {};
        op_push(&mut doc, "l", &Bson::Int32(1)).unwrap();
        op_push(&mut doc, "l", &Bson::Int32(2)).unwrap();
        op_push(&mut doc, "l", &Bson::Int32(3)).unwrap();
        assert!(op_pop(&mut doc, "l", true).unwrap());
        assert!(op_pop(&mut doc, "l", false).unwrap());
        assert_eq!(doc, doc! { "l": [2] });
        assert!(op_pop(&mut doc, "missing", false).is_ok());
    }

    #[test]
    fn push_onto_scalar_fails() {
        let mut doc = doc! { "l": 1 };
        assert!(op_push(&mut doc, "l", &Bson::Int32(1)).is_err());
        assert!(op_pop(&mut doc, "l", false).is_err());
    }
}
