use bson::{Bson, Document};

/// Values reachable from `doc` along a dotted `path`, the way a query sees
/// them: arrays met along the way are traversed element-wise, numeric
/// segments also address array positions, and a terminal array contributes
/// itself as well as each of its elements.
pub(crate) fn candidates<'a>(doc: &'a Document, path: &str) -> Vec<&'a Bson> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some((head, tail)) = segments.split_first()
        && let Some(value) = doc.get(*head)
    {
        walk(value, tail, &mut out);
    }
    out
}

fn walk<'a>(value: &'a Bson, rest: &[&str], out: &mut Vec<&'a Bson>) {
    let Some((head, tail)) = rest.split_first() else {
        out.push(value);
        if let Bson::Array(items) = value {
            out.extend(items.iter());
        }
        return;
    };

    match value {
        Bson::Document(sub) => {
            if let Some(next) = sub.get(*head) {
                walk(next, tail, out);
            }
        }
        Bson::Array(items) => {
            if let Ok(pos) = head.parse::<usize>()
                && let Some(item) = items.get(pos)
            {
                walk(item, tail, out);
            }
            for item in items {
                if let Bson::Document(sub) = item
                    && let Some(next) = sub.get(*head)
                {
                    walk(next, tail, out);
                }
            }
        }
        _ => {}
    }
}
