use bson::{Bson, Document};

use crate::error::EngineError;

// ── Record ─────────────────────────────────────────────────────
//
// Layout: [RECORD_V1][BSON...]

const RECORD_V1: u8 = 0x01;

pub(crate) fn encode_record(doc: &Document) -> Result<Vec<u8>, EngineError> {
    let bytes = bson::to_vec(doc)?;
    let mut buf = Vec::with_capacity(1 + bytes.len());
    buf.push(RECORD_V1);
    buf.extend_from_slice(&bytes);
    Ok(buf)
}

pub(crate) fn decode_record(data: &[u8]) -> Result<Document, EngineError> {
    match data.split_first() {
        Some((&RECORD_V1, bson_bytes)) => Ok(bson::from_slice(bson_bytes)?),
        Some((tag, _)) => Err(EngineError::Encoding(format!(
            "unknown record tag: 0x{tag:02X}"
        ))),
        None => Err(EngineError::Encoding("empty record".into())),
    }
}

// ── Value keys ─────────────────────────────────────────────────
//
// A value key is a self-delimiting byte string with one property: two values
// produce the same key exactly when a unique constraint must treat them as
// the same value. Numbers are canonicalized so that 1, 1i64 and 1.0 collide;
// a missing field and an explicit null collide.

const TAG_NULL: u8 = 0x01;
const TAG_UNDEFINED: u8 = 0x02;
const TAG_MIN_KEY: u8 = 0x03;
const TAG_INT: u8 = 0x10;
const TAG_FLOAT: u8 = 0x11;
const TAG_DECIMAL: u8 = 0x12;
const TAG_STRING: u8 = 0x20;
const TAG_SYMBOL: u8 = 0x21;
const TAG_DOCUMENT: u8 = 0x30;
const TAG_ARRAY: u8 = 0x40;
const TAG_BINARY: u8 = 0x50;
const TAG_OBJECT_ID: u8 = 0x60;
const TAG_BOOL: u8 = 0x70;
const TAG_DATETIME: u8 = 0x80;
const TAG_TIMESTAMP: u8 = 0x90;
const TAG_REGEX: u8 = 0xA0;
const TAG_CODE: u8 = 0xB0;
const TAG_CODE_W_SCOPE: u8 = 0xB1;
const TAG_OPAQUE: u8 = 0xF0;
const TAG_MAX_KEY: u8 = 0xFF;

/// Canonical key bytes for a BSON value.
pub fn value_key(value: &Bson) -> Vec<u8> {
    let mut buf = Vec::new();
    write_value(value, &mut buf);
    buf
}

fn write_len_prefixed(bytes: &[u8], buf: &mut Vec<u8>) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

/// Sign bit flipped so integer keys sort in numeric order.
fn write_int(v: i64, buf: &mut Vec<u8>) {
    buf.push(TAG_INT);
    buf.extend_from_slice(&((v as u64) ^ (1 << 63)).to_be_bytes());
}

fn write_double(d: f64, buf: &mut Vec<u8>) {
    let integral = d.fract() == 0.0 && d >= i64::MIN as f64 && d < i64::MAX as f64;
    if integral {
        write_int(d as i64, buf);
    } else if d.is_nan() {
        buf.push(TAG_FLOAT);
        buf.extend_from_slice(&f64::NAN.to_bits().to_be_bytes());
    } else {
        buf.push(TAG_FLOAT);
        buf.extend_from_slice(&d.to_bits().to_be_bytes());
    }
}

fn write_document(doc: &Document, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&(doc.len() as u32).to_be_bytes());
    for (k, v) in doc {
        write_len_prefixed(k.as_bytes(), buf);
        write_value(v, buf);
    }
}

fn write_value(value: &Bson, buf: &mut Vec<u8>) {
    match value {
        Bson::Null => buf.push(TAG_NULL),
        Bson::Undefined => buf.push(TAG_UNDEFINED),
        Bson::MinKey => buf.push(TAG_MIN_KEY),
        Bson::MaxKey => buf.push(TAG_MAX_KEY),
        Bson::Int32(v) => write_int(*v as i64, buf),
        Bson::Int64(v) => write_int(*v, buf),
        Bson::Double(d) => write_double(*d, buf),
        Bson::Decimal128(d) => {
            buf.push(TAG_DECIMAL);
            buf.extend_from_slice(&d.bytes());
        }
        Bson::String(s) => {
            buf.push(TAG_STRING);
            write_len_prefixed(s.as_bytes(), buf);
        }
        Bson::Symbol(s) => {
            buf.push(TAG_SYMBOL);
            write_len_prefixed(s.as_bytes(), buf);
        }
        Bson::Document(doc) => {
            buf.push(TAG_DOCUMENT);
            write_document(doc, buf);
        }
        Bson::Array(items) => {
            buf.push(TAG_ARRAY);
            buf.extend_from_slice(&(items.len() as u32).to_be_bytes());
            for item in items {
                write_value(item, buf);
            }
        }
        Bson::Binary(bin) => {
            buf.push(TAG_BINARY);
            buf.push(u8::from(bin.subtype));
            write_len_prefixed(&bin.bytes, buf);
        }
        Bson::ObjectId(oid) => {
            buf.push(TAG_OBJECT_ID);
            buf.extend_from_slice(&oid.bytes());
        }
        Bson::Boolean(b) => {
            buf.push(TAG_BOOL);
            buf.push(u8::from(*b));
        }
        Bson::DateTime(dt) => {
            buf.push(TAG_DATETIME);
            buf.extend_from_slice(&dt.timestamp_millis().to_be_bytes());
        }
        Bson::Timestamp(ts) => {
            buf.push(TAG_TIMESTAMP);
            buf.extend_from_slice(&ts.time.to_be_bytes());
            buf.extend_from_slice(&ts.increment.to_be_bytes());
        }
        Bson::RegularExpression(re) => {
            buf.push(TAG_REGEX);
            write_len_prefixed(re.pattern.as_bytes(), buf);
            write_len_prefixed(re.options.as_bytes(), buf);
        }
        Bson::JavaScriptCode(code) => {
            buf.push(TAG_CODE);
            write_len_prefixed(code.as_bytes(), buf);
        }
        Bson::JavaScriptCodeWithScope(cws) => {
            buf.push(TAG_CODE_W_SCOPE);
            write_len_prefixed(cws.code.as_bytes(), buf);
            write_document(&cws.scope, buf);
        }
        other => {
            // DbPointer has no public accessors; fall back to its BSON bytes.
            buf.push(TAG_OPAQUE);
            let wrapped = bson::doc! { "": other.clone() };
            let bytes = bson::to_vec(&wrapped).unwrap_or_default();
            write_len_prefixed(&bytes, buf);
        }
    }
}

// ── Index values ───────────────────────────────────────────────

/// Values a document contributes to an index on `path`.
///
/// Dotted paths descend through sub-documents; arrays contribute each of
/// their elements. A missing field contributes `null`, an empty array
/// contributes `undefined`. Duplicates (by value key) are removed.
pub fn index_values(doc: &Document, path: &str) -> Vec<Bson> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut raw = Vec::new();
    match segments.split_first() {
        Some((head, tail)) => collect(doc.get(*head), tail, &mut raw),
        None => raw.push(Bson::Null),
    }

    let mut seen: Vec<Vec<u8>> = Vec::with_capacity(raw.len());
    let mut out = Vec::with_capacity(raw.len());
    for value in raw {
        let key = value_key(&value);
        if !seen.contains(&key) {
            seen.push(key);
            out.push(value);
        }
    }
    out
}

fn collect(value: Option<&Bson>, rest: &[&str], out: &mut Vec<Bson>) {
    let Some((head, tail)) = rest.split_first() else {
        match value {
            Some(Bson::Array(items)) if items.is_empty() => out.push(Bson::Undefined),
            Some(Bson::Array(items)) => out.extend(items.iter().cloned()),
            Some(v) => out.push(v.clone()),
            None => out.push(Bson::Null),
        }
        return;
    };

    match value {
        Some(Bson::Document(sub)) => collect(sub.get(*head), tail, out),
        Some(Bson::Array(items)) => {
            if let Ok(pos) = head.parse::<usize>() {
                collect(items.get(pos), tail, out);
                return;
            }
            let before = out.len();
            for item in items {
                if let Bson::Document(sub) = item {
                    collect(sub.get(*head), tail, out);
                }
            }
            if out.len() == before {
                out.push(Bson::Null);
            }
        }
        _ => out.push(Bson::Null),
    }
}

#[cfg(test)]
mod tests {
    use bson::{doc, oid::ObjectId};

    use super::*;

    #[test]
    fn numeric_types_share_keys() {
        assert_eq!(value_key(&Bson::Int32(1)), value_key(&Bson::Int64(1)));
        assert_eq!(value_key(&Bson::Int32(1)), value_key(&Bson::Double(1.0)));
        assert_ne!(value_key(&Bson::Double(1.5)), value_key(&Bson::Int32(1)));
    }

    #[test]
    fn integer_keys_sort_numerically() {
        let keys: Vec<Vec<u8>> = [i64::MIN, -5, -1, 0, 1, 2, i64::MAX]
            .iter()
            .map(|v| value_key(&Bson::Int64(*v)))
            .collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        assert!(value_key(&Bson::Int32(-5)) < value_key(&Bson::Double(1.0)));
    }

    #[test]
    fn strings_are_length_delimited() {
        let a = value_key(&Bson::Array(vec!["ab".into(), "c".into()]));
        let b = value_key(&Bson::Array(vec!["a".into(), "bc".into()]));
        assert_ne!(a, b);
    }

    #[test]
    fn distinct_types_never_collide() {
        assert_ne!(value_key(&Bson::Int32(1)), value_key(&Bson::String("1".into())));
        assert_ne!(value_key(&Bson::Boolean(true)), value_key(&Bson::Int32(1)));
        assert_ne!(value_key(&Bson::Null), value_key(&Bson::Undefined));
    }

    #[test]
    fn object_ids_are_keyed_by_bytes() {
        let oid = ObjectId::new();
        assert_eq!(value_key(&Bson::ObjectId(oid)), value_key(&Bson::ObjectId(oid)));
        assert_ne!(
            value_key(&Bson::ObjectId(oid)),
            value_key(&Bson::ObjectId(ObjectId::new()))
        );
    }

    #[test]
    fn record_round_trip() {
        let doc = doc! { "_id": 1, "a": { "b": [1, 2] } };
        let bytes = encode_record(&doc).unwrap();
        assert_eq!(decode_record(&bytes).unwrap(), doc);
        assert!(decode_record(&[]).is_err());
        assert!(decode_record(&[0x7F, 0x00]).is_err());
    }

    #[test]
    fn index_values_of_scalar_field() {
        let doc = doc! { "a": 1 };
        assert_eq!(index_values(&doc, "a"), vec![Bson::Int32(1)]);
    }

    #[test]
    fn index_values_of_missing_field_is_null() {
        let doc = doc! { "b": 1 };
        assert_eq!(index_values(&doc, "a"), vec![Bson::Null]);
        assert_eq!(index_values(&doc, "a.b.c"), vec![Bson::Null]);
    }

    #[test]
    fn index_values_expand_arrays_and_dedupe() {
        let doc = doc! { "a": [1, 2, 1.0] };
        assert_eq!(index_values(&doc, "a"), vec![Bson::Int32(1), Bson::Int32(2)]);
    }

    #[test]
    fn index_values_through_array_of_documents() {
        let doc = doc! { "a": [{ "b": 1 }, { "b": 2 }, { "c": 3 }] };
        assert_eq!(index_values(&doc, "a.b"), vec![Bson::Int32(1), Bson::Int32(2)]);
        assert_eq!(index_values(&doc, "a.1.b"), vec![Bson::Int32(2)]);
    }

    #[test]
    fn index_values_of_empty_array_is_undefined() {
        let doc = doc! { "a": [] };
        assert_eq!(index_values(&doc, "a"), vec![Bson::Undefined]);
    }
}
