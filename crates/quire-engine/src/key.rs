const COLLECTION_TAG: u8 = b'c';
const RECORD_TAG: u8 = b'r';
const UNIQUE_TAG: u8 = b'u';
const SEP: u8 = 0x00;

/// Storage keys.
///
/// - `Collection(name)`: collection metadata in the system CF: `c\x00{name}`
/// - `Record(id)`: a document, in the collection's CF: `r\x00{id_key}`
/// - `Unique(field, value)`: a unique entry, in the collection's CF:
///   `u\x00{field}\x00{value_key}`; the stored value is the owner's id key.
///
/// `id_key` and `value_key` are produced by [`crate::value_key`] and are
/// self-delimiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Key<'a> {
    Collection(&'a str),
    Record(&'a [u8]),
    Unique(&'a str, &'a [u8]),
}

impl Key<'_> {
    pub(crate) fn encode(&self) -> Vec<u8> {
        match self {
            Key::Collection(name) => {
                let mut buf = Vec::with_capacity(2 + name.len());
                buf.push(COLLECTION_TAG);
                buf.push(SEP);
                buf.extend_from_slice(name.as_bytes());
                buf
            }
            Key::Record(id) => {
                let mut buf = Vec::with_capacity(2 + id.len());
                buf.push(RECORD_TAG);
                buf.push(SEP);
                buf.extend_from_slice(id);
                buf
            }
            Key::Unique(field, value) => {
                let mut buf = Vec::with_capacity(3 + field.len() + value.len());
                buf.extend_from_slice(&KeyPrefix::Unique(field).encode());
                buf.extend_from_slice(value);
                buf
            }
        }
    }
}

/// Prefixes for range scans.
#[derive(Debug, Clone, Copy)]
pub(crate) enum KeyPrefix<'a> {
    Collections,
    Records,
    Unique(&'a str),
}

impl KeyPrefix<'_> {
    pub(crate) fn encode(&self) -> Vec<u8> {
        match self {
            KeyPrefix::Collections => vec![COLLECTION_TAG, SEP],
            KeyPrefix::Records => vec![RECORD_TAG, SEP],
            KeyPrefix::Unique(field) => {
                let mut buf = Vec::with_capacity(3 + field.len());
                buf.push(UNIQUE_TAG);
                buf.push(SEP);
                buf.extend_from_slice(field.as_bytes());
                buf.push(SEP);
                buf
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_start_with_their_prefix() {
        let id = [0x10, 1, 2];
        assert!(Key::Record(&id).encode().starts_with(&KeyPrefix::Records.encode()));
        assert!(
            Key::Unique("a", &id)
                .encode()
                .starts_with(&KeyPrefix::Unique("a").encode())
        );
        assert!(
            Key::Collection("users")
                .encode()
                .starts_with(&KeyPrefix::Collections.encode())
        );
    }

    #[test]
    fn unique_prefix_does_not_cover_longer_field_names() {
        let key = Key::Unique("ab", &[0x01]).encode();
        assert!(!key.starts_with(&KeyPrefix::Unique("a").encode()));
    }
}
