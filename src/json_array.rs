//! Element-at-a-time encoder/decoder for a JSON array of model objects,
//! built on `serde_json`'s low-level deserializer so a large array is
//! neither fully parsed nor fully buffered up front.

use std::io::Write;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Deserializer;

use crate::error::{Error, Kind};

/// Decodes `bytes` as a JSON array, calling `visitor` once per element
/// (before it lands in the returned `Vec`) and returning every decoded
/// element. Skips surrounding whitespace, expects a leading `[`, and
/// tolerates (but does not require) a trailing `]`.
pub fn decode_array<T: DeserializeOwned>(
    bytes: &[u8],
    mut visitor: Option<&mut dyn FnMut(&T)>,
) -> Result<Vec<T>, Error> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| Error::with_source(Kind::Io, "bar JSON payload is not valid UTF-8", e))?;
    let trimmed = text.trim_start();
    let trimmed = trimmed
        .strip_prefix('[')
        .ok_or_else(|| Error::io("expected JSON array to start with '['"))?;

    let mut stream = Deserializer::from_str(trimmed).into_iter::<T>();
    let mut items = Vec::new();
    for item in &mut stream {
        let item = item.map_err(|e| Error::with_source(Kind::Io, "failed to decode JSON array element", e))?;
        if let Some(v) = visitor.as_deref_mut() {
            v(&item);
        }
        items.push(item);
    }
    Ok(items)
}

/// Encodes `items` as a JSON array: `[`, each element serialized and
/// comma-separated, then `]`.
pub fn encode_array<T: Serialize>(items: &[T], out: &mut impl Write) -> Result<(), Error> {
    out.write_all(b"[").map_err(|e| Error::with_source(Kind::Io, "failed writing JSON array", e))?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.write_all(b",").map_err(|e| Error::with_source(Kind::Io, "failed writing JSON array", e))?;
        }
        serde_json::to_writer(&mut *out, item)
            .map_err(|e| Error::with_source(Kind::Io, "failed serializing JSON array element", e))?;
    }
    out.write_all(b"]").map_err(|e| Error::with_source(Kind::Io, "failed writing JSON array", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
    struct Item {
        n: i32,
    }

    #[test]
    fn round_trips_a_list_of_elements() {
        let items = vec![Item { n: 1 }, Item { n: 2 }, Item { n: 3 }];
        let mut out = Vec::new();
        encode_array(&items, &mut out).unwrap();
        assert_eq!(String::from_utf8(out.clone()).unwrap(), r#"[{"n":1},{"n":2},{"n":3}]"#);

        let decoded: Vec<Item> = decode_array(&out, None).unwrap();
        assert_eq!(decoded, items);
    }

    #[test]
    fn visitor_runs_once_per_decoded_element() {
        let items = vec![Item { n: 1 }, Item { n: 2 }];
        let mut out = Vec::new();
        encode_array(&items, &mut out).unwrap();

        let mut seen = Vec::new();
        let mut visitor = |item: &Item| seen.push(item.n);
        let decoded: Vec<Item> = decode_array(&out, Some(&mut visitor)).unwrap();

        assert_eq!(seen, vec![1, 2]);
        assert_eq!(decoded.len(), 2);
    }

    #[test]
    fn empty_array_decodes_to_empty_list() {
        let decoded: Vec<Item> = decode_array(b"[]", None).unwrap();
        assert!(decoded.is_empty());
    }
}
