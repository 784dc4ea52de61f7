/// Key path lookup and sort-key extraction for fjsort.
///
/// A key path is a list of tokens walked from the root of each record.
/// Objects are indexed by field name, arrays by a decimal index; anything
/// else ends the walk with "absent".
///
/// The walk runs over `RawValue`s borrowed from the record, so the key handed
/// to the sorter is the source text of the value, escapes and number spelling
/// included.
use std::fmt;

use serde::de::{Deserializer as _, MapAccess, Visitor};
use serde_json::value::RawValue;

use super::error::{JsortError, Result};

/// Ordered field/index tokens locating the sort key inside a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPath {
    segments: Vec<String>,
}

impl KeyPath {
    /// Build a key path; at least one segment is required.
    pub fn new<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(JsortError::Config(
                "you must specify a path to the sort key".to_string(),
            ));
        }
        Ok(KeyPath { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Walk the path from `root`. Returns `Ok(None)` if any step does not resolve.
    pub fn lookup<'a>(
        &self,
        root: &'a RawValue,
    ) -> std::result::Result<Option<&'a RawValue>, serde_json::Error> {
        let mut cur = root;
        for seg in &self.segments {
            cur = match step(cur, seg)? {
                Some(next) => next,
                None => return Ok(None),
            };
        }
        Ok(Some(cur))
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// Resolve one path token against `value`.
fn step<'a>(
    value: &'a RawValue,
    seg: &str,
) -> std::result::Result<Option<&'a RawValue>, serde_json::Error> {
    let text = value.get();
    match text.as_bytes().first() {
        Some(b'{') => {
            let mut de = serde_json::Deserializer::from_str(text);
            (&mut de).deserialize_map(FirstMember(seg))
        }
        Some(b'[') => {
            let Ok(index) = seg.parse::<usize>() else {
                return Ok(None);
            };
            let items: Vec<&'a RawValue> = serde_json::from_str(text)?;
            Ok(items.get(index).copied())
        }
        _ => Ok(None),
    }
}

/// Map visitor yielding the first member named `.0`.
///
/// Later duplicates of the same name are skipped.
struct FirstMember<'s>(&'s str);

impl<'de> Visitor<'de> for FirstMember<'_> {
    type Value = Option<&'de RawValue>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(
        self,
        mut map: A,
    ) -> std::result::Result<Self::Value, A::Error> {
        let mut found = None;
        while let Some(name) = map.next_key::<String>()? {
            let value: &'de RawValue = map.next_value()?;
            if found.is_none() && name == self.0 {
                found = Some(value);
            }
        }
        Ok(found)
    }
}

/// Turn a key value into the bytes handed to the sorter.
///
/// Strings lose their surrounding quotes and keep their source escapes.
/// Numbers and literals are passed through as written, so `1` and `1.0`
/// produce different keys. Objects and arrays are compacted.
pub fn key_bytes(value: &RawValue) -> Vec<u8> {
    let text = value.get().as_bytes();
    match text.first() {
        Some(b'"') => text
            .strip_prefix(b"\"")
            .and_then(|t| t.strip_suffix(b"\""))
            .unwrap_or_default()
            .to_vec(),
        Some(b'{' | b'[') => compact(text),
        _ => text.to_vec(),
    }
}

/// Drop insignificant whitespace from valid JSON text.
fn compact(text: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    for &b in text {
        if in_string {
            out.push(b);
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
        } else if !matches!(b, b' ' | b'\t' | b'\n' | b'\r') {
            in_string = b == b'"';
            out.push(b);
        }
    }
    out
}

/// Parse one record and extract the bytes at `path`.
///
/// The whole record is validated even when the key sits early in it.
/// `Ok(None)` means the path did not resolve; that is not an error.
pub fn extract_key(
    record: &[u8],
    path: &KeyPath,
) -> std::result::Result<Option<Vec<u8>>, serde_json::Error> {
    let root: &RawValue = serde_json::from_slice(record)?;
    Ok(path.lookup(root)?.map(key_bytes))
}
