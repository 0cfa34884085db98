//! Line-oriented key-value storage: `<16 hex digits> <json>` per line.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::sync::Mutex;

use hashbrown::HashMap;
use serde_json::Value;

use crate::errors::{GazetteerError, Result};
use crate::ids::GeoObjectId;

/// Opens a jsonl file, transparently decompressing `.gz`.
pub fn open_jsonl(path: &Path) -> Result<Box<dyn Read + Send>> {
    let file = std::fs::File::open(path)?;
    if path.extension().is_some_and(|e| e == "gz") {
        Ok(Box::new(flate2::read::GzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}

/// Splits one line into its id key and JSON tail.
pub fn parse_key_value_line(line: &str) -> Option<(GeoObjectId, &str)> {
    let pos = line.find(' ')?;
    let id = GeoObjectId::from_hex(&line[..pos])?;
    Some((id, &line[pos + 1..]))
}

/// Serializes one line.
pub fn write_key_value_line<W: Write>(out: &mut W, id: GeoObjectId, value: &Value) -> Result<()> {
    writeln!(out, "{} {}", id.to_hex(), value)?;
    Ok(())
}

/// An in-memory jsonl store keyed by feature id.
pub struct KeyValueStorage {
    values: HashMap<u64, Value>,
}

impl KeyValueStorage {
    /// Loads a jsonl file, skipping malformed lines with a warning.
    ///
    /// `pred` filters which documents are retained.
    pub fn open<P>(path: &Path, pred: P) -> Result<Self>
    where
        P: Fn(u64, &Value) -> bool,
    {
        let reader = BufReader::new(open_jsonl(path)?);
        let mut values = HashMap::new();
        let mut line_number = 0u64;
        for line in reader.lines() {
            let line = line?;
            line_number += 1;
            if line.is_empty() || line.starts_with("version ") {
                continue;
            }
            let Some((id, json_str)) = parse_key_value_line(&line) else {
                log::warn!("cannot parse id in line {line_number}");
                continue;
            };
            match serde_json::from_str::<Value>(json_str) {
                Ok(json) => {
                    if pred(id.encoded(), &json) {
                        values.insert(id.encoded(), json);
                    }
                }
                Err(e) => {
                    log::warn!("cannot parse json in line {line_number}: {e}");
                }
            }
        }
        Ok(Self { values })
    }

    /// Looks up a document.
    pub fn find(&self, key: u64) -> Option<&Value> {
        self.values.get(&key)
    }

    /// Number of retained documents.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates all `(key, document)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &Value)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }
}

/// A jsonl writer shared by concurrent workers.
pub struct KeyValueConcurrentWriter<W: Write> {
    out: Mutex<W>,
}

impl<W: Write> KeyValueConcurrentWriter<W> {
    /// Wraps a sink.
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Appends one line.
    pub fn write(&self, id: GeoObjectId, value: &Value) -> Result<()> {
        let mut out = self.out.lock().expect("key-value writer poisoned");
        write_key_value_line(&mut *out, id, value)
    }

    /// Releases the sink.
    pub fn into_inner(self) -> W {
        self.out.into_inner().expect("key-value writer poisoned")
    }
}

/// Reads the JSON value at a dotted path of object keys.
pub fn json_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    Some(current)
}

/// Reads a string at a dotted path.
pub fn json_str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    json_at(value, path)?.as_str()
}

/// Errors for a missing obligatory field.
pub fn obligatory_str_at<'a>(value: &'a Value, path: &[&str]) -> Result<&'a str> {
    json_str_at(value, path).ok_or_else(|| {
        GazetteerError::invalid_input("json", format!("missing field {}", path.join(".")))
    })
}
