//! Conversion between stored bytes and typed documents.
//!
//! Reading never fails: an unreadable or empty document decodes to the
//! empty default, and collections with the wrong JSON shape are reset to
//! empty ones. A record that does not fit its model is dropped on its own
//! and the result is flagged as degraded, so callers can refuse to write
//! it back over the remote. Writing checks the document's invariants first.

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::models::Metadata;

/// A whole JSON document persisted as a single remote object.
pub trait Document: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static {
    /// Top-level keys that must hold arrays.
    const ARRAYS: &'static [&'static str];
    /// Top-level keys that must hold objects.
    const OBJECTS: &'static [&'static str];

    fn metadata_mut(&mut self) -> &mut Metadata;

    /// Checked before every write against the version the write started
    /// from. A failure aborts the write.
    fn check_invariants(&self, _previous: &Self) -> Result<()> {
        Ok(())
    }
}

/// Result of [`decode`].
#[derive(Debug, Clone)]
pub struct Decoded<D> {
    pub document: D,
    /// Set when stored content was discarded to produce `document`
    pub degraded: bool,
}

impl<D> Decoded<D> {
    fn intact(document: D) -> Self {
        Self {
            document,
            degraded: false,
        }
    }

    fn degraded(document: D) -> Self {
        Self {
            document,
            degraded: true,
        }
    }
}

pub fn decode<D: Document>(bytes: &[u8]) -> Decoded<D> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Decoded::intact(D::default());
    }

    let value: Value = match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(error = %e, "Stored document is not valid JSON, using empty document");
            return Decoded::degraded(D::default());
        }
    };

    let Value::Object(mut map) = value else {
        tracing::error!("Stored document is not a JSON object, using empty document");
        return Decoded::degraded(D::default());
    };
    normalize(&mut map, D::ARRAYS, D::OBJECTS);

    match parse::<D>(&map) {
        Ok(doc) => Decoded::intact(doc),
        Err(e) => {
            tracing::error!(error = %e, "Stored document has malformed records, salvaging the rest");
            salvage(map)
        }
    }
}

fn parse<D: Document>(map: &Map<String, Value>) -> serde_json::Result<D> {
    serde_json::from_value(Value::Object(map.clone()))
}

/// Drop the individual records that fail to decode and keep everything else.
fn salvage<D: Document>(mut map: Map<String, Value>) -> Decoded<D> {
    let mut skeleton = map.clone();
    for &key in D::ARRAYS {
        skeleton.insert(key.to_string(), Value::Array(Vec::new()));
    }
    if let Err(e) = parse::<D>(&skeleton) {
        tracing::error!(error = %e, "Stored document is unreadable outside its collections, using empty document");
        return Decoded::degraded(D::default());
    }

    for &key in D::ARRAYS {
        let Some(Value::Array(records)) = map.remove(key) else {
            continue;
        };
        let mut kept = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            skeleton.insert(key.to_string(), Value::Array(vec![record]));
            let checked = parse::<D>(&skeleton);
            let Some(Value::Array(mut single)) = skeleton.remove(key) else {
                continue;
            };
            match (checked, single.pop()) {
                (Ok(_), Some(record)) => kept.push(record),
                (Err(e), _) => {
                    tracing::warn!(collection = key, index, error = %e, "Dropping malformed record");
                }
                (Ok(_), None) => {}
            }
        }
        skeleton.insert(key.to_string(), Value::Array(Vec::new()));
        map.insert(key.to_string(), Value::Array(kept));
    }

    match parse::<D>(&map) {
        Ok(doc) => Decoded::degraded(doc),
        Err(e) => {
            tracing::error!(error = %e, "Salvaged document still unreadable, using empty document");
            Decoded::degraded(D::default())
        }
    }
}

/// Reset every listed collection that is missing or has the wrong shape.
fn normalize(map: &mut Map<String, Value>, arrays: &[&str], objects: &[&str]) {
    for &key in arrays {
        if !map.get(key).is_some_and(Value::is_array) {
            if map.contains_key(key) {
                tracing::warn!(field = key, "Expected an array, resetting to empty");
            }
            map.insert(key.to_string(), Value::Array(Vec::new()));
        }
    }
    for &key in objects {
        if !map.get(key).is_some_and(Value::is_object) {
            if map.contains_key(key) {
                tracing::warn!(field = key, "Expected an object, resetting to empty");
            }
            map.insert(key.to_string(), Value::Object(Map::new()));
        }
    }
}

/// Check invariants against `previous`, stamp `metadata.lastUpdated` and
/// render pretty JSON. Pass `&D::default()` when there is no prior version.
pub fn encode<D: Document>(doc: &mut D, previous: &D) -> Result<Vec<u8>> {
    doc.check_invariants(previous)?;
    doc.metadata_mut().last_updated = Utc::now();
    let mut bytes = serde_json::to_vec_pretty(doc)?;
    bytes.push(b'\n');
    Ok(bytes)
}
