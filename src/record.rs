//! One reported snapshot of the training log.
//!
//! A [`Record`] owns the numeric values of a raw JSON object. Series consume
//! keys out of it with [`Record::take`]; whatever remains after every pass is
//! what the classifier still has to explain.

use std::collections::BTreeMap;

use log::trace;
use serde_json::Value;

/// A record as it appears in the log file.
pub type RawRecord = serde_json::Map<String, Value>;

/// Numeric view of a raw record, keyed in sorted order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: BTreeMap<String, f64>,
}

impl Record {
    pub fn from_raw(raw: &RawRecord) -> Self {
        let mut values = BTreeMap::new();
        for (key, value) in raw {
            match numeric_value(value) {
                Some(v) => {
                    values.insert(key.clone(), v);
                }
                None => trace!("ignoring non-numeric value for key {key}: {value}"),
            }
        }
        Self { values }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    /// Remove `key` and return its value.
    pub fn take(&mut self, key: &str) -> Option<f64> {
        self.values.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Snapshot of the keys still present, safe to iterate while taking.
    pub fn remaining_keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Numbers, plus the quoted non-finite literals the loader produces.
fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            _ => None,
        },
        _ => None,
    }
}
