//! Key-name heuristics used to discover series in a record.
//!
//! Every function here is a pure inspection of one record's key set. They are
//! best-effort pattern matches, tuned to be conservative where a false
//! positive would mislabel a metric.

use std::collections::BTreeMap;

use log::warn;

use crate::record::Record;
use crate::timeline::scalar::is_std_key;

const DATA_MARKER: &str = "/data/";
const GRAD_MARKER: &str = "/grad/";

/// Which half of a tensor group a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorPart {
    Data,
    Grad,
}

/// Record keys of one tensor object, by sub-metric name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TensorKeys {
    pub data: Option<BTreeMap<String, String>>,
    pub grad: Option<BTreeMap<String, String>>,
}

/// Find the key carrying a time axis.
///
/// An exact match wins; otherwise the first key containing `canonical` is
/// used, with a warning when the choice is ambiguous.
pub fn find_time_axis_key(record: &Record, canonical: &str) -> Option<String> {
    if record.contains(canonical) {
        return Some(canonical.to_string());
    }
    let candidates: Vec<&str> = record.keys().filter(|k| k.contains(canonical)).collect();
    if candidates.len() > 1 {
        warn!("multiple matches for key {canonical}: {candidates:?}");
    }
    candidates.first().map(|k| k.to_string())
}

/// Find a key only when the match is unambiguous.
///
/// `main/<canonical>` is preferred; otherwise exactly one key must end with
/// `canonical`.
pub fn find_confident_key(record: &Record, canonical: &str) -> Option<String> {
    let default = format!("main/{canonical}");
    if record.contains(&default) {
        return Some(default);
    }
    let mut matches = record.keys().filter(|k| k.ends_with(canonical));
    let found = matches.next()?;
    if matches.next().is_some() {
        return None;
    }
    Some(found.to_string())
}

/// Split `<group>/data/<name>` or `<group>/grad/<name>`.
pub fn split_tensor_key(key: &str) -> Option<(&str, TensorPart, &str)> {
    if let Some(idx) = key.find(DATA_MARKER) {
        return Some((&key[..idx], TensorPart::Data, &key[idx + DATA_MARKER.len()..]));
    }
    key.find(GRAD_MARKER)
        .map(|idx| (&key[..idx], TensorPart::Grad, &key[idx + GRAD_MARKER.len()..]))
}

/// Group parameter-statistics keys by the object they describe.
///
/// `.std` companions are skipped. A group only gets a `data` or `grad` map
/// when at least one key of that half was seen.
pub fn group_tensor_keys(record: &Record) -> BTreeMap<String, TensorKeys> {
    let mut groups: BTreeMap<String, TensorKeys> = BTreeMap::new();
    for key in record.keys().filter(|k| !is_std_key(k)) {
        let Some((group, part, name)) = split_tensor_key(key) else {
            continue;
        };
        let entry = groups.entry(group.to_string()).or_default();
        let half = match part {
            TensorPart::Data => &mut entry.data,
            TensorPart::Grad => &mut entry.grad,
        };
        half.get_or_insert_with(BTreeMap::new)
            .insert(name.to_string(), key.to_string());
    }
    groups
}
