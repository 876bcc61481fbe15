//! Aggregation of a training log into named series.
//!
//! A [`TimelineHandler`] is fed the *whole* current log on every change and
//! only processes the records it has not seen yet:
//!
//! 1. The already-processed prefix is fingerprinted with blake3 and compared
//!    to the fingerprint stored by the previous cycle. A mismatch means the
//!    file was replaced rather than appended to, so every series is dropped
//!    and a new session id is issued.
//! 2. Each new record is stripped of its time axes, offered to every known
//!    series, and whatever is left is classified into new series.
//!
//! All state sits behind one mutex so that readers always see a session id
//! together with the series that belong to it.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use log::debug;
use serde::Serialize;

use crate::classify::{find_confident_key, find_time_axis_key, group_tensor_keys};
use crate::config::{BoardConfig, TimeKeyNames};
use crate::loader;
use crate::record::{RawRecord, Record};
use crate::timeline::scalar::is_std_key;
use crate::timeline::{
    EventSeries, EventTimeline, PercentileTrace, RatioSeries, ScalarSeries, TensorSeries,
    TensorTimeline, TimeStamp, Timeline,
};
use crate::token::random_token;
use crate::{Error, Result};

const RATIO_TOTAL_KEY: &str = "main/total";
const RATIO_CORRECT_KEY: &str = "main/correct";
const CONFIDENT_METRICS: [&str; 2] = ["loss", "accuracy"];

/// Outcome of one [`TimelineHandler::update`] cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub session_id: String,
    /// The previous session was discarded.
    pub reset: bool,
    /// Records processed by this cycle.
    pub processed: usize,
    pub new_events: Vec<String>,
    pub new_tensors: Vec<String>,
}

/// Copy of one event series, taken under the handler lock.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSnapshot {
    pub session_id: String,
    pub epoch: Option<Vec<u64>>,
    pub iteration: Option<Vec<u64>>,
    pub elapsed_time: Option<Vec<f64>>,
    pub values: Vec<f64>,
    pub state_hash: String,
}

/// Copy of one tensor series, taken under the handler lock.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TensorSnapshot {
    pub session_id: String,
    pub epoch: Option<Vec<u64>>,
    pub iteration: Option<Vec<u64>>,
    pub elapsed_time: Option<Vec<f64>>,
    pub percentiles: Vec<PercentileTrace>,
    pub grad_percentiles: Vec<PercentileTrace>,
    pub state_hash: String,
}

/// Record keys carrying the time axes, fixed by the first record of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TimeKeys {
    epoch: Option<String>,
    iteration: Option<String>,
    elapsed_time: Option<String>,
}

impl TimeKeys {
    fn discover(record: &Record, names: &TimeKeyNames) -> Result<Self> {
        let keys = Self {
            epoch: find_time_axis_key(record, &names.epoch),
            iteration: find_time_axis_key(record, &names.iteration),
            elapsed_time: find_time_axis_key(record, &names.elapsed_time),
        };
        if keys.epoch.is_none() && keys.iteration.is_none() && keys.elapsed_time.is_none() {
            return Err(Error::Parse(format!(
                "none of {}, {} and {} was found in the first record",
                names.epoch, names.iteration, names.elapsed_time
            )));
        }
        debug!("time keys: {keys:?}");
        Ok(keys)
    }

    fn extract(&self, record: &mut Record) -> Result<TimeStamp> {
        let epoch = take_axis(record, self.epoch.as_deref())?;
        let iteration = take_axis(record, self.iteration.as_deref())?;
        let elapsed_time = take_axis(record, self.elapsed_time.as_deref())?;
        Ok(TimeStamp {
            epoch: epoch.map(|(key, v)| to_step(key, v)).transpose()?,
            iteration: iteration.map(|(key, v)| to_step(key, v)).transpose()?,
            elapsed_time: elapsed_time.map(|(_, v)| v),
        })
    }
}

fn take_axis<'k>(record: &mut Record, key: Option<&'k str>) -> Result<Option<(&'k str, f64)>> {
    let Some(key) = key else {
        return Ok(None);
    };
    record
        .take(key)
        .map(|v| Some((key, v)))
        .ok_or_else(|| Error::KeyDisappeared(key.to_string()))
}

fn to_step(key: &str, value: f64) -> Result<u64> {
    // u64::MAX as f64 rounds up to 2^64, which no longer fits.
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value < u64::MAX as f64 {
        Ok(value as u64)
    } else {
        Err(Error::InvalidAxisValue {
            key: key.to_string(),
            value,
        })
    }
}

/// Content fingerprint of a record sequence.
fn fingerprint(records: &[RawRecord]) -> Result<blake3::Hash> {
    let mut hasher = blake3::Hasher::new();
    for record in records {
        serde_json::to_writer(&mut hasher, record)?;
        hasher.update(b"\n");
    }
    Ok(hasher.finalize())
}

#[derive(Debug)]
pub(crate) struct State {
    pub(crate) events: BTreeMap<String, EventTimeline>,
    pub(crate) tensors: BTreeMap<String, TensorTimeline>,
    pub(crate) session_id: String,
    time_keys: Option<TimeKeys>,
    done: usize,
    digest: Option<blake3::Hash>,
}

impl State {
    fn new(token_len: usize) -> Self {
        Self {
            events: BTreeMap::new(),
            tensors: BTreeMap::new(),
            session_id: random_token(token_len),
            time_keys: None,
            done: 0,
            digest: None,
        }
    }

    fn update(&mut self, records: &[RawRecord], config: &BoardConfig) -> Result<UpdateReport> {
        let prefix_matches = match (records.get(..self.done), self.digest) {
            (Some(prefix), Some(digest)) => fingerprint(prefix)? == digest,
            _ => false,
        };
        let mut report = UpdateReport::default();
        if !prefix_matches {
            let old_session = std::mem::take(&mut self.session_id);
            *self = State::new(config.token_len);
            debug!(
                "digest mismatch; new session ({old_session} -> {})",
                self.session_id
            );
            report.reset = true;
        }
        report.session_id = self.session_id.clone();

        if records.len() <= self.done {
            return Ok(report);
        }
        // Stays describing the full sequence if a record fails below, which
        // forces a rebuild on the next cycle.
        self.digest = Some(fingerprint(records)?);
        while self.done < records.len() {
            self.extract(&records[self.done], config, &mut report)?;
            self.done += 1;
            report.processed += 1;
        }
        debug!("parsed up to record {}", self.done);
        Ok(report)
    }

    fn extract(
        &mut self,
        raw: &RawRecord,
        config: &BoardConfig,
        report: &mut UpdateReport,
    ) -> Result<()> {
        let mut record = Record::from_raw(raw);
        let keys = match self.time_keys.take() {
            Some(keys) => keys,
            None => TimeKeys::discover(&record, &config.time_keys)?,
        };
        let stamp = keys.extract(&mut record);
        self.time_keys = Some(keys);
        let stamp = stamp?;

        for timeline in self.events.values_mut() {
            timeline.extract_value(&mut record, &stamp)?;
        }
        for timeline in self.tensors.values_mut() {
            timeline.extract_value(&mut record, &stamp)?;
        }

        self.identify_predefined(&mut record, &stamp, config.token_len, report)?;
        self.identify_tensors(&mut record, &stamp, config.token_len, report)?;
        self.identify_misc(&mut record, &stamp, config.token_len, report)?;

        if !record.is_empty() {
            debug!("ignored keys: {}", record.remaining_keys().join(", "));
        }
        Ok(())
    }

    /// Loss, accuracy and the micro-averaged `main/correct` ratio.
    fn identify_predefined(
        &mut self,
        record: &mut Record,
        stamp: &TimeStamp,
        token_len: usize,
        report: &mut UpdateReport,
    ) -> Result<()> {
        let mut found = BTreeMap::new();
        for canonical in CONFIDENT_METRICS {
            if let Some(key) = find_confident_key(record, canonical) {
                found.insert(key.clone(), EventSeries::Scalar(ScalarSeries::new(key)));
            }
        }
        if record.contains(RATIO_TOTAL_KEY) && record.contains(RATIO_CORRECT_KEY) {
            found.insert(
                RATIO_CORRECT_KEY.to_string(),
                EventSeries::Ratio(RatioSeries::new(RATIO_TOTAL_KEY, RATIO_CORRECT_KEY)),
            );
        }
        for (id, series) in found {
            self.adopt_event(id, series, record, stamp, token_len, report)?;
        }
        Ok(())
    }

    fn identify_tensors(
        &mut self,
        record: &mut Record,
        stamp: &TimeStamp,
        token_len: usize,
        report: &mut UpdateReport,
    ) -> Result<()> {
        for (group, keys) in group_tensor_keys(record) {
            if self.tensors.contains_key(&group) {
                continue;
            }
            let Some(series) = TensorSeries::new(keys.data, keys.grad) else {
                debug!("tensor group {group} has no data percentiles yet");
                continue;
            };
            let mut timeline = Timeline::new(series, token_len);
            timeline.extract_value(record, stamp)?;
            report.new_tensors.push(group.clone());
            self.tensors.insert(group, timeline);
        }
        Ok(())
    }

    /// Every other key becomes a plain series of its own, including stray
    /// keys of a known tensor group.
    fn identify_misc(
        &mut self,
        record: &mut Record,
        stamp: &TimeStamp,
        token_len: usize,
        report: &mut UpdateReport,
    ) -> Result<()> {
        for key in record.remaining_keys() {
            if is_std_key(&key) || self.events.contains_key(&key) {
                continue;
            }
            let series = EventSeries::Scalar(ScalarSeries::new(key.clone()));
            self.adopt_event(key, series, record, stamp, token_len, report)?;
        }
        Ok(())
    }

    fn adopt_event(
        &mut self,
        id: String,
        series: EventSeries,
        record: &mut Record,
        stamp: &TimeStamp,
        token_len: usize,
        report: &mut UpdateReport,
    ) -> Result<()> {
        let mut timeline = Timeline::new(series, token_len);
        timeline.extract_value(record, stamp)?;
        report.new_events.push(id.clone());
        self.events.insert(id, timeline);
        Ok(())
    }
}

/// Thread-safe aggregate of every series found in one training log.
#[derive(Debug)]
pub struct TimelineHandler {
    config: BoardConfig,
    state: Mutex<State>,
}

impl Default for TimelineHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl TimelineHandler {
    pub fn new() -> Self {
        Self::with_config(BoardConfig::default())
    }

    pub fn with_config(config: BoardConfig) -> Self {
        let state = Mutex::new(State::new(config.token_len));
        Self { config, state }
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| Error::Poisoned)
    }

    /// Ingest the full current log.
    ///
    /// Records already processed are skipped; calling this again with the
    /// same sequence is a no-op. A sequence that does not extend the previous
    /// one starts a new session.
    ///
    /// # Errors
    ///
    /// - `Error::Parse`: no time axis in the first record
    /// - `Error::KeyDisappeared`: a key seen earlier is missing from a record
    /// - `Error::InvalidAxisValue`: a non integer-like epoch or iteration
    pub fn update(&self, records: &[RawRecord]) -> Result<UpdateReport> {
        let mut state = self.lock()?;
        state.update(records, &self.config)
    }

    /// Read `path` as a JSON array of records and ingest it.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<UpdateReport> {
        let records = loader::read_records(path)?;
        self.update(&records)
    }

    pub fn session_id(&self) -> Result<String> {
        Ok(self.lock()?.session_id.clone())
    }

    pub fn event_series_ids(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.events.keys().cloned().collect())
    }

    pub fn tensor_series_ids(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.tensors.keys().cloned().collect())
    }

    pub fn event_snapshot(&self, id: &str) -> Result<Option<EventSnapshot>> {
        let state = self.lock()?;
        Ok(state.events.get(id).map(|t| EventSnapshot {
            session_id: state.session_id.clone(),
            epoch: t.epoch().map(<[u64]>::to_vec),
            iteration: t.iteration().map(<[u64]>::to_vec),
            elapsed_time: t.elapsed_time().map(<[f64]>::to_vec),
            values: t.series().values().to_vec(),
            state_hash: t.state_hash().to_string(),
        }))
    }

    pub fn tensor_snapshot(&self, id: &str) -> Result<Option<TensorSnapshot>> {
        let state = self.lock()?;
        Ok(state.tensors.get(id).map(|t| TensorSnapshot {
            session_id: state.session_id.clone(),
            epoch: t.epoch().map(<[u64]>::to_vec),
            iteration: t.iteration().map(<[u64]>::to_vec),
            elapsed_time: t.elapsed_time().map(<[f64]>::to_vec),
            percentiles: t.series().percentiles(),
            grad_percentiles: t.series().grad_percentiles(),
            state_hash: t.state_hash().to_string(),
        }))
    }
}
