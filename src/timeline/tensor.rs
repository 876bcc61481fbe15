//! Parameter statistics of one tensor.
//!
//! Training frameworks report per-parameter statistics as flat keys such as
//! `main/l1/W/data/percentile/3` or `main/l1/W/grad/mean`. A [`TensorSeries`]
//! owns every such key of one object (`main/l1/W`), split into the `data` and
//! `grad` halves, and records them together whenever the object is reported.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Extract, TimeAxes, TimeStamp};
use crate::record::Record;
use crate::{Error, Result};

const PERCENTILE_PREFIX: &str = "percentile/";

/// Sigma levels of a normal distribution, indexed by `percentile/<n>`.
const PERCENTILE_LABELS: [&str; 7] = [
    "0.13%", "2.28%", "15.87%", "50%", "84.13%", "97.72%", "99.87%",
];

/// One labelled trace of a percentile plot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentileTrace {
    pub label: String,
    pub data: Vec<f64>,
}

#[derive(Debug, Clone)]
struct Tracked {
    name: String,
    key: String,
    label: String,
    values: Vec<f64>,
}

impl Tracked {
    fn trace(&self) -> PercentileTrace {
        PercentileTrace {
            label: self.label.clone(),
            data: self.values.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Half {
    percentiles: Vec<Tracked>,
    metrics: Vec<Tracked>,
}

impl Half {
    /// `keys` maps a sub-metric name (`percentile/0`, `mean`, ...) to its record key.
    fn new(keys: BTreeMap<String, String>) -> Self {
        let (percentiles, metrics): (Vec<_>, Vec<_>) = keys
            .into_iter()
            .partition(|(name, _)| name.starts_with(PERCENTILE_PREFIX));

        let mut percentiles: Vec<(String, String)> = percentiles;
        percentiles.sort_by_key(|(name, _)| (percentile_index(name), name.clone()));
        let canonical = percentiles
            .iter()
            .all(|(name, _)| canonical_label(name).is_some());

        let percentiles = percentiles
            .into_iter()
            .map(|(name, key)| {
                let label = match canonical_label(&name) {
                    Some(label) if canonical => label.to_string(),
                    _ => name.clone(),
                };
                Tracked {
                    name,
                    key,
                    label,
                    values: Vec::new(),
                }
            })
            .collect();
        let metrics = metrics
            .into_iter()
            .map(|(name, key)| Tracked {
                label: name.clone(),
                name,
                key,
                values: Vec::new(),
            })
            .collect();
        Self {
            percentiles,
            metrics,
        }
    }

    fn metric(&self, name: &str) -> Option<&Tracked> {
        self.metrics.iter().find(|t| t.name == name)
    }

    fn traces(&self) -> Vec<PercentileTrace> {
        let mut traces = Vec::with_capacity(self.percentiles.len() + 2);
        if let Some(min) = self.metric("min") {
            traces.push(min.trace());
        }
        traces.extend(self.percentiles.iter().map(Tracked::trace));
        if let Some(max) = self.metric("max") {
            traces.push(max.trace());
        }
        traces
    }
}

fn percentile_index(name: &str) -> u32 {
    name.strip_prefix(PERCENTILE_PREFIX)
        .and_then(|idx| idx.parse().ok())
        .unwrap_or(u32::MAX)
}

fn canonical_label(name: &str) -> Option<&'static str> {
    let idx = name.strip_prefix(PERCENTILE_PREFIX)?.parse::<usize>().ok()?;
    PERCENTILE_LABELS.get(idx).copied()
}

/// Grouped data/grad statistics of one object.
#[derive(Debug, Clone)]
pub struct TensorSeries {
    data: Half,
    grad: Half,
}

impl TensorSeries {
    /// Build a series from the `data` and `grad` key groups of one object.
    ///
    /// Returns `None` when there is no data percentile to gate extraction on.
    pub fn new(
        data: Option<BTreeMap<String, String>>,
        grad: Option<BTreeMap<String, String>>,
    ) -> Option<Self> {
        let data = Half::new(data.unwrap_or_default());
        if data.percentiles.is_empty() {
            return None;
        }
        let grad = Half::new(grad.unwrap_or_default());
        Some(Self { data, grad })
    }

    /// Record key whose presence marks the object as reported.
    pub fn gate_key(&self) -> &str {
        &self.data.percentiles[0].key
    }

    /// Data percentiles in ascending order, framed by `min`/`max` when reported.
    pub fn percentiles(&self) -> Vec<PercentileTrace> {
        self.data.traces()
    }

    /// Gradient percentiles in ascending order, framed by `min`/`max` when reported.
    pub fn grad_percentiles(&self) -> Vec<PercentileTrace> {
        self.grad.traces()
    }

    pub fn data(&self, name: &str) -> Option<&[f64]> {
        self.data.metric(name).map(|t| t.values.as_slice())
    }

    pub fn grad(&self, name: &str) -> Option<&[f64]> {
        self.grad.metric(name).map(|t| t.values.as_slice())
    }

    /// Number of samples recorded.
    pub fn len(&self) -> usize {
        self.data.percentiles[0].values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Extract for TensorSeries {
    fn extract(
        &mut self,
        record: &mut Record,
        axes: &mut TimeAxes,
        stamp: &TimeStamp,
    ) -> Result<bool> {
        if !record.contains(self.gate_key()) {
            return Ok(false);
        }
        axes.push(stamp);
        let tracked = self
            .data
            .percentiles
            .iter_mut()
            .chain(self.data.metrics.iter_mut())
            .chain(self.grad.percentiles.iter_mut())
            .chain(self.grad.metrics.iter_mut());
        for t in tracked {
            let value = record
                .take(&t.key)
                .ok_or_else(|| Error::KeyDisappeared(t.key.clone()))?;
            t.values.push(value);
        }
        Ok(true)
    }
}
