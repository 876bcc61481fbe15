//! Append-only metric histories.
//!
//! A [`Timeline`] wraps one extraction strategy (anything implementing
//! [`Extract`]) with the bookkeeping every series shares:
//!
//! - **Axes**: the first extraction fixes which of epoch, iteration and
//!   elapsed time the series tracks. Later stamps must carry the same set.
//! - **State hash**: an opaque token replaced whenever an extraction reports
//!   new data, so readers can tell whether their cached copy is stale.
//!
//! The concrete strategies live in [`scalar`], [`ratio`] and [`tensor`].

pub mod ratio;
pub mod scalar;
pub mod tensor;

pub use ratio::RatioSeries;
pub use scalar::ScalarSeries;
pub use tensor::{PercentileTrace, TensorSeries};

use crate::record::Record;
use crate::token::random_token;
use crate::{Error, Result};

/// Time-axis values popped from one record.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeStamp {
    pub epoch: Option<u64>,
    pub iteration: Option<u64>,
    pub elapsed_time: Option<f64>,
}

/// Parallel axis histories. An axis is `None` when the series does not track it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeAxes {
    epoch: Option<Vec<u64>>,
    iteration: Option<Vec<u64>>,
    elapsed_time: Option<Vec<f64>>,
}

impl TimeAxes {
    /// Empty histories for exactly the axes present in `stamp`.
    pub fn tracking(stamp: &TimeStamp) -> Self {
        Self {
            epoch: stamp.epoch.map(|_| Vec::new()),
            iteration: stamp.iteration.map(|_| Vec::new()),
            elapsed_time: stamp.elapsed_time.map(|_| Vec::new()),
        }
    }

    pub fn check(&self, stamp: &TimeStamp) -> Result<()> {
        if self.epoch.is_some() != stamp.epoch.is_some() {
            return Err(Error::AxisMismatch { axis: "epoch" });
        }
        if self.iteration.is_some() != stamp.iteration.is_some() {
            return Err(Error::AxisMismatch { axis: "iteration" });
        }
        if self.elapsed_time.is_some() != stamp.elapsed_time.is_some() {
            return Err(Error::AxisMismatch {
                axis: "elapsed_time",
            });
        }
        Ok(())
    }

    /// Append one sample. The stamp must already have passed [`TimeAxes::check`].
    pub fn push(&mut self, stamp: &TimeStamp) {
        if let (Some(axis), Some(v)) = (self.epoch.as_mut(), stamp.epoch) {
            axis.push(v);
        }
        if let (Some(axis), Some(v)) = (self.iteration.as_mut(), stamp.iteration) {
            axis.push(v);
        }
        if let (Some(axis), Some(v)) = (self.elapsed_time.as_mut(), stamp.elapsed_time) {
            axis.push(v);
        }
    }

    pub fn epoch(&self) -> Option<&[u64]> {
        self.epoch.as_deref()
    }

    pub fn iteration(&self) -> Option<&[u64]> {
        self.iteration.as_deref()
    }

    pub fn elapsed_time(&self) -> Option<&[f64]> {
        self.elapsed_time.as_deref()
    }
}

/// Extraction strategy of a series.
pub trait Extract {
    /// Consume the keys this series owns from `record`, appending to `axes`
    /// and to the series' own values when a sample is recorded.
    ///
    /// Returns `true` if anything relevant was found in the record.
    fn extract(
        &mut self,
        record: &mut Record,
        axes: &mut TimeAxes,
        stamp: &TimeStamp,
    ) -> Result<bool>;
}

/// A named series together with its axes and state hash.
#[derive(Debug, Clone)]
pub struct Timeline<S> {
    series: S,
    axes: Option<TimeAxes>,
    state_hash: String,
    token_len: usize,
}

impl<S: Extract> Timeline<S> {
    pub fn new(series: S, token_len: usize) -> Self {
        Self {
            series,
            axes: None,
            state_hash: random_token(token_len),
            token_len,
        }
    }

    /// Feed one record to the series.
    ///
    /// The state hash is refreshed iff the extraction reported an update.
    pub fn extract_value(&mut self, record: &mut Record, stamp: &TimeStamp) -> Result<bool> {
        let axes = self.axes.get_or_insert_with(|| TimeAxes::tracking(stamp));
        axes.check(stamp)?;
        let updated = self.series.extract(record, axes, stamp)?;
        if updated {
            self.state_hash = random_token(self.token_len);
        }
        Ok(updated)
    }
}

impl<S> Timeline<S> {
    pub fn series(&self) -> &S {
        &self.series
    }

    pub fn state_hash(&self) -> &str {
        &self.state_hash
    }

    pub fn axes(&self) -> Option<&TimeAxes> {
        self.axes.as_ref()
    }

    pub fn epoch(&self) -> Option<&[u64]> {
        self.axes.as_ref().and_then(TimeAxes::epoch)
    }

    pub fn iteration(&self) -> Option<&[u64]> {
        self.axes.as_ref().and_then(TimeAxes::iteration)
    }

    pub fn elapsed_time(&self) -> Option<&[f64]> {
        self.axes.as_ref().and_then(TimeAxes::elapsed_time)
    }
}

/// Series living in the "events" bucket.
#[derive(Debug, Clone)]
pub enum EventSeries {
    Scalar(ScalarSeries),
    Ratio(RatioSeries),
}

impl EventSeries {
    pub fn values(&self) -> &[f64] {
        match self {
            EventSeries::Scalar(series) => series.values(),
            EventSeries::Ratio(series) => series.values(),
        }
    }
}

impl Extract for EventSeries {
    fn extract(
        &mut self,
        record: &mut Record,
        axes: &mut TimeAxes,
        stamp: &TimeStamp,
    ) -> Result<bool> {
        match self {
            EventSeries::Scalar(series) => series.extract(record, axes, stamp),
            EventSeries::Ratio(series) => series.extract(record, axes, stamp),
        }
    }
}

pub type EventTimeline = Timeline<EventSeries>;
pub type TensorTimeline = Timeline<TensorSeries>;
