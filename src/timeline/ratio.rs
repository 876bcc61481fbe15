use super::{Extract, TimeAxes, TimeStamp};
use crate::record::Record;
use crate::{Error, Result};

/// Micro-averaged metric: `correct / total` from two counters reported together.
#[derive(Debug, Clone)]
pub struct RatioSeries {
    total_key: String,
    correct_key: String,
    values: Vec<f64>,
}

impl RatioSeries {
    pub fn new(total_key: impl Into<String>, correct_key: impl Into<String>) -> Self {
        Self {
            total_key: total_key.into(),
            correct_key: correct_key.into(),
            values: Vec::new(),
        }
    }

    pub fn total_key(&self) -> &str {
        &self.total_key
    }

    pub fn correct_key(&self) -> &str {
        &self.correct_key
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

impl Extract for RatioSeries {
    fn extract(
        &mut self,
        record: &mut Record,
        axes: &mut TimeAxes,
        stamp: &TimeStamp,
    ) -> Result<bool> {
        let Some(correct) = record.take(&self.correct_key) else {
            if record.contains(&self.total_key) {
                return Err(Error::KeyDisappeared(self.correct_key.clone()));
            }
            return Ok(false);
        };
        let total = record
            .take(&self.total_key)
            .ok_or_else(|| Error::KeyDisappeared(self.total_key.clone()))?;
        self.values.push(correct / total);
        axes.push(stamp);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp() -> TimeStamp {
        TimeStamp {
            iteration: Some(1),
            ..TimeStamp::default()
        }
    }

    fn series() -> RatioSeries {
        RatioSeries::new("main/total", "main/correct")
    }

    #[test]
    fn computes_ratio() {
        let mut series = series();
        let mut axes = TimeAxes::tracking(&stamp());
        let mut record: Record = [("main/total", 10.0), ("main/correct", 4.0)]
            .into_iter()
            .collect();

        assert!(series.extract(&mut record, &mut axes, &stamp()).unwrap());
        assert_eq!(series.values(), &[0.4]);
        assert_eq!(axes.iteration(), Some(&[1][..]));
        assert!(record.is_empty());
    }

    #[test]
    fn missing_total_is_fatal() {
        let mut series = series();
        let mut axes = TimeAxes::tracking(&stamp());
        let mut record: Record = [("main/correct", 4.0)].into_iter().collect();

        let err = series.extract(&mut record, &mut axes, &stamp()).unwrap_err();
        assert!(matches!(err, Error::KeyDisappeared(ref key) if key == "main/total"));
    }

    #[test]
    fn missing_correct_is_fatal() {
        let mut series = series();
        let mut axes = TimeAxes::tracking(&stamp());
        let mut record: Record = [("main/total", 10.0)].into_iter().collect();

        let err = series.extract(&mut record, &mut axes, &stamp()).unwrap_err();
        assert!(matches!(err, Error::KeyDisappeared(ref key) if key == "main/correct"));
    }

    #[test]
    fn absent_pair_is_not_an_update() {
        let mut series = series();
        let mut axes = TimeAxes::tracking(&stamp());
        let mut record: Record = [("main/loss", 1.0)].into_iter().collect();

        assert!(!series.extract(&mut record, &mut axes, &stamp()).unwrap());
        assert!(series.values().is_empty());
    }
}
