use super::{Extract, TimeAxes, TimeStamp};
use crate::record::Record;
use crate::Result;

const STD_SUFFIX: &str = ".std";

/// Plain metric history. The `<key>.std` companion is consumed but not kept.
#[derive(Debug, Clone)]
pub struct ScalarSeries {
    key: String,
    key_std: String,
    values: Vec<f64>,
}

impl ScalarSeries {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        let key_std = format!("{key}{STD_SUFFIX}");
        Self {
            key,
            key_std,
            values: Vec::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

impl Extract for ScalarSeries {
    fn extract(
        &mut self,
        record: &mut Record,
        axes: &mut TimeAxes,
        stamp: &TimeStamp,
    ) -> Result<bool> {
        let mut updated = record.take(&self.key_std).is_some();
        if let Some(value) = record.take(&self.key) {
            self.values.push(value);
            axes.push(stamp);
            updated = true;
        }
        Ok(updated)
    }
}

/// True for standard-deviation companion keys.
pub fn is_std_key(key: &str) -> bool {
    key.ends_with(STD_SUFFIX)
}
