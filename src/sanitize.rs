//! Plot value sanitizing.
//!
//! JSON has no representation for non-finite numbers and browsers overflow on
//! values near `f64::MAX`, so such values are replaced by the `"nan"` marker
//! plotting libraries understand.

use serde::{Serialize, Serializer};

use crate::{Error, Result};

/// Largest magnitude passed through unchanged.
pub const FLOAT_CUTOFF: f64 = f64::MAX;

/// A plot value: a finite number or the `"nan"` marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Plotted {
    Value(f64),
    Nan,
}

impl Plotted {
    pub fn from_f64(value: f64) -> Self {
        if value.is_finite() && value.abs() <= FLOAT_CUTOFF {
            Plotted::Value(value)
        } else {
            Plotted::Nan
        }
    }
}

impl Serialize for Plotted {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Plotted::Value(v) => serializer.serialize_f64(*v),
            Plotted::Nan => serializer.serialize_str("nan"),
        }
    }
}

/// Sanitize `y` for plotting against `x`. `x` itself is not inspected.
pub fn cleanse_plot<X>(x: &[X], y: &[f64]) -> Result<Vec<Plotted>> {
    if x.len() != y.len() {
        return Err(Error::LengthMismatch {
            x: x.len(),
            y: y.len(),
        });
    }
    Ok(cleanse(y))
}

pub fn cleanse(y: &[f64]) -> Vec<Plotted> {
    y.iter().copied().map(Plotted::from_f64).collect()
}
