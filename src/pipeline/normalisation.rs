//! Intensity normalisation stages
//!
//! A normalisation is applied to the magnitude tensor before inference and
//! undone on the model output. Each stage remembers what it measured on the
//! forward pass so the inverse restores the original intensity range.

use ndarray::ArrayD;

/// Reversible intensity mapping
pub trait Normalisation {
    /// Normalise `data`, recording whatever the inverse needs
    fn apply(&mut self, data: ArrayD<f32>) -> ArrayD<f32>;

    /// Undo the last [`apply`](Normalisation::apply)
    fn apply_inverse(&self, data: ArrayD<f32>) -> ArrayD<f32>;
}

/// Leaves data untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityNormalisation;

impl Normalisation for IdentityNormalisation {
    fn apply(&mut self, data: ArrayD<f32>) -> ArrayD<f32> {
        data
    }

    fn apply_inverse(&self, data: ArrayD<f32>) -> ArrayD<f32> {
        data
    }
}

/// Linear rescale of the measured range onto `[min, max]`
///
/// A constant input maps to `min`.
#[derive(Debug, Clone)]
pub struct MinMaxNormalisation {
    min: f32,
    max: f32,
    measured: Option<(f32, f32)>,
}

impl MinMaxNormalisation {
    /// Rescale onto `[min, max]`
    pub fn new(min: f32, max: f32) -> Self {
        MinMaxNormalisation {
            min,
            max,
            measured: None,
        }
    }

    /// Range measured by the last forward pass
    pub fn measured(&self) -> Option<(f32, f32)> {
        self.measured
    }
}

impl Normalisation for MinMaxNormalisation {
    fn apply(&mut self, data: ArrayD<f32>) -> ArrayD<f32> {
        let Some((lo, hi)) = min_max(&data) else {
            return data;
        };
        self.measured = Some((lo, hi));

        let span = hi - lo;
        let (min, max) = (self.min, self.max);
        if span == 0.0 {
            return data.mapv(|_| min);
        }
        data.mapv(|v| (v - lo) / span * (max - min) + min)
    }

    fn apply_inverse(&self, data: ArrayD<f32>) -> ArrayD<f32> {
        let Some((lo, hi)) = self.measured else {
            return data;
        };
        let desired = self.max - self.min;
        if desired == 0.0 {
            return data.mapv(|_| lo);
        }
        let (min, span) = (self.min, hi - lo);
        data.mapv(|v| (v - min) / desired * span + lo)
    }
}

/// Divide by a percentile of the input, e.g. the 95th
#[derive(Debug, Clone)]
pub struct PercentileNormalisation {
    percentile: f64,
    scale: Option<f32>,
}

impl PercentileNormalisation {
    /// Scale by the given percentile (0 to 100)
    pub fn new(percentile: f64) -> Self {
        PercentileNormalisation {
            percentile: percentile.clamp(0.0, 100.0),
            scale: None,
        }
    }

    /// Scale value measured by the last forward pass
    pub fn scale(&self) -> Option<f32> {
        self.scale
    }
}

impl Normalisation for PercentileNormalisation {
    fn apply(&mut self, data: ArrayD<f32>) -> ArrayD<f32> {
        let Some(scale) = percentile(&data, self.percentile) else {
            return data;
        };
        if scale == 0.0 {
            self.scale = None;
            return data;
        }
        self.scale = Some(scale);
        data.mapv(|v| v / scale)
    }

    fn apply_inverse(&self, data: ArrayD<f32>) -> ArrayD<f32> {
        match self.scale {
            Some(scale) => data.mapv(|v| v * scale),
            None => data,
        }
    }
}

fn min_max(data: &ArrayD<f32>) -> Option<(f32, f32)> {
    data.iter().fold(None, |acc, &v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

/// Percentile with linear interpolation between closest ranks
fn percentile(data: &ArrayD<f32>, q: f64) -> Option<f32> {
    let mut values: Vec<f32> = data.iter().copied().filter(|v| !v.is_nan()).collect();
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));

    let rank = q / 100.0 * (values.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = (rank - lower as f64) as f32;
    Some(values[lower] + (values[upper] - values[lower]) * weight)
}
