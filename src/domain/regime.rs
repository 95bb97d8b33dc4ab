//! Volatility regime labelling.
//!
//! Each bar with a full look-back window becomes a feature row
//! `(close, rolling mean, rolling sample stddev)`; the rows are clustered
//! into [`REGIME_COUNT`] groups with Lloyd's k-means. Bars inside the
//! warm-up window get no label.
//!
//! Cluster numbers carry no meaning by themselves. With `calibrate` set the
//! clusters are renumbered by ascending centroid close, so label 0 is the
//! calmest group.

use super::error::VoltraderError;
use super::ohlcv::{Bar, Regime, REGIME_COUNT};

pub const DEFAULT_WINDOW: usize = 20;
pub const DEFAULT_MAX_ITERATIONS: usize = 300;

type Feature = [f64; 3];

#[derive(Debug, Clone, PartialEq)]
pub struct RegimeLabeler {
    pub window: usize,
    pub max_iterations: usize,
    pub calibrate: bool,
}

impl Default for RegimeLabeler {
    fn default() -> Self {
        RegimeLabeler {
            window: DEFAULT_WINDOW,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            calibrate: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegimeLabels {
    pub labels: Vec<Option<Regime>>,
    pub rolling_mean: Vec<Option<f64>>,
    pub rolling_std: Vec<Option<f64>>,
    /// One `[close, mean, std]` centroid per label, indexed by label value.
    pub centroids: Vec<Feature>,
    pub iterations: usize,
}

impl RegimeLabeler {
    pub fn new(window: usize) -> Result<Self, VoltraderError> {
        let labeler = RegimeLabeler {
            window,
            ..RegimeLabeler::default()
        };
        labeler.validate()?;
        Ok(labeler)
    }

    pub fn calibrated(mut self, calibrate: bool) -> Self {
        self.calibrate = calibrate;
        self
    }

    pub fn validate(&self) -> Result<(), VoltraderError> {
        if self.window < 2 {
            return Err(VoltraderError::config_invalid(
                "regime",
                "window",
                "window must be at least 2",
            ));
        }
        if self.max_iterations == 0 {
            return Err(VoltraderError::config_invalid(
                "regime",
                "max_iterations",
                "max_iterations must be at least 1",
            ));
        }
        Ok(())
    }

    pub fn label(&self, bars: &[Bar]) -> Result<RegimeLabels, VoltraderError> {
        self.validate()?;
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let rolling_mean = rolling_mean(&closes, self.window);
        let rolling_std = rolling_std(&closes, self.window);

        let mut rows: Vec<(usize, Feature)> = Vec::new();
        for i in 0..closes.len() {
            if let (Some(m), Some(s)) = (rolling_mean[i], rolling_std[i]) {
                rows.push((i, [closes[i], m, s]));
            }
        }

        if rows.len() < REGIME_COUNT {
            return Err(VoltraderError::data(format!(
                "need at least {} bars with a full {}-bar window to label regimes, have {}",
                REGIME_COUNT,
                self.window,
                rows.len()
            )));
        }

        let features: Vec<Feature> = rows.iter().map(|(_, f)| *f).collect();
        let (mut assignment, mut centroids, iterations) =
            kmeans(&features, REGIME_COUNT, self.max_iterations);

        if self.calibrate {
            let mut order: Vec<usize> = (0..REGIME_COUNT).collect();
            order.sort_by(|&a, &b| centroids[a][0].total_cmp(&centroids[b][0]));
            let mut remap = [0usize; REGIME_COUNT];
            for (new_label, &old_label) in order.iter().enumerate() {
                remap[old_label] = new_label;
            }
            for a in assignment.iter_mut() {
                *a = remap[*a];
            }
            centroids = order.iter().map(|&old| centroids[old]).collect();
        }

        let mut labels = vec![None; bars.len()];
        for ((bar_index, _), cluster) in rows.iter().zip(&assignment) {
            labels[*bar_index] = Some(Regime::new(*cluster as u8)?);
        }

        tracing::debug!(
            labelled = rows.len(),
            warmup = bars.len() - rows.len(),
            iterations,
            "regimes labelled"
        );

        Ok(RegimeLabels {
            labels,
            rolling_mean,
            rolling_std,
            centroids,
            iterations,
        })
    }

    /// Label `bars` in place, overwriting any existing regime column.
    pub fn apply(&self, bars: &mut [Bar]) -> Result<RegimeLabels, VoltraderError> {
        let labels = self.label(bars)?;
        for (bar, label) in bars.iter_mut().zip(&labels.labels) {
            bar.regime = *label;
        }
        Ok(labels)
    }
}

/// Simple moving average; `None` until `window` values are available.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if window == 0 || i + 1 < window {
                return None;
            }
            let slice = &values[i + 1 - window..=i];
            Some(slice.iter().sum::<f64>() / window as f64)
        })
        .collect()
}

/// Sample standard deviation (n - 1 denominator) over a trailing window.
pub fn rolling_std(values: &[f64], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if window < 2 || i + 1 < window {
                return None;
            }
            let slice = &values[i + 1 - window..=i];
            let mean = slice.iter().sum::<f64>() / window as f64;
            let variance = slice
                .iter()
                .map(|v| {
                    let diff = v - mean;
                    diff * diff
                })
                .sum::<f64>()
                / (window - 1) as f64;
            Some(variance.sqrt())
        })
        .collect()
}

fn distance_sq(a: &Feature, b: &Feature) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest(point: &Feature, centroids: &[Feature]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (k, c) in centroids.iter().enumerate() {
        let d = distance_sq(point, c);
        if d < best_dist {
            best = k;
            best_dist = d;
        }
    }
    best
}

/// Seed centroids from the means of `k` equal-size buckets of rows ordered
/// by close, so the result is reproducible without a random source.
fn seed_centroids(features: &[Feature], k: usize) -> Vec<Feature> {
    let mut by_close: Vec<usize> = (0..features.len()).collect();
    by_close.sort_by(|&a, &b| features[a][0].total_cmp(&features[b][0]));
    (0..k)
        .map(|j| {
            let start = j * features.len() / k;
            let end = ((j + 1) * features.len() / k).max(start + 1);
            let bucket = &by_close[start..end];
            let mut centroid = [0.0; 3];
            for &row in bucket {
                for d in 0..3 {
                    centroid[d] += features[row][d];
                }
            }
            for value in centroid.iter_mut() {
                *value /= bucket.len() as f64;
            }
            centroid
        })
        .collect()
}

/// Lloyd's algorithm. Returns (assignment per row, centroids, iterations run).
fn kmeans(features: &[Feature], k: usize, max_iterations: usize) -> (Vec<usize>, Vec<Feature>, usize) {
    let mut centroids = seed_centroids(features, k);
    let mut assignment: Vec<usize> = features.iter().map(|f| nearest(f, &centroids)).collect();
    let mut iterations = 0;

    while iterations < max_iterations {
        iterations += 1;

        let mut sums = vec![[0.0; 3]; k];
        let mut counts = vec![0usize; k];
        for (f, &a) in features.iter().zip(&assignment) {
            for d in 0..3 {
                sums[a][d] += f[d];
            }
            counts[a] += 1;
        }
        for j in 0..k {
            // An empty cluster keeps its previous centroid.
            if counts[j] > 0 {
                for d in 0..3 {
                    centroids[j][d] = sums[j][d] / counts[j] as f64;
                }
            }
        }

        let next: Vec<usize> = features.iter().map(|f| nearest(f, &centroids)).collect();
        if next == assignment {
            break;
        }
        assignment = next;
    }

    (assignment, centroids, iterations)
}
