//! Pearson correlation matrix and its threshold-dependent views.
//!
//! The matrix depends only on the series set. Everything that takes a
//! [`Threshold`] is a cheap scan over the upper triangle and can be re-run on
//! every threshold change.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::pipeline::PipelineError;
use crate::series::FilledSeriesSet;

pub const DEFAULT_THRESHOLD: f64 = 0.7;
const HEATMAP_HIGH_CUTOFF: f64 = 0.7;

/// Cutoff on |r| in (0, 1].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Threshold(f64);

impl Threshold {
    pub fn new(value: f64) -> Result<Self, PipelineError> {
        if value.is_finite() && value > 0.0 && value <= 1.0 {
            Ok(Self(value))
        } else {
            Err(PipelineError::InvalidThreshold(value))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self(DEFAULT_THRESHOLD)
    }
}

impl TryFrom<f64> for Threshold {
    type Error = PipelineError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Threshold> for f64 {
    fn from(threshold: Threshold) -> Self {
        threshold.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    identifiers: Vec<String>,
    values: Vec<f64>,
}

impl CorrelationMatrix {
    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    pub fn size(&self) -> usize {
        self.identifiers.len()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        let n = self.size();
        if row >= n || col >= n {
            return None;
        }
        Some(self.values[row * n + col])
    }

    pub fn between(&self, first: &str, second: &str) -> Option<f64> {
        let row = self.identifiers.iter().position(|id| id == first)?;
        let col = self.identifiers.iter().position(|id| id == second)?;
        self.get(row, col)
    }

    pub fn rows(&self) -> Vec<Vec<f64>> {
        let n = self.size();
        if n == 0 {
            return Vec::new();
        }
        self.values.chunks(n).map(<[f64]>::to_vec).collect()
    }

    /// `(i, j, r)` for every `i < j`, row-major.
    pub fn upper_triangle(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        let n = self.size();
        (0..n).flat_map(move |i| ((i + 1)..n).map(move |j| (i, j, self.values[i * n + j])))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    VeryStrong,
    Strong,
    Moderate,
    Weak,
    VeryWeak,
}

impl Strength {
    pub fn from_correlation(r: f64) -> Self {
        let abs = r.abs();
        if abs >= 0.9 {
            Self::VeryStrong
        } else if abs >= 0.7 {
            Self::Strong
        } else if abs >= 0.5 {
            Self::Moderate
        } else if abs >= 0.3 {
            Self::Weak
        } else {
            Self::VeryWeak
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::VeryStrong => "very strong",
            Self::Strong => "strong",
            Self::Moderate => "moderate",
            Self::Weak => "weak",
            Self::VeryWeak => "very weak",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationPair {
    pub first: String,
    pub second: String,
    pub correlation: f64,
    pub strength: Strength,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedPairs {
    /// Descending by correlation.
    pub positive: Vec<CorrelationPair>,
    /// Ascending by correlation, most negative first.
    pub negative: Vec<CorrelationPair>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrelationSummary {
    pub pair_count: usize,
    pub mean_correlation: f64,
    pub positive_ratio: f64,
    pub strong_positive_ratio: f64,
    pub strong_negative_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeatmapCell {
    Hidden,
    HighPositive,
    Positive,
    HighNegative,
    Negative,
}

impl HeatmapCell {
    pub fn classify(r: f64, threshold: Threshold) -> Self {
        if r.abs() < threshold.value() {
            Self::Hidden
        } else if r > 0.0 {
            if r > HEATMAP_HIGH_CUTOFF {
                Self::HighPositive
            } else {
                Self::Positive
            }
        } else if r < -HEATMAP_HIGH_CUTOFF {
            Self::HighNegative
        } else {
            Self::Negative
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            Self::Hidden => "correlation-hidden",
            Self::HighPositive => "correlation-high-positive",
            Self::Positive => "correlation-positive",
            Self::HighNegative => "correlation-high-negative",
            Self::Negative => "correlation-negative",
        }
    }
}

/// Pearson r over positions where both values are finite, from centred
/// deviations.
///
/// Returns 0 for fewer than two usable positions or when either side is
/// flat. Flatness is checked on the values themselves, since a mean like
/// `302.0 / 3.0` leaves rounding noise in the deviations.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    debug_assert_eq!(x.len(), y.len(), "series must share the day axis");

    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(&a, &b)| (a, b))
        .collect();

    if pairs.len() < 2
        || is_flat(pairs.iter().map(|(a, _)| *a))
        || is_flat(pairs.iter().map(|(_, b)| *b))
    {
        return 0.0;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(a, _)| a).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, b)| b).sum::<f64>() / n;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (a, b) in &pairs {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denominator = (var_x * var_y).sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        return 0.0;
    }

    (cov / denominator).clamp(-1.0, 1.0)
}

fn is_flat(mut values: impl Iterator<Item = f64>) -> bool {
    match values.next() {
        Some(first) => values.all(|value| value == first),
        None => true,
    }
}

pub fn correlate(set: &FilledSeriesSet) -> CorrelationMatrix {
    let n = set.len();
    let mut values = vec![0.0; n * n];

    for i in 0..n {
        values[i * n + i] = 1.0;
        for j in (i + 1)..n {
            let r = pearson(&set.series[i].values, &set.series[j].values);
            values[i * n + j] = r;
            values[j * n + i] = r;
        }
    }

    info!(
        component = "correlation",
        event = "correlation.matrix.built",
        size = n,
        pairs = n * n.saturating_sub(1) / 2,
        days = set.day_count()
    );

    CorrelationMatrix {
        identifiers: set
            .series
            .iter()
            .map(|series| series.identifier.clone())
            .collect(),
        values,
    }
}

pub fn classify(matrix: &CorrelationMatrix, threshold: Threshold) -> ClassifiedPairs {
    let theta = threshold.value();
    let mut out = ClassifiedPairs::default();

    for (i, j, r) in matrix.upper_triangle() {
        let target = if r >= theta {
            &mut out.positive
        } else if r <= -theta {
            &mut out.negative
        } else {
            continue;
        };
        target.push(CorrelationPair {
            first: matrix.identifiers[i].clone(),
            second: matrix.identifiers[j].clone(),
            correlation: r,
            strength: Strength::from_correlation(r),
        });
    }

    out.positive
        .sort_by(|a, b| b.correlation.partial_cmp(&a.correlation).unwrap_or(Ordering::Equal));
    out.negative
        .sort_by(|a, b| a.correlation.partial_cmp(&b.correlation).unwrap_or(Ordering::Equal));
    out
}

pub fn summarize(matrix: &CorrelationMatrix, threshold: Threshold) -> Option<CorrelationSummary> {
    let theta = threshold.value();
    let (mut count, mut sum, mut positive, mut strong_positive, mut strong_negative) =
        (0usize, 0.0, 0usize, 0usize, 0usize);

    for (_, _, r) in matrix.upper_triangle() {
        count += 1;
        sum += r;
        if r > 0.0 {
            positive += 1;
        }
        if r >= theta {
            strong_positive += 1;
        }
        if r <= -theta {
            strong_negative += 1;
        }
    }

    if count == 0 {
        return None;
    }

    let total = count as f64;
    Some(CorrelationSummary {
        pair_count: count,
        mean_correlation: sum / total,
        positive_ratio: positive as f64 / total,
        strong_positive_ratio: strong_positive as f64 / total,
        strong_negative_ratio: strong_negative as f64 / total,
    })
}

pub fn heatmap(matrix: &CorrelationMatrix, threshold: Threshold) -> Vec<Vec<HeatmapCell>> {
    matrix
        .rows()
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|r| HeatmapCell::classify(r, threshold))
                .collect()
        })
        .collect()
}

#[cfg(test)]
pub(crate) fn matrix_from_rows(identifiers: &[&str], rows: Vec<Vec<f64>>) -> CorrelationMatrix {
    CorrelationMatrix {
        identifiers: identifiers.iter().map(|id| id.to_string()).collect(),
        values: rows.into_iter().flatten().collect(),
    }
}
