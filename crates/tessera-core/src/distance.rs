//! Distance metrics for vector similarity calculations.
//!
//! Every metric is exposed as a *distance*: lower always means closer, so the
//! graph code can use a single ordering regardless of the configured metric.
//!
//! | Metric | Distance | Stored vectors |
//! |--------|----------|----------------|
//! | `Cosine` | `1 - cos(a, b)` | normalized at insert |
//! | `DotProduct` | `-dot(a, b)` | raw |
//! | `Euclidean` | squared L2 | raw |

use crate::error::{Error, Result};
use crate::simd;
use serde::{Deserialize, Serialize};

/// Distance metric, fixed at index creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Cosine distance. Vectors are normalized once on the way in, so the
    /// hot path only computes a dot product.
    Cosine,

    /// Negated inner product, for maximum inner product search.
    DotProduct,

    /// Squared Euclidean distance.
    Euclidean,
}

impl DistanceMetric {
    /// Computes the distance between two prepared vectors.
    ///
    /// For `Cosine` both inputs must already be unit length (see
    /// [`DistanceMetric::prepare`]).
    ///
    /// # Panics
    ///
    /// Panics if the vectors have different dimensions.
    #[must_use]
    #[inline]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => 1.0 - simd::dot_product(a, b),
            Self::DotProduct => -simd::dot_product(a, b),
            Self::Euclidean => simd::squared_l2(a, b),
        }
    }

    /// Returns true if stored and query vectors are normalized before use.
    #[must_use]
    pub const fn normalizes(&self) -> bool {
        matches!(self, Self::Cosine)
    }

    /// Validates a raw vector and converts it into the form the index stores.
    ///
    /// # Errors
    ///
    /// - [`Error::DimensionMismatch`] if `raw.len() != dimension`
    /// - [`Error::InvalidVector`] for NaN/infinite components, or a zero
    ///   vector under `Cosine`
    pub fn prepare(&self, raw: &[f32], dimension: usize) -> Result<Vec<f32>> {
        if raw.len() != dimension {
            return Err(Error::DimensionMismatch {
                expected: dimension,
                actual: raw.len(),
            });
        }
        if let Some(pos) = raw.iter().position(|x| !x.is_finite()) {
            return Err(Error::InvalidVector(format!(
                "component {pos} is not finite"
            )));
        }

        let mut vector = raw.to_vec();
        if self.normalizes() {
            if simd::norm(&vector) == 0.0 {
                return Err(Error::InvalidVector(
                    "zero vector has no direction under cosine".to_string(),
                ));
            }
            simd::normalize_inplace(&mut vector);
        }
        Ok(vector)
    }

    /// Lower-case name used in CLI output and `index.json`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::DotProduct => "dot_product",
            Self::Euclidean => "euclidean",
        }
    }
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "dot" | "dot_product" | "dotproduct" => Ok(Self::DotProduct),
            "euclidean" | "l2" => Ok(Self::Euclidean),
            other => Err(Error::Config(format!("unknown distance metric '{other}'"))),
        }
    }
}
