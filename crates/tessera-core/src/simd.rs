//! Explicit SIMD kernels using the `wide` crate for portable vectorization.
//!
//! All kernels process 8 lanes per iteration with fused multiply-add and
//! finish the tail with a scalar loop. `wide` picks AVX2/SSE/NEON/SIMD128
//! at compile time and falls back to scalar code elsewhere.

use wide::f32x8;

const LANES: usize = 8;

/// Computes the dot product of two equal-length slices.
///
/// # Panics
///
/// Panics if the slices have different lengths.
///
/// # Example
///
/// ```
/// use tessera_core::simd::dot_product;
///
/// let a = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
/// let b = vec![1.0; 9];
/// assert!((dot_product(&a, &b) - 45.0).abs() < 1e-5);
/// ```
#[inline]
#[must_use]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let chunks = a.len() / LANES;
    let mut sum = f32x8::ZERO;

    for i in 0..chunks {
        let offset = i * LANES;
        let va = f32x8::from(&a[offset..offset + LANES]);
        let vb = f32x8::from(&b[offset..offset + LANES]);
        sum = va.mul_add(vb, sum);
    }

    let mut result = sum.reduce_add();
    for i in chunks * LANES..a.len() {
        result += a[i] * b[i];
    }
    result
}

/// Computes the squared L2 distance of two equal-length slices.
///
/// Ranking by squared distance is identical to ranking by L2, so the sqrt is
/// never taken on the hot path.
///
/// # Panics
///
/// Panics if the slices have different lengths.
#[inline]
#[must_use]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let chunks = a.len() / LANES;
    let mut sum = f32x8::ZERO;

    for i in 0..chunks {
        let offset = i * LANES;
        let va = f32x8::from(&a[offset..offset + LANES]);
        let vb = f32x8::from(&b[offset..offset + LANES]);
        let diff = va - vb;
        sum = diff.mul_add(diff, sum);
    }

    let mut result = sum.reduce_add();
    for i in chunks * LANES..a.len() {
        let diff = a[i] - b[i];
        result += diff * diff;
    }
    result
}

/// Computes the L2 norm of a slice.
#[inline]
#[must_use]
pub fn norm(v: &[f32]) -> f32 {
    dot_product(v, v).sqrt()
}

/// Scales `v` to unit length in place. Zero vectors are left untouched.
#[inline]
pub fn normalize_inplace(v: &mut [f32]) {
    let n = norm(v);
    if n == 0.0 {
        return;
    }

    let inv = 1.0 / n;
    let inv_lanes = f32x8::splat(inv);
    let chunks = v.len() / LANES;

    for i in 0..chunks {
        let offset = i * LANES;
        let scaled = f32x8::from(&v[offset..offset + LANES]) * inv_lanes;
        let arr: [f32; LANES] = scaled.into();
        v[offset..offset + LANES].copy_from_slice(&arr);
    }
    for x in &mut v[chunks * LANES..] {
        *x *= inv;
    }
}
