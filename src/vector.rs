//! This is the vector math module
//! Provide the Vector value type, dot product and L2 norm

use crate::error::{Result, VemcacheError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered, non-empty sequence of finite `f64` components.
///
/// Vectors are values: every arithmetic operation builds a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Vector {
    components: Vec<f64>,
}

impl Vector {
    /// Builds a vector, rejecting empty input and non-finite components.
    ///
    /// # Examples
    ///
    /// ```
    /// use vemcache::Vector;
    ///
    /// let v = Vector::new(vec![3.0, 4.0]).unwrap();
    /// assert_eq!(v.dim(), 2);
    /// assert!(Vector::new(vec![]).is_err());
    /// assert!(Vector::new(vec![f64::NAN]).is_err());
    /// ```
    pub fn new(components: Vec<f64>) -> Result<Self> {
        if components.is_empty() {
            return Err(VemcacheError::invalid("vector must have at least one component"));
        }
        if let Some(pos) = components.iter().position(|x| !x.is_finite()) {
            return Err(VemcacheError::invalid(format!(
                "component {} is not a finite number",
                pos
            )));
        }
        Ok(Vector { components })
    }

    /// Parses wire tokens into a vector. Any bad token is a protocol error.
    pub fn parse<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let components = tokens
            .into_iter()
            .map(|s| {
                s.parse::<f64>()
                    .map_err(|_| VemcacheError::protocol(format!("invalid float '{}'", s)))
            })
            .collect::<Result<Vec<f64>>>()?;

        Vector::new(components).map_err(|e| VemcacheError::Protocol(e.to_string()))
    }

    pub fn dim(&self) -> usize {
        self.components.len()
    }

    pub fn components(&self) -> &[f64] {
        &self.components
    }

    /// L2 norm, ||v||
    pub fn norm(&self) -> f64 {
        norm(&self.components)
    }

    /// Builds a vector from components produced by arithmetic on valid inputs.
    /// Overflow can still yield infinities, which are reported instead of stored.
    pub(crate) fn from_computed(components: Vec<f64>) -> Result<Self> {
        Vector::new(components).map_err(|e| VemcacheError::invalid(format!("result {}", e)))
    }
}

impl TryFrom<Vec<f64>> for Vector {
    type Error = VemcacheError;

    fn try_from(components: Vec<f64>) -> Result<Self> {
        Vector::new(components)
    }
}

impl From<Vector> for Vec<f64> {
    fn from(v: Vector) -> Self {
        v.components
    }
}

/// Space separated components in shortest round-trip form, e.g. `1.0 2.5`
impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, x) in self.components.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:?}", x)?;
        }
        Ok(())
    }
}

/// Dot Product
/// dot_prod = sum(a[i] * b[i]) for i = 0..a.len()
/// Callers check dimensions; the slices must have equal length.
///
/// Four independent accumulators over fixed-size chunks let LLVM keep
/// the loop in vector registers.
pub(crate) fn dot(left: &[f64], right: &[f64]) -> f64 {
    debug_assert_eq!(left.len(), right.len());

    let mut acc = [0.0f64; 4];
    let l_chunks = left.chunks_exact(4);
    let r_chunks = right.chunks_exact(4);
    let l_tail = l_chunks.remainder();
    let r_tail = r_chunks.remainder();

    for (l, r) in l_chunks.zip(r_chunks) {
        acc[0] += l[0] * r[0];
        acc[1] += l[1] * r[1];
        acc[2] += l[2] * r[2];
        acc[3] += l[3] * r[3];
    }

    let mut sum = (acc[0] + acc[1]) + (acc[2] + acc[3]);
    for (x, y) in l_tail.iter().zip(r_tail.iter()) {
        sum += x * y;
    }
    sum
}

/// L2 Norm
/// ||vec|| = sqrt(vec . vec)
pub(crate) fn norm(vector: &[f64]) -> f64 {
    dot(vector, vector).sqrt()
}

/// Cosine similarity of two equal-length slices given their norms.
///
/// Zero magnitude on either side is defined as similarity 0.0. Rounding is
/// clamped to [-1, 1].
///
/// When a squared norm would overflow or underflow, both sides are first
/// rescaled by their largest absolute component, so `[1e200, 1e200]` is
/// still similarity 1.0 with itself.
pub(crate) fn cosine_with_norms(a: &[f64], b: &[f64], norm_a: f64, norm_b: f64) -> f64 {
    if !(well_scaled(norm_a) && well_scaled(norm_b)) {
        return cosine_rescaled(a, b);
    }
    clamp_similarity(dot(a, b) / (norm_a * norm_b))
}

/// `norm * norm` is a normal float, so `|dot| <= norm_a * norm_b` stays finite.
fn well_scaled(norm: f64) -> bool {
    (norm * norm).is_normal()
}

fn cosine_rescaled(a: &[f64], b: &[f64]) -> f64 {
    let max_a = max_abs(a);
    let max_b = max_abs(b);
    if max_a == 0.0 || max_b == 0.0 {
        return 0.0;
    }

    // Largest component becomes exactly +-1, so squared norms land in [1, dim]
    let a: Vec<f64> = a.iter().map(|x| x / max_a).collect();
    let b: Vec<f64> = b.iter().map(|x| x / max_b).collect();
    clamp_similarity(dot(&a, &b) / (norm(&a) * norm(&b)))
}

fn max_abs(v: &[f64]) -> f64 {
    v.iter().fold(0.0f64, |m, x| m.max(x.abs()))
}

fn clamp_similarity(cos: f64) -> f64 {
    if cos.is_nan() {
        return 0.0;
    }
    cos.clamp(-1.0, 1.0)
}

#[cfg(test)]
mod vector_test {
    use super::*;

    // ========== Construction Tests ==========

    #[test]
    fn test_new_rejects_empty() {
        let result = Vector::new(vec![]);
        assert!(matches!(result, Err(VemcacheError::InvalidArgument(_))));
    }

    #[test]
    fn test_new_rejects_non_finite() {
        assert!(Vector::new(vec![1.0, f64::INFINITY]).is_err());
        assert!(Vector::new(vec![f64::NAN]).is_err());
    }

    #[test]
    fn test_parse_tokens() {
        let v = Vector::parse(["1", "-2.5", "3e2"]).unwrap();
        assert_eq!(v.components(), &[1.0, -2.5, 300.0]);
        assert_eq!(v.dim(), 3);
    }

    #[test]
    fn test_parse_bad_token_is_protocol_error() {
        let result = Vector::parse(["1.0", "abc"]);
        match result {
            Err(VemcacheError::Protocol(msg)) => assert!(msg.contains("abc")),
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_nan_is_protocol_error() {
        assert!(matches!(
            Vector::parse(["NaN"]),
            Err(VemcacheError::Protocol(_))
        ));
    }

    // ========== Display Tests ==========

    #[test]
    fn test_display_round_trips() {
        let v = Vector::new(vec![1.0, 0.1, -3.25, 1e-7]).unwrap();
        let text = v.to_string();
        assert_eq!(text, "1.0 0.1 -3.25 1e-7");

        let back = Vector::parse(text.split_whitespace()).unwrap();
        assert_eq!(back, v);
    }

    // ========== Dot Product / Norm Tests ==========

    #[test]
    fn test_dot_basic() {
        // 1*4 + 2*5 + 3*6 = 32
        let result = dot(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]);
        assert!((result - 32.0).abs() < 1e-12);
    }

    #[test]
    fn test_dot_longer_than_chunk() {
        let a: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        let b = vec![1.0; 10];
        assert!((dot(&a, &b) - 55.0).abs() < 1e-12);
    }

    #[test]
    fn test_dot_orthogonal() {
        assert_eq!(dot(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_norm_basic() {
        // ||[3,4]|| = 5
        let v = Vector::new(vec![3.0, 4.0]).unwrap();
        assert!((v.norm() - 5.0).abs() < 1e-12);
    }

    // ========== Cosine Tests ==========

    fn cosine(a: &[f64], b: &[f64]) -> f64 {
        cosine_with_norms(a, b, norm(a), norm(b))
    }

    #[test]
    fn test_cosine_zero_norm_is_zero() {
        assert_eq!(cosine(&[0.0, 0.0], &[3.0, 4.0]), 0.0);
        assert_eq!(cosine(&[1.0, 2.0], &[0.0, 0.0]), 0.0);
        assert_eq!(cosine(&[0.0], &[0.0]), 0.0);
    }

    #[test]
    fn test_cosine_huge_components() {
        let a = [1e200, 1e200];
        assert!(norm(&a).is_infinite());
        assert!((cosine(&a, &a) - 1.0).abs() < 1e-12);
        assert!((cosine(&a, &[-1e200, -1e200]) + 1.0).abs() < 1e-12);
        assert_eq!(cosine(&[f64::MAX, 0.0], &[0.0, f64::MAX]), 0.0);

        let mixed = cosine(&a, &[1.0, 0.0]);
        assert!((mixed - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_tiny_components() {
        let a = [1e-200, 1e-200];
        assert_eq!(norm(&a), 0.0);
        assert!((cosine(&a, &a) - 1.0).abs() < 1e-12);

        let mixed = cosine(&a, &[1e-200, 0.0]);
        assert!((mixed - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_clamped() {
        let c = cosine(&[0.1, 0.2, 0.3], &[0.1, 0.2, 0.3]);
        assert!(c <= 1.0);
        assert!((c - 1.0).abs() < 1e-12);
    }

    // ========== Serde Tests ==========

    #[test]
    fn test_serde_as_plain_array() {
        let v = Vector::new(vec![1.0, 2.0]).unwrap();
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "[1.0,2.0]");

        let back: Vector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
        assert!(serde_json::from_str::<Vector>("[]").is_err());
    }
}
