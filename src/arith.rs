//! Pure arithmetic over vectors fetched from the store.
//!
//! Nothing here touches the store: results are handed back to the caller
//! and are only persisted by an explicit `named_insert`.

use crate::error::{Result, VemcacheError};
use crate::vector::{self, Vector};

fn check_dims(a: &Vector, b: &Vector) -> Result<()> {
    if a.dim() != b.dim() {
        return Err(VemcacheError::DimensionMismatch {
            left: a.dim(),
            right: b.dim(),
        });
    }
    Ok(())
}

/// Element-wise `a + b`.
///
/// ```
/// use vemcache::{arith, Vector};
///
/// let a = Vector::new(vec![1.0, 2.0]).unwrap();
/// let b = Vector::new(vec![3.0, 4.0]).unwrap();
/// assert_eq!(arith::add(&a, &b).unwrap().components(), &[4.0, 6.0]);
/// ```
pub fn add(a: &Vector, b: &Vector) -> Result<Vector> {
    check_dims(a, b)?;
    let sum = a
        .components()
        .iter()
        .zip(b.components())
        .map(|(x, y)| x + y)
        .collect();
    Vector::from_computed(sum)
}

/// Element-wise `a - b`.
pub fn sub(a: &Vector, b: &Vector) -> Result<Vector> {
    check_dims(a, b)?;
    let diff = a
        .components()
        .iter()
        .zip(b.components())
        .map(|(x, y)| x - y)
        .collect();
    Vector::from_computed(diff)
}

/// Multiplies every component by `s`.
pub fn scale(a: &Vector, s: f64) -> Result<Vector> {
    let scaled = a.components().iter().map(|x| x * s).collect();
    Vector::from_computed(scaled)
}

/// Cosine similarity, `dot(a,b) / (||a|| * ||b||)`.
///
/// Defined as `0.0` when either vector has zero magnitude. Components near
/// the ends of the `f64` range are rescaled rather than overflowing.
/// The similarity index scores candidates with the same formula, so a
/// brute-force ranking built from this function matches `knn` exactly.
pub fn cosine(a: &Vector, b: &Vector) -> Result<f64> {
    check_dims(a, b)?;
    Ok(vector::cosine_with_norms(a.components(), b.components(), a.norm(), b.norm()))
}
