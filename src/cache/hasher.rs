//! Content hashing for cross-query feature dedup.
//!
//! Two independently fetched representations of the same real-world feature
//! must produce the same hash; two different features must practically never
//! collide. SHA-256 over the geometry type tag, the raw coordinate bits, and
//! the canonically serialized properties.

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::cache::feature::{Geometry, Properties};

#[derive(Error, Debug)]
pub enum HashError {
    #[error("geometry has no coordinates")]
    EmptyGeometry,

    #[error("geometry contains a non-finite coordinate")]
    NonFiniteCoordinate,

    #[error("failed to serialize properties: {0}")]
    Properties(#[from] serde_json::Error),
}

/// Compute the content hash of a feature.
///
/// Pure and deterministic: coordinates are fed as little-endian `f64` bits,
/// properties as sorted-key JSON. Returns an error for malformed payloads;
/// callers keep such features without dedup rather than dropping them.
pub fn content_hash(geometry: &Geometry, properties: &Properties) -> Result<String, HashError> {
    let mut hasher = Sha256::new();
    hasher.update(geometry.type_name().as_bytes());

    let mut count = 0usize;
    for [x, y] in geometry.coordinates() {
        if !x.is_finite() || !y.is_finite() {
            return Err(HashError::NonFiniteCoordinate);
        }
        hasher.update(x.to_le_bytes());
        hasher.update(y.to_le_bytes());
        count += 1;
    }
    if count == 0 {
        return Err(HashError::EmptyGeometry);
    }

    if !properties.is_empty() {
        hasher.update(serde_json::to_vec(properties)?);
    }

    Ok(hex::encode(hasher.finalize()))
}
