//! Error types for scenario lookup, numeric guards and argument checks.

use std::fmt;

use crate::vector::Vector2;

/// Scenario collection searched by a failed lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Signals,
    Emitters,
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Collection::Signals => write!(f, "signals"),
            Collection::Emitters => write!(f, "emitters"),
        }
    }
}

/// Errors raised by the simulation core.
#[derive(Debug, Clone, PartialEq)]
pub enum BeamformingError {
    /// An id did not resolve in its collection. Fatal for the operation that needed it.
    NotFound { collection: Collection, id: String },
    /// A region with a non-positive or non-finite size.
    InvalidRegion { min_corner: Vector2, size: Vector2 },
    /// Evaluation produced NaN or infinity at a sample point.
    NonFiniteSample { x: f64, y: f64 },
    /// A caller supplied an argument outside its valid range.
    InvalidArgument(String),
}

impl fmt::Display for BeamformingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BeamformingError::NotFound { collection, id } => write!(f, "No such entry '{}' in {}", id, collection),
            BeamformingError::InvalidRegion { min_corner, size } => {
                write!(f, "Invalid region at {} with size {}: size must be positive and finite", min_corner, size)
            }
            BeamformingError::NonFiniteSample { x, y } => write!(f, "Non-finite sample at ({}, {})", x, y),
            BeamformingError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
        }
    }
}

impl std::error::Error for BeamformingError {}
