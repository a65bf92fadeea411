//! Two-dimensional acoustic beamforming simulator.
//!
//! Emitters transmit a continuous carrier into a homogeneous medium. The
//! superposed field is evaluated over a rectangular area, split into strips
//! and processed one strip per scheduling turn so a host stays responsive.

pub mod config;
pub mod error;
pub mod geometry;
pub mod scenario;
pub mod simulation;
pub mod vector;
