//! Type definitions for the scenario.
//!
//! Contains the data structures a scenario file is made of:
//! - Propagation medium
//! - Signals (waveform definitions shared by emitters)
//! - Emitters (point sources with position, amplitude and transmit delay)
//! - Reflectors (declared geometry, not used by the physics)

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::vector::Vector2;

/// Distance below which the 1/r attenuation is clamped, in meters.
pub const DEFAULT_NEAR_FIELD_RADIUS: f64 = 1e-3;

/// Default amplitude given to emitters that do not specify one.
pub const DEFAULT_EMITTER_AMPLITUDE: f64 = 30.0;

/// Propagation medium shared by every emitter in the scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Medium {
    /// Wave speed in m/s (343 for air at room temperature). Must be positive.
    pub propagation_speed: f64,
    /// Evaluation points closer than this to an emitter are treated as lying
    /// on this radius, keeping the point-source singularity finite.
    #[serde(default = "default_near_field_radius")]
    pub near_field_radius: f64,
}

fn default_near_field_radius() -> f64 {
    DEFAULT_NEAR_FIELD_RADIUS
}

impl Medium {
    pub fn with_speed(propagation_speed: f64) -> Self {
        Self {
            propagation_speed,
            near_field_radius: DEFAULT_NEAR_FIELD_RADIUS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Continuous sine carrier.
    #[default]
    Sine,
}

/// Time-domain waveform definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    #[serde(default)]
    pub kind: SignalKind,
    /// Carrier frequency in Hz. Must be positive.
    pub frequency: f64,
    /// Optional finite transmission length in seconds. Outside `[0, duration]`
    /// the signal is silent; without a duration it is an endless carrier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl Signal {
    pub fn sine(id: impl Into<String>, frequency: f64) -> Self {
        Self {
            id: id.into(),
            kind: SignalKind::Sine,
            frequency,
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitterKind {
    /// Radiates equally in every direction.
    #[default]
    Omni,
    /// Accepted in scenario files but evaluated as `Omni`.
    Directional,
}

/// Point source transmitting a shared signal.
///
/// Missing fields in a scenario file fall back to the defaults of a single
/// omnidirectional emitter `E0` at the origin driven by signal `S0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Emitter {
    #[serde(default = "default_emitter_id")]
    pub id: String,
    #[serde(default = "default_signal_id")]
    pub signal_id: String,
    #[serde(default)]
    pub kind: EmitterKind,
    /// Transmit delay in seconds, usually written by beam steering.
    #[serde(default)]
    pub delay: f64,
    /// Signal strength at unit distance, in arbitrary units.
    #[serde(default = "default_amplitude")]
    pub amplitude: f64,
    #[serde(default)]
    pub position: Vector2,
    /// Reserved for directional emitters.
    #[serde(default = "default_direction")]
    pub direction: Vector2,
    /// Reserved for directional emitters, radians.
    #[serde(default = "default_half_angle")]
    pub half_angle: f64,
}

fn default_emitter_id() -> String {
    "E0".to_string()
}

fn default_signal_id() -> String {
    "S0".to_string()
}

fn default_amplitude() -> f64 {
    DEFAULT_EMITTER_AMPLITUDE
}

fn default_direction() -> Vector2 {
    Vector2::new(0.0, 1.0)
}

fn default_half_angle() -> f64 {
    PI
}

impl Emitter {
    /// Omnidirectional emitter with default amplitude and no transmit delay.
    pub fn omni(id: impl Into<String>, signal_id: impl Into<String>, position: Vector2) -> Self {
        Self {
            id: id.into(),
            signal_id: signal_id.into(),
            kind: EmitterKind::Omni,
            delay: 0.0,
            amplitude: DEFAULT_EMITTER_AMPLITUDE,
            position,
            direction: default_direction(),
            half_angle: default_half_angle(),
        }
    }
}

/// Reflector geometry represented as tagged enum.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ReflectorGeometry {
    #[serde(rename = "circle")]
    Circle { radius: f64 },
}

/// Passive reflector. Carried through scenario files for consumers; the
/// propagation model does not read it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reflector {
    pub id: String,
    pub position: Vector2,
    #[serde(flatten)]
    pub geometry: ReflectorGeometry,
}
