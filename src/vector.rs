//! Two-dimensional vector arithmetic and polar conversion.
//!
//! Contains helpers for:
//! - Elementwise add/sub, magnitude, dot product and angle between vectors
//! - Cartesian <-> polar conversion (angles in radians, (-π, π])
//! - Degree/radian conversion
//! - Human readable SI-prefixed formatting of physical quantities
//!
//! Units are whatever the caller uses; the simulation works in meters and seconds.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// Plain 2-D vector value in simulation space.
///
/// Serialized as a two-element array (`[x, y]`) so scenario files stay compact.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Vector2 {
    pub x: f64,
    pub y: f64,
}

impl Vector2 {
    pub const ZERO: Vector2 = Vector2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn add(self, other: Vector2) -> Vector2 {
        Vector2::new(self.x + other.x, self.y + other.y)
    }

    pub fn sub(self, other: Vector2) -> Vector2 {
        Vector2::new(self.x - other.x, self.y - other.y)
    }

    pub fn magnitude(self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn dot(self, other: Vector2) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Unsigned angle between two vectors in radians (0..=π).
    ///
    /// Returns `None` when either vector has zero magnitude, where the angle is
    /// undefined. The cosine is clamped to [-1, 1] so rounding never yields NaN.
    pub fn angle_between(self, other: Vector2) -> Option<f64> {
        let denom = self.magnitude() * other.magnitude();
        if denom == 0.0 {
            return None;
        }
        let cos_theta = (self.dot(other) / denom).clamp(-1.0, 1.0);
        Some(cos_theta.acos())
    }

    /// Convert to polar form. The angle is measured from the +x axis and is
    /// negative below it, i.e. in (-π, π]. A zero vector maps to angle 0.
    pub fn to_polar(self) -> Polar {
        Polar {
            radius: self.magnitude(),
            angle: self.y.atan2(self.x),
        }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<[f64; 2]> for Vector2 {
    fn from(v: [f64; 2]) -> Self {
        Vector2::new(v[0], v[1])
    }
}

impl From<Vector2> for [f64; 2] {
    fn from(v: Vector2) -> Self {
        [v.x, v.y]
    }
}

impl fmt::Display for Vector2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Polar coordinates of a 2-D vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Polar {
    pub radius: f64,
    /// Radians in (-π, π].
    pub angle: f64,
}

/// Build a Cartesian vector from an angle (radians) and radius.
pub fn polar_to_vector(angle: f64, radius: f64) -> Vector2 {
    Vector2::new(radius * angle.cos(), radius * angle.sin())
}

pub fn deg_to_rad(deg: f64) -> f64 {
    PI * deg / 180.0
}

pub fn rad_to_deg(rad: f64) -> f64 {
    180.0 * rad / PI
}

const PREFIXES_MACRO: [&str; 5] = ["k", "M", "G", "T", "P"];
const PREFIXES_MICRO: [&str; 5] = ["m", "μ", "n", "p", "f"];

/// Format a quantity with an SI prefix prepended to its base unit.
///
/// The power-of-1000 bucket is `floor(floor(log10(|value|)) / 3)`; the mantissa
/// is printed with three significant digits (`1500, "Hz"` → `"1.50kHz"`,
/// `0.000025, "s"` → `"25.0μs"`). Buckets beyond ±5 fall back to scientific
/// notation (`"1.50e+18Hz"`). Zero formats as `"0"` followed by the unit.
pub fn to_engineering_string(value: f64, unit: &str) -> String {
    if value == 0.0 {
        return format!("0{unit}");
    }
    if !value.is_finite() {
        return format!("{value}{unit}");
    }

    let abs_value = value.abs();
    let order = abs_value.log10().floor() as i32;
    let mut shifter = order.div_euclid(3);
    let mut shifted = abs_value * 10f64.powi(-shifter * 3);

    // Three significant digits can round 999.5 up to a four digit mantissa.
    if round_significant(shifted, 3) >= 1000.0 {
        shifter += 1;
        shifted /= 1000.0;
    }

    if !(-5..=5).contains(&shifter) {
        return format!("{}{unit}", to_scientific3(value));
    }

    let sign = if value < 0.0 { "-" } else { "" };
    let prefix = match shifter {
        0 => "",
        s if s < 0 => PREFIXES_MICRO[(-s - 1) as usize],
        s => PREFIXES_MACRO[(s - 1) as usize],
    };
    format!("{sign}{}{prefix}{unit}", to_precision3(shifted))
}

fn round_significant(value: f64, digits: i32) -> f64 {
    if value == 0.0 {
        return 0.0;
    }
    let magnitude = value.abs().log10().floor() as i32;
    let factor = 10f64.powi(digits - 1 - magnitude);
    (value * factor).round() / factor
}

/// Positive value in [1, 1000) printed with exactly three significant digits.
fn to_precision3(value: f64) -> String {
    let rounded = round_significant(value, 3);
    let magnitude = rounded.log10().floor() as i32;
    let decimals = (2 - magnitude).max(0) as usize;
    format!("{rounded:.decimals$}")
}

fn to_scientific3(value: f64) -> String {
    let formatted = format!("{value:.2e}");
    match formatted.split_once('e') {
        Some((mantissa, exponent)) if exponent.starts_with('-') => format!("{mantissa}e{exponent}"),
        Some((mantissa, exponent)) => format!("{mantissa}e+{exponent}"),
        None => formatted,
    }
}
