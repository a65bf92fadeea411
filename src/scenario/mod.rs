//! Scenario configuration: medium, simulation area, signals, emitters and reflectors.
//!
//! ## Module Organization
//!
//! - `types`: Data structures a scenario is made of
//! - `loader`: JSON loading and validation
//!
//! A [`Scenario`] is built once (from a file or programmatically) and then only
//! mutated through the delay and amplitude setters.

pub mod loader;
pub mod types;

use serde::{Deserialize, Serialize};

use crate::error::{BeamformingError, Collection};
use crate::geometry::AxisAlignedRegion;
use crate::vector::Vector2;

pub use loader::{ScenarioError, load_scenario, parse_scenario, validate_scenario};
pub use types::{Emitter, EmitterKind, Medium, Reflector, ReflectorGeometry, Signal, SignalKind};

/// Root structure representing a complete wave transport scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    medium: Medium,
    sim_area: AxisAlignedRegion,
    signals: Vec<Signal>,
    emitters: Vec<Emitter>,
    #[serde(default)]
    reflectors: Vec<Reflector>,
}

impl Scenario {
    /// Assemble and validate a scenario.
    pub fn new(
        medium: Medium,
        sim_area: AxisAlignedRegion,
        signals: Vec<Signal>,
        emitters: Vec<Emitter>,
        reflectors: Vec<Reflector>,
    ) -> Result<Self, ScenarioError> {
        let scenario = Self {
            medium,
            sim_area,
            signals,
            emitters,
            reflectors,
        };
        validate_scenario(&scenario).map_err(ScenarioError::ValidationError)?;
        Ok(scenario)
    }

    pub fn medium(&self) -> &Medium {
        &self.medium
    }

    pub fn propagation_speed(&self) -> f64 {
        self.medium.propagation_speed
    }

    pub fn sim_area(&self) -> &AxisAlignedRegion {
        &self.sim_area
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn emitters(&self) -> &[Emitter] {
        &self.emitters
    }

    pub fn reflectors(&self) -> &[Reflector] {
        &self.reflectors
    }

    /// First signal with the given id.
    pub fn find_signal(&self, id: &str) -> Result<&Signal, BeamformingError> {
        self.signals.iter().find(|s| s.id == id).ok_or_else(|| BeamformingError::NotFound {
            collection: Collection::Signals,
            id: id.to_string(),
        })
    }

    /// First emitter with the given id.
    pub fn find_emitter(&self, id: &str) -> Result<&Emitter, BeamformingError> {
        self.emitters.iter().find(|e| e.id == id).ok_or_else(|| emitter_not_found(id))
    }

    pub fn find_emitter_mut(&mut self, id: &str) -> Result<&mut Emitter, BeamformingError> {
        self.emitters.iter_mut().find(|e| e.id == id).ok_or_else(|| emitter_not_found(id))
    }

    pub fn emitter_delay(&self, id: &str) -> Result<f64, BeamformingError> {
        Ok(self.find_emitter(id)?.delay)
    }

    pub fn set_emitter_delay(&mut self, id: &str, delay: f64) -> Result<(), BeamformingError> {
        if !delay.is_finite() {
            return Err(BeamformingError::InvalidArgument(format!("delay for emitter {} must be finite, got {}", id, delay)));
        }
        self.find_emitter_mut(id)?.delay = delay;
        Ok(())
    }

    pub fn set_emitter_amplitude(&mut self, id: &str, amplitude: f64) -> Result<(), BeamformingError> {
        if !amplitude.is_finite() {
            return Err(BeamformingError::InvalidArgument(format!(
                "amplitude for emitter {} must be finite, got {}",
                id, amplitude
            )));
        }
        self.find_emitter_mut(id)?.amplitude = amplitude;
        Ok(())
    }

    /// Sum of all emitter amplitudes; the largest displacement a renderer
    /// should expect at unit distance.
    pub fn total_amplitude(&self) -> f64 {
        self.emitters.iter().map(|e| e.amplitude).sum()
    }

    /// Emitters positioned inside `region` (edges included).
    pub fn emitters_in<'a>(&'a self, region: &'a AxisAlignedRegion) -> impl Iterator<Item = &'a Emitter> + 'a {
        self.emitters.iter().filter(move |e| region.contains(e.position))
    }
}

fn emitter_not_found(id: &str) -> BeamformingError {
    BeamformingError::NotFound {
        collection: Collection::Emitters,
        id: id.to_string(),
    }
}

impl Default for Scenario {
    /// A single 440 Hz emitter in air at the center of a 20 m square.
    fn default() -> Self {
        Self {
            medium: Medium::with_speed(343.0),
            sim_area: AxisAlignedRegion::new(Vector2::new(-10.0, -10.0), Vector2::new(20.0, 20.0)).expect("default area is valid"),
            signals: vec![Signal::sine("S0", 440.0)],
            emitters: vec![Emitter::omni("E0", "S0", Vector2::ZERO)],
            reflectors: vec![Reflector {
                id: "T0".to_string(),
                position: Vector2::new(0.0, 6.0),
                geometry: ReflectorGeometry::Circle { radius: 0.1 },
            }],
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Two emitters on the y axis, `spacing` apart, sharing one 1 kHz carrier.
    pub(crate) fn pair_scenario(spacing: f64, speed: f64) -> Scenario {
        Scenario::new(
            Medium::with_speed(speed),
            AxisAlignedRegion::new(Vector2::new(-5.0, -5.0), Vector2::new(10.0, 10.0)).unwrap(),
            vec![Signal::sine("S0", 1000.0)],
            vec![
                Emitter::omni("E0", "S0", Vector2::new(0.0, 0.0)),
                Emitter::omni("E1", "S0", Vector2::new(0.0, spacing)),
            ],
            Vec::new(),
        )
        .unwrap()
    }

    /// Bypasses validation to add an emitter whose signal does not exist.
    pub(crate) fn with_dangling_emitter(mut scenario: Scenario) -> Scenario {
        scenario.emitters.push(Emitter::omni("E9", "missing", Vector2::new(1.0, 1.0)));
        scenario
    }

    #[test]
    fn default_scenario_is_valid() {
        let scenario = Scenario::default();
        assert!(validate_scenario(&scenario).is_ok());
        assert_eq!(scenario.propagation_speed(), 343.0);
        assert_eq!(scenario.find_signal("S0").unwrap().frequency, 440.0);
        assert_eq!(scenario.reflectors().len(), 1);
    }

    #[test]
    fn lookups_report_missing_ids() {
        let scenario = Scenario::default();
        assert_eq!(
            scenario.find_signal("nope").unwrap_err(),
            BeamformingError::NotFound {
                collection: Collection::Signals,
                id: "nope".to_string()
            }
        );
        assert!(matches!(
            scenario.find_emitter("E7"),
            Err(BeamformingError::NotFound {
                collection: Collection::Emitters,
                ..
            })
        ));
    }

    #[test]
    fn lookup_returns_first_duplicate() {
        let mut scenario = pair_scenario(1.0, 343.0);
        scenario.emitters.push(Emitter::omni("E0", "S0", Vector2::new(3.0, 3.0)));
        assert_eq!(scenario.find_emitter("E0").unwrap().position, Vector2::ZERO);
    }

    #[test]
    fn setters_mutate_in_place() {
        let mut scenario = pair_scenario(1.0, 343.0);
        scenario.set_emitter_delay("E1", 0.002).unwrap();
        scenario.set_emitter_amplitude("E1", 12.0).unwrap();
        assert_eq!(scenario.emitter_delay("E1").unwrap(), 0.002);
        assert_eq!(scenario.find_emitter("E1").unwrap().amplitude, 12.0);
        assert!(scenario.set_emitter_delay("E1", f64::NAN).is_err());
        assert!(scenario.set_emitter_amplitude("missing", 1.0).is_err());
    }

    #[test]
    fn amplitude_total_and_region_membership() {
        let scenario = pair_scenario(2.0, 343.0);
        assert_eq!(scenario.total_amplitude(), 60.0);
        let lower = AxisAlignedRegion::new(Vector2::new(-1.0, -1.0), Vector2::new(2.0, 2.0)).unwrap();
        let ids: Vec<&str> = scenario.emitters_in(&lower).map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["E0"]);
    }
}
