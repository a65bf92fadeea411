//! Beam steering by per-emitter transmit delays.
//!
//! For a continuous carrier, steering needs only the relative transmit timing
//! of each emitter with respect to a reference ("lead") emitter, whose delay is
//! zero by definition. Delays cannot be negative for a live signal, so the lead
//! emitter must be the one that fires first: the element lying furthest back
//! along the steering direction. [`lead_emitter_for`] finds it, but the
//! reference is always the caller's choice; a reference further forward yields
//! negative delays, which are returned unchanged.

use serde::{Deserialize, Serialize};

use crate::error::BeamformingError;
use crate::scenario::{Emitter, Scenario};
use crate::vector::{Vector2, polar_to_vector};

use super::observers::{ModelChange, ModelObservers};

/// Transmit delay for one emitter, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitterDelay {
    pub emitter_id: String,
    pub delay: f64,
}

/// Compute the transmit delays that align wavefronts along `steering_angle`
/// (radians from +x, counter-clockwise).
///
/// For every emitter other than the reference, the baseline from the reference
/// is projected onto the steering direction and the projection is converted to
/// time with the medium's propagation speed. The result has one entry per
/// emitter, in scenario order, with the reference at 0.
pub fn compute_delays(scenario: &Scenario, reference_id: &str, steering_angle: f64) -> Result<Vec<EmitterDelay>, BeamformingError> {
    if !steering_angle.is_finite() {
        return Err(BeamformingError::InvalidArgument(format!("steering angle must be finite, got {}", steering_angle)));
    }
    let reference = scenario.find_emitter(reference_id)?;
    let speed = scenario.propagation_speed();

    let delays: Vec<EmitterDelay> = scenario
        .emitters()
        .iter()
        .map(|emitter| {
            let delay = if emitter.id == reference.id {
                0.0
            } else {
                let baseline = emitter.position.sub(reference.position).to_polar();
                let rotated = steering_angle - baseline.angle;
                baseline.radius * rotated.cos() / speed
            };
            EmitterDelay {
                emitter_id: emitter.id.clone(),
                delay,
            }
        })
        .collect();

    let negative = delays.iter().filter(|d| d.delay < 0.0).count();
    if negative > 0 {
        log::warn!(
            "Reference emitter {} is not the lead element for {:.3} rad: {} negative delay(s)",
            reference_id,
            steering_angle,
            negative
        );
    }
    Ok(delays)
}

/// Write transmit delays into the scenario and notify observers.
///
/// Every id is resolved before anything is written, so an unknown id leaves
/// the scenario untouched. Returns the ids that were updated, in input order.
pub fn apply_delays(scenario: &mut Scenario, delays: &[EmitterDelay], observers: &mut ModelObservers) -> Result<Vec<String>, BeamformingError> {
    for entry in delays {
        scenario.find_emitter(&entry.emitter_id)?;
        if !entry.delay.is_finite() {
            return Err(BeamformingError::InvalidArgument(format!(
                "delay for emitter {} must be finite, got {}",
                entry.emitter_id, entry.delay
            )));
        }
    }

    let mut changed = Vec::with_capacity(delays.len());
    for entry in delays {
        scenario.set_emitter_delay(&entry.emitter_id, entry.delay)?;
        changed.push(entry.emitter_id.clone());
    }
    log::debug!("Applied transmit delays to {} emitter(s)", changed.len());

    observers.notify(&ModelChange::EmittersChanged(changed.clone()));
    Ok(changed)
}

/// Compute and apply delays in one step.
pub fn steer(scenario: &mut Scenario, reference_id: &str, steering_angle: f64, observers: &mut ModelObservers) -> Result<Vec<EmitterDelay>, BeamformingError> {
    let delays = compute_delays(scenario, reference_id, steering_angle)?;
    apply_delays(scenario, &delays, observers)?;
    Ok(delays)
}

/// The emitter lying furthest back along `steering_angle`. Used as reference it
/// makes every computed delay non-negative. `None` when there are no emitters.
pub fn lead_emitter_for(scenario: &Scenario, steering_angle: f64) -> Option<&Emitter> {
    let direction: Vector2 = polar_to_vector(steering_angle, 1.0);
    scenario
        .emitters()
        .iter()
        .min_by(|a, b| a.position.dot(direction).total_cmp(&b.position.dot(direction)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::AxisAlignedRegion;
    use crate::scenario::tests::pair_scenario;
    use crate::scenario::{Medium, Signal};
    use std::cell::RefCell;
    use std::f64::consts::PI;
    use std::rc::Rc;

    fn linear_array(count: usize, spacing: f64) -> Scenario {
        let emitters = (0..count)
            .map(|i| Emitter::omni(format!("E{i}"), "S0", Vector2::new(i as f64 * spacing, 0.0)))
            .collect();
        Scenario::new(
            Medium::with_speed(343.0),
            AxisAlignedRegion::new(Vector2::new(-10.0, -10.0), Vector2::new(20.0, 20.0)).unwrap(),
            vec![Signal::sine("S0", 440.0)],
            emitters,
            Vec::new(),
        )
        .unwrap()
    }

    #[test]
    fn reference_delay_is_always_zero() {
        let scenario = linear_array(5, 0.2);
        for angle in [-PI, -1.0, 0.0, 0.3, PI / 2.0, 2.5] {
            let delays = compute_delays(&scenario, "E2", angle).unwrap();
            assert_eq!(delays.len(), 5);
            assert_eq!(delays[2], EmitterDelay { emitter_id: "E2".to_string(), delay: 0.0 });
        }
    }

    #[test]
    fn perpendicular_steering_needs_no_delay() {
        let scenario = pair_scenario(0.5, 343.0);
        let delays = compute_delays(&scenario, "E0", 0.0).unwrap();
        assert_eq!(delays[0].delay, 0.0);
        assert!(delays[1].delay.abs() < 1e-15);
    }

    #[test]
    fn steering_along_baseline_delays_by_travel_time() {
        let spacing = 0.5;
        let speed = 343.0;
        let scenario = pair_scenario(spacing, speed);
        let delays = compute_delays(&scenario, "E0", PI / 2.0).unwrap();
        assert_eq!(delays[0].delay, 0.0);
        assert!((delays[1].delay - spacing / speed).abs() < 1e-15);

        let reversed = compute_delays(&scenario, "E0", -PI / 2.0).unwrap();
        assert!((reversed[1].delay + spacing / speed).abs() < 1e-15);
    }

    #[test]
    fn delays_follow_scenario_order() {
        let scenario = linear_array(4, 0.1);
        let ids: Vec<String> = compute_delays(&scenario, "E3", 0.0).unwrap().into_iter().map(|d| d.emitter_id).collect();
        assert_eq!(ids, vec!["E0", "E1", "E2", "E3"]);
    }

    #[test]
    fn unknown_reference_is_not_found() {
        let scenario = linear_array(2, 0.1);
        assert!(matches!(compute_delays(&scenario, "E9", 0.0), Err(BeamformingError::NotFound { .. })));
        assert!(matches!(compute_delays(&scenario, "E0", f64::NAN), Err(BeamformingError::InvalidArgument(_))));
    }

    #[test]
    fn apply_writes_delays_and_notifies() {
        let mut scenario = linear_array(3, 0.2);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut observers = ModelObservers::new();
        let sink = Rc::clone(&seen);
        observers.subscribe(move |change| sink.borrow_mut().push(change.clone()));

        let delays = compute_delays(&scenario, "E0", 0.0).unwrap();
        let changed = apply_delays(&mut scenario, &delays, &mut observers).unwrap();
        assert_eq!(changed, vec!["E0", "E1", "E2"]);
        assert!((scenario.emitter_delay("E2").unwrap() - 0.4 / 343.0).abs() < 1e-15);
        assert_eq!(*seen.borrow(), vec![ModelChange::EmittersChanged(changed)]);
    }

    #[test]
    fn apply_with_unknown_id_changes_nothing() {
        let mut scenario = linear_array(2, 0.2);
        let mut observers = ModelObservers::new();
        let delays = vec![
            EmitterDelay { emitter_id: "E1".to_string(), delay: 0.5 },
            EmitterDelay { emitter_id: "E7".to_string(), delay: 0.5 },
        ];
        assert!(apply_delays(&mut scenario, &delays, &mut observers).is_err());
        assert_eq!(scenario.emitter_delay("E1").unwrap(), 0.0);
    }

    #[test]
    fn lead_emitter_yields_non_negative_delays() {
        let scenario = linear_array(4, 0.25);
        for angle in [0.0, PI / 3.0, PI, -2.0] {
            let lead = lead_emitter_for(&scenario, angle).unwrap();
            let delays = compute_delays(&scenario, &lead.id, angle).unwrap();
            assert!(delays.iter().all(|d| d.delay >= -1e-15), "angle {angle}: {delays:?}");
        }
        assert_eq!(lead_emitter_for(&scenario, 0.0).unwrap().id, "E0");
        assert_eq!(lead_emitter_for(&scenario, PI).unwrap().id, "E3");
    }

    #[test]
    fn steer_applies_computed_delays() {
        let mut scenario = pair_scenario(1.0, 343.0);
        let mut observers = ModelObservers::new();
        let delays = steer(&mut scenario, "E0", PI / 2.0, &mut observers).unwrap();
        assert_eq!(scenario.emitter_delay("E1").unwrap(), delays[1].delay);
    }
}
