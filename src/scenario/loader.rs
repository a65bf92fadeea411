//! Scenario loading, parsing, and validation logic.

use anyhow::Context;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use super::Scenario;
use super::types::EmitterKind;

/// Error type for scenario loading failures.
#[derive(Debug)]
pub enum ScenarioError {
    FileReadError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for ScenarioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenarioError::FileReadError(msg) => write!(f, "Failed to read file: {}", msg),
            ScenarioError::ParseError(msg) => write!(f, "Failed to parse JSON: {}", msg),
            ScenarioError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ScenarioError {}

/// Load, parse and validate a scenario from a JSON file.
pub fn load_scenario(path: &Path) -> Result<Scenario, ScenarioError> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))
        .map_err(|e| ScenarioError::FileReadError(format!("{:#}", e)))?;

    parse_scenario(&data)
}

/// Parse and validate a scenario from JSON text.
pub fn parse_scenario(data: &str) -> Result<Scenario, ScenarioError> {
    let scenario: Scenario = serde_json::from_str(data)
        .context("Invalid JSON format")
        .map_err(|e| ScenarioError::ParseError(format!("{:#}", e)))?;

    validate_scenario(&scenario).map_err(ScenarioError::ValidationError)?;

    log::info!(
        "Loaded scenario: {} signal(s), {} emitter(s), {} reflector(s), area {}",
        scenario.signals().len(),
        scenario.emitters().len(),
        scenario.reflectors().len(),
        scenario.sim_area()
    );
    Ok(scenario)
}

/// Validate a scenario to reject inputs the propagation model cannot evaluate.
///
/// Checks:
/// - Propagation speed and near-field radius are positive and finite
/// - At least one signal; every frequency positive, every duration non-negative
/// - Emitter amplitudes, delays and positions are finite
/// - Every emitter's signal id resolves
///
/// Duplicate ids are not rejected (lookups return the first match) but are
/// reported as warnings, as are directional emitters, which are evaluated as
/// omnidirectional.
pub fn validate_scenario(scenario: &Scenario) -> Result<(), String> {
    let medium = scenario.medium();
    if !(medium.propagation_speed.is_finite() && medium.propagation_speed > 0.0) {
        return Err(format!("Invalid propagation_speed {}, must be positive", medium.propagation_speed));
    }
    if !(medium.near_field_radius.is_finite() && medium.near_field_radius > 0.0) {
        return Err(format!("Invalid near_field_radius {}, must be positive", medium.near_field_radius));
    }

    if scenario.signals().is_empty() {
        return Err("Scenario must contain at least one signal".to_string());
    }

    let mut signal_ids = HashSet::new();
    for signal in scenario.signals() {
        if !signal_ids.insert(signal.id.as_str()) {
            log::warn!("Duplicate signal id '{}': lookups resolve to the first definition", signal.id);
        }
        if !(signal.frequency.is_finite() && signal.frequency > 0.0) {
            return Err(format!("Signal {} has invalid frequency {}, must be positive", signal.id, signal.frequency));
        }
        if let Some(duration) = signal.duration {
            if !(duration.is_finite() && duration >= 0.0) {
                return Err(format!("Signal {} has invalid duration {}, must be non-negative", signal.id, duration));
            }
        }
    }

    let mut emitter_ids = HashSet::new();
    for emitter in scenario.emitters() {
        if !emitter_ids.insert(emitter.id.as_str()) {
            log::warn!("Duplicate emitter id '{}': lookups resolve to the first definition", emitter.id);
        }
        if !signal_ids.contains(emitter.signal_id.as_str()) {
            return Err(format!("Emitter {} references unknown signal '{}'", emitter.id, emitter.signal_id));
        }
        if !emitter.amplitude.is_finite() {
            return Err(format!("Emitter {} has non-finite amplitude", emitter.id));
        }
        if !emitter.delay.is_finite() {
            return Err(format!("Emitter {} has non-finite delay", emitter.id));
        }
        if !emitter.position.is_finite() {
            return Err(format!("Emitter {} has non-finite position", emitter.id));
        }
        if emitter.kind == EmitterKind::Directional {
            log::warn!("Emitter {} is directional; directivity is not modelled, evaluating as omni", emitter.id);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::types::DEFAULT_EMITTER_AMPLITUDE;
    use crate::vector::Vector2;

    const TWO_ELEMENT_ARRAY: &str = r#"{
        "medium": { "propagation_speed": 343 },
        "sim_area": { "min_corner": [-10, -10], "size": [20, 20] },
        "signals": [ { "id": "S0", "kind": "sine", "frequency": 440, "duration": 0.5 } ],
        "emitters": [
            { "id": "E0", "signal_id": "S0", "position": [0, 0] },
            { "id": "E1", "signal_id": "S0", "kind": "directional", "position": [0, 0.39], "amplitude": 10, "delay": 0.001 }
        ],
        "reflectors": [ { "id": "T0", "type": "circle", "position": [0, 6], "radius": 0.1 } ]
    }"#;

    #[test]
    fn parses_scenario_with_defaults() {
        let scenario = parse_scenario(TWO_ELEMENT_ARRAY).unwrap();
        assert_eq!(scenario.emitters().len(), 2);
        let e0 = scenario.find_emitter("E0").unwrap();
        assert_eq!(e0.amplitude, DEFAULT_EMITTER_AMPLITUDE);
        assert_eq!(e0.delay, 0.0);
        assert_eq!(e0.direction, Vector2::new(0.0, 1.0));
        let e1 = scenario.find_emitter("E1").unwrap();
        assert_eq!(e1.kind, EmitterKind::Directional);
        assert_eq!(e1.amplitude, 10.0);
        assert_eq!(scenario.find_signal("S0").unwrap().duration, Some(0.5));
        assert_eq!(scenario.medium().near_field_radius, crate::scenario::types::DEFAULT_NEAR_FIELD_RADIUS);
    }

    #[test]
    fn rejects_unknown_signal_reference() {
        let json = TWO_ELEMENT_ARRAY.replace(r#""id": "E0", "signal_id": "S0""#, r#""id": "E0", "signal_id": "S1""#);
        match parse_scenario(&json) {
            Err(ScenarioError::ValidationError(msg)) => assert!(msg.contains("unknown signal 'S1'"), "{msg}"),
            other => panic!("expected validation error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn rejects_non_positive_speed() {
        let json = TWO_ELEMENT_ARRAY.replace(r#""propagation_speed": 343"#, r#""propagation_speed": 0"#);
        assert!(matches!(parse_scenario(&json), Err(ScenarioError::ValidationError(_))));
    }

    #[test]
    fn rejects_degenerate_area_at_parse_time() {
        let json = TWO_ELEMENT_ARRAY.replace(r#""size": [20, 20]"#, r#""size": [20, 0]"#);
        assert!(matches!(parse_scenario(&json), Err(ScenarioError::ParseError(_))));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = load_scenario(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ScenarioError::FileReadError(_)));
        assert!(err.to_string().starts_with("Failed to read file"));
    }

    #[test]
    fn duplicate_ids_are_accepted() {
        let json = TWO_ELEMENT_ARRAY.replace(r#""id": "E1""#, r#""id": "E0""#);
        let scenario = parse_scenario(&json).unwrap();
        assert_eq!(scenario.find_emitter("E0").unwrap().position, Vector2::ZERO);
    }
}
