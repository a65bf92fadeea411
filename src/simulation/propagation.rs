//! Point-source wave propagation and superposition.
//!
//! Contains helpers for:
//! - Evaluating a signal waveform at a time offset
//! - Displacement contributed by one emitter at a point and time
//! - Superposed field and per-emitter contributions at a point
//! - Coherence estimate from the spread of per-emitter contributions
//! - Sampling a whole region onto a regular grid
//!
//! Units:
//! - Distance: meters
//! - Time: seconds
//! - Displacement: emitter amplitude units per meter (1/r spreading)

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::BeamformingError;
use crate::geometry::AxisAlignedRegion;
use crate::scenario::{Emitter, Medium, Scenario, Signal, SignalKind};
use crate::vector::Vector2;

/// Which quantities a region sample computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleMode {
    /// Superposed displacement only.
    Displacement,
    /// Coherence only.
    Coherence,
    /// Both channels.
    #[default]
    Both,
}

impl SampleMode {
    fn wants_displacement(self) -> bool {
        matches!(self, SampleMode::Displacement | SampleMode::Both)
    }

    fn wants_coherence(self) -> bool {
        matches!(self, SampleMode::Coherence | SampleMode::Both)
    }
}

/// Value of a signal `time_offset` seconds after transmission started.
///
/// With a duration the signal is silent outside `[0, duration]`; without one it
/// is an endless carrier and negative offsets are evaluated as well.
pub fn signal_value(signal: &Signal, time_offset: f64) -> f64 {
    match signal.kind {
        SignalKind::Sine => {
            if let Some(duration) = signal.duration {
                if time_offset < 0.0 || time_offset > duration {
                    return 0.0;
                }
            }
            (2.0 * PI * signal.frequency * time_offset).sin()
        }
    }
}

/// Instantaneous displacement produced by `emitter` at `point` at simulation time `sim_time`.
///
/// The wave leaves the emitter `emitter.delay` seconds into the simulation and
/// needs `distance / propagation_speed` seconds to arrive. Amplitude falls off
/// as 1/distance; distances below the medium's near-field radius are clamped to
/// it so the emitter's own location yields a finite value.
pub fn displacement_at(scenario: &Scenario, emitter: &Emitter, point: Vector2, sim_time: f64) -> Result<f64, BeamformingError> {
    let signal = scenario.find_signal(&emitter.signal_id)?;
    Ok(displacement_from(scenario.medium(), emitter, signal, point, sim_time))
}

fn displacement_from(medium: &Medium, emitter: &Emitter, signal: &Signal, point: Vector2, sim_time: f64) -> f64 {
    let distance = point.sub(emitter.position).magnitude().max(medium.near_field_radius);
    let propagation_delay = distance / medium.propagation_speed;
    let retarded_time = sim_time - propagation_delay - emitter.delay;
    emitter.amplitude * signal_value(signal, retarded_time) / distance
}

/// Emitters paired with their resolved signals, in emitter order.
///
/// Resolved once per evaluation so the per-sample loop does not scan the
/// signal list again.
struct Sources<'a> {
    medium: &'a Medium,
    pairs: Vec<(&'a Emitter, &'a Signal)>,
}

impl<'a> Sources<'a> {
    fn resolve(scenario: &'a Scenario) -> Result<Self, BeamformingError> {
        let pairs = scenario
            .emitters()
            .iter()
            .map(|e| scenario.find_signal(&e.signal_id).map(|s| (e, s)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            medium: scenario.medium(),
            pairs,
        })
    }

    fn contributions_into(&self, point: Vector2, sim_time: f64, out: &mut Vec<f64>) {
        out.clear();
        out.extend(self.pairs.iter().map(|(e, s)| displacement_from(self.medium, e, s, point, sim_time)));
    }
}

/// Superposed displacement of every emitter at `point`.
pub fn field_at(scenario: &Scenario, point: Vector2, sim_time: f64) -> Result<f64, BeamformingError> {
    Ok(contributions_at(scenario, point, sim_time)?.iter().sum())
}

/// Per-emitter displacement contributions at `point`, in emitter order.
pub fn contributions_at(scenario: &Scenario, point: Vector2, sim_time: f64) -> Result<Vec<f64>, BeamformingError> {
    let sources = Sources::resolve(scenario)?;
    let mut contributions = Vec::with_capacity(sources.pairs.len());
    sources.contributions_into(point, sim_time, &mut contributions);
    Ok(contributions)
}

/// Coherence estimate at `point`: the population standard deviation of the
/// per-emitter contributions around their mean. Lower means the emitters agree
/// more closely. Zero when there are no emitters.
pub fn coherence_at(scenario: &Scenario, point: Vector2, sim_time: f64) -> Result<f64, BeamformingError> {
    Ok(spread(&contributions_at(scenario, point, sim_time)?))
}

fn spread(contributions: &[f64]) -> f64 {
    if contributions.is_empty() {
        return 0.0;
    }
    let n = contributions.len() as f64;
    let mean = contributions.iter().sum::<f64>() / n;
    let variance = contributions.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

/// Position of grid cell (`column`, `row`) when `region` is sampled with
/// `columns` x `rows` points. Row 0 lies on the top edge.
pub fn sample_position(region: &AxisAlignedRegion, columns: usize, rows: usize, column: usize, row: usize) -> Vector2 {
    let size = region.size();
    Vector2::new(
        region.min_corner().x + column as f64 * size.x / columns as f64,
        region.top_left().y - row as f64 * size.y / rows as f64,
    )
}

/// Parameters for sampling one region.
#[derive(Debug, Clone, Copy)]
pub struct SampleRequest {
    pub region: AxisAlignedRegion,
    pub columns: usize,
    pub rows: usize,
    pub sim_time: f64,
    pub mode: SampleMode,
}

/// Sampled values of one region at one instant, row-major from the top row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionField {
    pub region: AxisAlignedRegion,
    pub columns: usize,
    pub rows: usize,
    pub sim_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub displacement: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coherence: Option<Vec<f64>>,
    /// Largest superposed displacement seen in the region (never below 0).
    pub peak_displacement: f64,
    /// Emitters located inside the region, for markers drawn by a renderer.
    pub emitters_inside: Vec<String>,
}

impl RegionField {
    /// Displacement at grid cell (`column`, `row`), if that channel was sampled.
    /// `None` outside the grid as well.
    pub fn displacement_at(&self, column: usize, row: usize) -> Option<f64> {
        let index = self.cell_index(column, row)?;
        self.displacement.as_ref().map(|d| d[index])
    }

    pub fn coherence_at(&self, column: usize, row: usize) -> Option<f64> {
        let index = self.cell_index(column, row)?;
        self.coherence.as_ref().map(|c| c[index])
    }

    fn cell_index(&self, column: usize, row: usize) -> Option<usize> {
        (column < self.columns && row < self.rows).then(|| row * self.columns + column)
    }
}

/// Evaluate the scenario over a `columns` x `rows` grid covering `request.region`.
///
/// Runs synchronously to completion; cost is O(columns · rows · emitters).
pub fn sample_region(scenario: &Scenario, request: &SampleRequest) -> Result<RegionField, BeamformingError> {
    if request.columns == 0 || request.rows == 0 {
        return Err(BeamformingError::InvalidArgument(format!(
            "sample grid must be at least 1x1, got {}x{}",
            request.columns, request.rows
        )));
    }
    let sources = Sources::resolve(scenario)?;

    let cells = request.columns * request.rows;
    let mut displacement = request.mode.wants_displacement().then(|| Vec::with_capacity(cells));
    let mut coherence = request.mode.wants_coherence().then(|| Vec::with_capacity(cells));
    let mut peak_displacement = 0.0_f64;
    let mut contributions = Vec::with_capacity(sources.pairs.len());

    for row in 0..request.rows {
        for column in 0..request.columns {
            let point = sample_position(&request.region, request.columns, request.rows, column, row);
            sources.contributions_into(point, request.sim_time, &mut contributions);

            let total: f64 = contributions.iter().sum();
            if !total.is_finite() {
                return Err(BeamformingError::NonFiniteSample { x: point.x, y: point.y });
            }
            peak_displacement = peak_displacement.max(total);

            if let Some(values) = displacement.as_mut() {
                values.push(total);
            }
            if let Some(values) = coherence.as_mut() {
                values.push(spread(&contributions));
            }
        }
    }

    Ok(RegionField {
        region: request.region,
        columns: request.columns,
        rows: request.rows,
        sim_time: request.sim_time,
        displacement,
        coherence,
        peak_displacement,
        emitters_inside: scenario.emitters_in(&request.region).map(|e| e.id.clone()).collect(),
    })
}
