//! Wave field evaluation and run scheduling.
//!
//! ## Module Organization
//!
//! - `propagation`: Point-source displacement, superposition, coherence and region sampling
//! - `steering`: Transmit delay computation and application
//! - `observers`: Model change subscribers
//! - `scheduler`: Region task queue, simulation clock and run progress
//! - `task`: Embassy task hosting a scenario behind command and event channels
//!
//! ## Public API
//!
//! Evaluation functions can be called directly for one-off queries. Incremental
//! whole-area evaluation goes through [`RegionTaskScheduler`], either driven
//! by the caller or by `simulation_task` spawned on the Embassy executor.

pub mod observers;
pub mod propagation;
pub mod scheduler;
pub mod steering;
pub mod task;

pub use observers::{ModelChange, ModelObservers, SubscriptionId};
pub use propagation::{
    RegionField, SampleMode, SampleRequest, coherence_at, contributions_at, displacement_at, field_at, sample_position, sample_region,
    signal_value,
};
pub use scheduler::{CancelToken, RegionReport, RegionTaskScheduler, SimTask, SimulationClock};
pub use steering::{EmitterDelay, apply_delays, compute_delays, lead_emitter_for, steer};
pub use task::{SimCommand, SimEvent, SimulationHost, SimulationSettings, simulation_task};
