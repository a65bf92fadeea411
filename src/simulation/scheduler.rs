//! Region task scheduler.
//!
//! The simulation area is split into horizontal strips which are queued as
//! independent units of work and evaluated one per scheduling turn. Between
//! tasks the drain loop yields back to the executor so other tasks (command
//! handling, the host's UI) keep running while a large area is evaluated.
//!
//! High-level flow:
//! 1) `start_run` discards any previous queue ("latest run wins") and enqueues
//!    one task per strip.
//! 2) `run_next_task` pops one task, samples its region at the clock's current
//!    time, updates progress and reports the outcome to the run's callback.
//! 3) `drain` repeats step 2 with a yield point between tasks until the queue
//!    is empty or the run is cancelled.
//!
//! Tasks only read the scenario, so a worker-pool variant could evaluate them
//! in parallel and report in queue order. That is not implemented here.

use embassy_time::{Duration, Timer};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::BeamformingError;
use crate::geometry::AxisAlignedRegion;
use crate::scenario::Scenario;

use super::propagation::{RegionField, SampleMode, SampleRequest, sample_region};

/// Progress value of a finished run, in percent.
pub const PROGRESS_COMPLETE: f64 = 100.0;

/// Callback invoked once per completed region.
pub type RegionCallback = Box<dyn FnMut(&RegionReport)>;

/// Simulation time. Only ever changed explicitly; evaluation never advances it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SimulationClock {
    sim_time: f64,
}

impl SimulationClock {
    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    /// Set the simulation time in seconds. Must be finite and non-negative.
    pub fn set_sim_time(&mut self, sim_time: f64) -> Result<(), BeamformingError> {
        if !(sim_time.is_finite() && sim_time >= 0.0) {
            return Err(BeamformingError::InvalidArgument(format!(
                "simulation time must be finite and non-negative, got {}",
                sim_time
            )));
        }
        self.sim_time = sim_time;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.sim_time = 0.0;
    }
}

/// One queued unit of work: a strip of the simulation area.
#[derive(Debug, Clone, PartialEq)]
pub struct SimTask {
    pub run_id: u64,
    /// Position of the strip within its run, from the bottom edge upward.
    pub index: usize,
    pub region: AxisAlignedRegion,
    /// Sample rows allotted to this strip.
    pub rows: usize,
    pub progress_increment: f64,
}

/// Outcome of one region task, delivered to the run's callback.
#[derive(Debug, Clone)]
pub struct RegionReport {
    pub run_id: u64,
    pub index: usize,
    pub region: AxisAlignedRegion,
    /// The sampled field, or why the region could not be evaluated.
    pub outcome: Result<RegionField, BeamformingError>,
    /// Run progress in percent after this region, clamped to 100.
    pub progress: f64,
    /// True when no task of the run remains queued.
    pub queue_empty: bool,
}

/// Cooperative cancellation handle for the active run.
///
/// Cloned handles share one generation counter; `cancel` bumps it and the
/// scheduler drops its queue before the next dequeue. Safe to use from another
/// thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicU64>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    fn generation(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// FIFO scheduler of region tasks plus the simulation clock and run progress.
pub struct RegionTaskScheduler {
    queue: VecDeque<SimTask>,
    clock: SimulationClock,
    progress: f64,
    next_run_id: u64,
    active_run: Option<u64>,
    on_region_done: Option<RegionCallback>,
    cancel: CancelToken,
    run_generation: u64,
}

impl Default for RegionTaskScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionTaskScheduler {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            clock: SimulationClock::default(),
            progress: 0.0,
            next_run_id: 1,
            active_run: None,
            on_region_done: None,
            cancel: CancelToken::default(),
            run_generation: 0,
        }
    }

    pub fn sim_time(&self) -> f64 {
        self.clock.sim_time()
    }

    pub fn set_sim_time(&mut self, sim_time: f64) -> Result<(), BeamformingError> {
        self.clock.set_sim_time(sim_time)
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Id of the run whose tasks are queued, if any.
    pub fn active_run(&self) -> Option<u64> {
        self.active_run
    }

    /// Handle that cancels the active run from elsewhere.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Queue a run over `area` split into `sub_regions` horizontal strips.
    ///
    /// Any queued tasks of a previous run are discarded along with its callback.
    /// `rows` sample rows are spread as evenly as possible, lower strips taking
    /// one extra row when they do not divide, and each strip's height follows
    /// its row count so the stitched grid has one row pitch. Returns the new
    /// run id.
    pub fn start_run(
        &mut self,
        area: &AxisAlignedRegion,
        sub_regions: usize,
        rows: usize,
        on_region_done: impl FnMut(&RegionReport) + 'static,
    ) -> Result<u64, BeamformingError> {
        if sub_regions == 0 {
            return Err(BeamformingError::InvalidArgument("a run needs at least one sub-region".to_string()));
        }
        let rows_per_strip = rows / sub_regions;
        if rows_per_strip == 0 {
            return Err(BeamformingError::InvalidArgument(format!(
                "{} sample rows cannot be shared between {} sub-regions",
                rows, sub_regions
            )));
        }

        if let Some(previous) = self.active_run {
            log::debug!("Run {} superseded with {} region(s) still queued", previous, self.queue.len());
        }
        self.queue.clear();

        let run_id = self.next_run_id;
        self.next_run_id += 1;
        self.active_run = Some(run_id);
        self.progress = 0.0;
        self.on_region_done = Some(Box::new(on_region_done));
        self.run_generation = self.cancel.generation();

        let progress_increment = PROGRESS_COMPLETE / sub_regions as f64;
        let extra_rows = rows % sub_regions;
        let row_counts: Vec<usize> = (0..sub_regions).map(|i| rows_per_strip + usize::from(i < extra_rows)).collect();
        for (index, (region, strip_rows)) in area.split_by_rows(&row_counts).into_iter().zip(row_counts).enumerate() {
            self.queue.push_back(SimTask {
                run_id,
                index,
                region,
                rows: strip_rows,
                progress_increment,
            });
        }

        log::info!("Run {} queued: {} sub-region(s) of {} at t={}s", run_id, sub_regions, area, self.clock.sim_time());
        Ok(run_id)
    }

    /// Drop all queued tasks. Returns how many were discarded.
    pub fn cancel(&mut self) -> usize {
        let discarded = self.queue.len();
        self.queue.clear();
        if let Some(run_id) = self.active_run.take() {
            log::info!("Run {} cancelled, {} region(s) discarded", run_id, discarded);
        }
        discarded
    }

    /// Cancel any run and return time and progress to zero.
    pub fn reset(&mut self) {
        self.cancel();
        self.clock.reset();
        self.progress = 0.0;
    }

    /// Evaluate the next queued task. Returns false when nothing ran (queue empty
    /// or run cancelled).
    ///
    /// A region that fails to evaluate is reported through the callback with
    /// its error; the remaining tasks stay queued.
    pub fn run_next_task(&mut self, scenario: &Scenario, columns: usize, mode: SampleMode) -> bool {
        if self.cancel.generation() != self.run_generation {
            self.run_generation = self.cancel.generation();
            self.cancel();
            return false;
        }
        let Some(task) = self.queue.pop_front() else {
            return false;
        };

        let request = SampleRequest {
            region: task.region,
            columns,
            rows: task.rows,
            sim_time: self.clock.sim_time(),
            mode,
        };
        let outcome = sample_region(scenario, &request);
        match &outcome {
            Ok(field) => log::debug!(
                "Run {} region {} done ({}x{} samples, peak {:.3})",
                task.run_id,
                task.index,
                field.columns,
                field.rows,
                field.peak_displacement
            ),
            Err(err) => log::error!("Run {} region {} failed: {}", task.run_id, task.index, err),
        }

        self.progress = (self.progress + task.progress_increment).min(PROGRESS_COMPLETE);
        let queue_empty = self.queue.is_empty();
        if queue_empty {
            self.active_run = None;
            log::info!("Run {} finished", task.run_id);
        }

        let report = RegionReport {
            run_id: task.run_id,
            index: task.index,
            region: task.region,
            outcome,
            progress: self.progress,
            queue_empty,
        };
        if let Some(callback) = self.on_region_done.as_mut() {
            callback(&report);
        }
        true
    }

    /// Run every queued task, yielding to the executor between tasks.
    ///
    /// Returns the number of tasks evaluated. Cancellation through a
    /// [`CancelToken`] takes effect at the next yield point.
    pub async fn drain(&mut self, scenario: &Scenario, columns: usize, mode: SampleMode, yield_delay: Duration) -> usize {
        let mut completed = 0;
        while self.run_next_task(scenario, columns, mode) {
            completed += 1;
            if self.is_idle() {
                break;
            }
            yield_to_host(yield_delay).await;
        }
        completed
    }
}

/// Suspend the current task for one scheduling turn, or for `delay` when it is non-zero.
pub async fn yield_to_host(delay: Duration) {
    if delay.as_ticks() == 0 {
        embassy_futures::yield_now().await;
    } else {
        Timer::after(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::tests::{pair_scenario, with_dangling_emitter};
    use crate::vector::Vector2;
    use core::pin::pin;
    use core::task::{Context, Poll, Waker};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Reports = Rc<RefCell<Vec<RegionReport>>>;

    fn collector() -> (Reports, impl FnMut(&RegionReport) + 'static) {
        let reports: Reports = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&reports);
        (reports, move |r: &RegionReport| sink.borrow_mut().push(r.clone()))
    }

    fn area() -> AxisAlignedRegion {
        AxisAlignedRegion::new(Vector2::new(-10.0, -10.0), Vector2::new(20.0, 20.0)).unwrap()
    }

    #[test]
    fn four_strips_four_callbacks_last_one_empties_queue() {
        let scenario = pair_scenario(0.5, 343.0);
        let mut scheduler = RegionTaskScheduler::new();
        let (reports, callback) = collector();
        scheduler.start_run(&area(), 4, 40, callback).unwrap();
        assert_eq!(scheduler.pending(), 4);

        let ran = embassy_futures::block_on(scheduler.drain(&scenario, 10, SampleMode::Both, Duration::from_ticks(0)));
        assert_eq!(ran, 4);

        let reports = reports.borrow();
        assert_eq!(reports.len(), 4);
        let flags: Vec<bool> = reports.iter().map(|r| r.queue_empty).collect();
        assert_eq!(flags, vec![false, false, false, true]);
        for (i, report) in reports.iter().enumerate() {
            assert_eq!(report.index, i);
            assert!((report.region.size().y - 5.0).abs() < 1e-12);
            let field = report.outcome.as_ref().unwrap();
            assert_eq!((field.columns, field.rows), (10, 10));
        }
        assert_eq!(reports.last().unwrap().progress, PROGRESS_COMPLETE);
        assert!(scheduler.is_idle());
        assert_eq!(scheduler.active_run(), None);
    }

    #[test]
    fn progress_accumulates_and_clamps() {
        let scenario = pair_scenario(0.5, 343.0);
        let mut scheduler = RegionTaskScheduler::new();
        let (reports, callback) = collector();
        scheduler.start_run(&area(), 3, 3, callback).unwrap();
        while scheduler.run_next_task(&scenario, 2, SampleMode::Displacement) {}
        let progress: Vec<f64> = reports.borrow().iter().map(|r| r.progress).collect();
        assert!((progress[0] - 100.0 / 3.0).abs() < 1e-9);
        assert!((progress[1] - 200.0 / 3.0).abs() < 1e-9);
        assert!(progress[2] <= PROGRESS_COMPLETE && (progress[2] - PROGRESS_COMPLETE).abs() < 1e-9);
    }

    #[test]
    fn uneven_split_keeps_a_uniform_row_pitch() {
        let mut scheduler = RegionTaskScheduler::new();
        let area = AxisAlignedRegion::new(Vector2::new(0.0, 0.0), Vector2::new(10.0, 10.0)).unwrap();
        scheduler.start_run(&area, 3, 10, |_| {}).unwrap();
        let rows: Vec<usize> = scheduler.queue.iter().map(|t| t.rows).collect();
        assert_eq!(rows, vec![4, 3, 3]);

        let pitch = area.size().y / 10.0;
        for task in &scheduler.queue {
            assert!((task.region.size().y / task.rows as f64 - pitch).abs() < 1e-12, "{task:?}");
        }
        for pair in scheduler.queue.iter().collect::<Vec<_>>().windows(2) {
            assert!((pair[0].region.max_corner().y - pair[1].region.min_corner().y).abs() < 1e-12);
        }
        assert_eq!(scheduler.queue.back().unwrap().region.max_corner().y, area.max_corner().y);
    }

    #[test]
    fn config_sized_split_stays_uniform() {
        let mut scheduler = RegionTaskScheduler::new();
        scheduler.start_run(&area(), 3, 200, |_| {}).unwrap();
        let rows: Vec<usize> = scheduler.queue.iter().map(|t| t.rows).collect();
        assert_eq!(rows, vec![67, 67, 66]);
        let pitch = area().size().y / 200.0;
        assert!(scheduler.queue.iter().all(|t| (t.region.size().y / t.rows as f64 - pitch).abs() < 1e-12));
    }

    #[test]
    fn rejects_unusable_splits() {
        let mut scheduler = RegionTaskScheduler::new();
        assert!(scheduler.start_run(&area(), 0, 10, |_| {}).is_err());
        assert!(scheduler.start_run(&area(), 8, 4, |_| {}).is_err());
        assert!(scheduler.is_idle());
    }

    #[test]
    fn latest_run_wins() {
        let scenario = pair_scenario(0.5, 343.0);
        let mut scheduler = RegionTaskScheduler::new();
        let (first, first_cb) = collector();
        let (second, second_cb) = collector();

        let first_id = scheduler.start_run(&area(), 4, 8, first_cb).unwrap();
        assert!(scheduler.run_next_task(&scenario, 2, SampleMode::Both));
        let second_id = scheduler.start_run(&area(), 2, 8, second_cb).unwrap();
        assert_ne!(first_id, second_id);
        assert_eq!(scheduler.pending(), 2);
        assert_eq!(scheduler.progress(), 0.0);

        while scheduler.run_next_task(&scenario, 2, SampleMode::Both) {}
        assert_eq!(first.borrow().len(), 1);
        assert_eq!(second.borrow().len(), 2);
        assert!(second.borrow().iter().all(|r| r.run_id == second_id));
    }

    #[test]
    fn failing_region_does_not_abort_the_queue() {
        let scenario = with_dangling_emitter(pair_scenario(0.5, 343.0));
        let mut scheduler = RegionTaskScheduler::new();
        let (reports, callback) = collector();
        scheduler.start_run(&area(), 2, 4, callback).unwrap();
        let ran = embassy_futures::block_on(scheduler.drain(&scenario, 2, SampleMode::Both, Duration::from_ticks(0)));
        assert_eq!(ran, 2);
        let reports = reports.borrow();
        assert!(reports.iter().all(|r| matches!(r.outcome, Err(BeamformingError::NotFound { .. }))));
        assert!(reports[1].queue_empty);
    }

    #[test]
    fn cancel_token_stops_before_next_dequeue() {
        let scenario = pair_scenario(0.5, 343.0);
        let mut scheduler = RegionTaskScheduler::new();
        let (reports, callback) = collector();
        scheduler.start_run(&area(), 4, 8, callback).unwrap();
        let token = scheduler.cancel_token();

        assert!(scheduler.run_next_task(&scenario, 2, SampleMode::Both));
        token.cancel();
        assert!(!scheduler.run_next_task(&scenario, 2, SampleMode::Both));
        assert!(scheduler.is_idle());
        assert_eq!(reports.borrow().len(), 1);

        // A cancel issued before a run starts does not affect it.
        let (later, later_cb) = collector();
        scheduler.start_run(&area(), 2, 8, later_cb).unwrap();
        while scheduler.run_next_task(&scenario, 2, SampleMode::Both) {}
        assert_eq!(later.borrow().len(), 2);
    }

    #[test]
    fn drain_yields_between_regions() {
        let scenario = pair_scenario(0.5, 343.0);
        let mut scheduler = RegionTaskScheduler::new();
        let (reports, callback) = collector();
        scheduler.start_run(&area(), 3, 6, callback).unwrap();

        let mut cx = Context::from_waker(Waker::noop());
        let mut drain = pin!(scheduler.drain(&scenario, 2, SampleMode::Both, Duration::from_ticks(0)));
        assert!(drain.as_mut().poll(&mut cx).is_pending());
        assert_eq!(reports.borrow().len(), 1);
        assert!(drain.as_mut().poll(&mut cx).is_pending());
        assert_eq!(reports.borrow().len(), 2);
        assert_eq!(drain.as_mut().poll(&mut cx), Poll::Ready(3));
    }

    #[test]
    fn clock_is_explicit_and_reset_clears_everything() {
        let mut scheduler = RegionTaskScheduler::new();
        assert_eq!(scheduler.sim_time(), 0.0);
        scheduler.set_sim_time(0.25).unwrap();
        assert!(scheduler.set_sim_time(-1.0).is_err());
        assert!(scheduler.set_sim_time(f64::INFINITY).is_err());
        assert_eq!(scheduler.sim_time(), 0.25);

        let scenario = pair_scenario(0.5, 343.0);
        let (reports, callback) = collector();
        scheduler.start_run(&area(), 2, 2, callback).unwrap();
        scheduler.run_next_task(&scenario, 1, SampleMode::Displacement);
        assert_eq!(reports.borrow()[0].outcome.as_ref().unwrap().sim_time, 0.25);

        scheduler.reset();
        assert_eq!(scheduler.sim_time(), 0.0);
        assert_eq!(scheduler.progress(), 0.0);
        assert!(scheduler.is_idle());
        assert_eq!(scheduler.cancel(), 0);
    }
}
