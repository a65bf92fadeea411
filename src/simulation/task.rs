//! Simulation task: owns the scenario and the region scheduler and talks to the
//! host over embassy channels.
//!
//! High-level flow each loop turn:
//! 1) While idle, wait for the next command.
//! 2) While a run is active, `select` between the next command and the yield
//!    timer; when the timer wins, evaluate one region.
//! 3) Forward every event produced by the turn to the host.
//!
//! Commands that mutate the model (time, delays, amplitudes) are held back
//! while a run is reading the scenario and applied once the run finishes or is
//! cancelled.

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use embassy_time::Duration;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::scenario::Scenario;

use super::observers::{ModelChange, ModelObservers};
use super::propagation::SampleMode;
use super::scheduler::{RegionReport, RegionTaskScheduler, yield_to_host};
use super::steering::{EmitterDelay, apply_delays, steer};

pub const COMMAND_CHANNEL_SIZE: usize = 32;
pub type CommandChannel = Channel<CriticalSectionRawMutex, SimCommand, COMMAND_CHANNEL_SIZE>;
pub type CommandChannelReceiver = Receiver<'static, CriticalSectionRawMutex, SimCommand, COMMAND_CHANNEL_SIZE>;
pub type CommandChannelSender = Sender<'static, CriticalSectionRawMutex, SimCommand, COMMAND_CHANNEL_SIZE>;

pub const EVENT_CHANNEL_SIZE: usize = 64;
pub type EventChannel = Channel<CriticalSectionRawMutex, SimEvent, EVENT_CHANNEL_SIZE>;
pub type EventChannelReceiver = Receiver<'static, CriticalSectionRawMutex, SimEvent, EVENT_CHANNEL_SIZE>;
pub type EventChannelSender = Sender<'static, CriticalSectionRawMutex, SimEvent, EVENT_CHANNEL_SIZE>;

#[derive(Debug, Clone, PartialEq)]
pub enum SimCommand {
    StartRun { sub_regions: usize },
    SetSimTime(f64),
    /// Steering angle in radians.
    Steer { reference: String, angle: f64 },
    ApplyDelays(Vec<EmitterDelay>),
    SetAmplitude { id: String, amplitude: f64 },
    Cancel,
    Reset,
    Shutdown,
}

impl SimCommand {
    fn mutates_model(&self) -> bool {
        matches!(
            self,
            SimCommand::SetSimTime(_) | SimCommand::Steer { .. } | SimCommand::ApplyDelays(_) | SimCommand::SetAmplitude { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub enum SimEvent {
    RegionDone(RegionReport),
    ModelChanged(ModelChange),
    DelaysComputed(Vec<EmitterDelay>),
    RunFinished { run_id: u64 },
    Alert(String),
    Stopped,
}

/// Evaluation parameters for runs started by the task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationSettings {
    /// Strip count for runs started by the front end.
    pub sub_regions: usize,
    pub columns: usize,
    pub rows: usize,
    pub sample_mode: SampleMode,
    pub yield_delay: Duration,
}

/// The simulation state behind the task loop, usable without an executor.
pub struct SimulationHost {
    scenario: Scenario,
    scheduler: RegionTaskScheduler,
    observers: ModelObservers,
    settings: SimulationSettings,
    completed: Rc<RefCell<Vec<RegionReport>>>,
    outbox: Rc<RefCell<VecDeque<SimEvent>>>,
    deferred: VecDeque<SimCommand>,
}

impl SimulationHost {
    pub fn new(scenario: Scenario, settings: SimulationSettings) -> Self {
        let outbox = Rc::new(RefCell::new(VecDeque::new()));
        let mut observers = ModelObservers::new();
        let sink = Rc::clone(&outbox);
        observers.subscribe(move |change: &ModelChange| sink.borrow_mut().push_back(SimEvent::ModelChanged(change.clone())));

        Self {
            scenario,
            scheduler: RegionTaskScheduler::new(),
            observers,
            settings,
            completed: Rc::new(RefCell::new(Vec::new())),
            outbox,
            deferred: VecDeque::new(),
        }
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn scheduler(&self) -> &RegionTaskScheduler {
        &self.scheduler
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    /// Extra subscribers see the same changes that are forwarded as events.
    pub fn observers_mut(&mut self) -> &mut ModelObservers {
        &mut self.observers
    }

    pub fn is_running(&self) -> bool {
        !self.scheduler.is_idle()
    }

    /// Handle one command. Returns false once the task should stop.
    pub fn handle_command(&mut self, command: SimCommand) -> bool {
        if self.is_running() && command.mutates_model() {
            log::debug!("Deferring {:?} until the active run ends", command);
            self.deferred.push_back(command);
            return true;
        }

        match command {
            SimCommand::StartRun { sub_regions } => {
                let sink = Rc::clone(&self.completed);
                let area = *self.scenario.sim_area();
                if let Err(err) = self
                    .scheduler
                    .start_run(&area, sub_regions, self.settings.rows, move |report| sink.borrow_mut().push(report.clone()))
                {
                    self.alert(format!("Cannot start run: {}", err));
                }
            }
            SimCommand::SetSimTime(sim_time) => {
                if let Err(err) = self.scheduler.set_sim_time(sim_time) {
                    self.alert(err.to_string());
                }
            }
            SimCommand::Steer { reference, angle } => match steer(&mut self.scenario, &reference, angle, &mut self.observers) {
                Ok(delays) => self.push(SimEvent::DelaysComputed(delays)),
                Err(err) => self.alert(format!("Steering failed: {}", err)),
            },
            SimCommand::ApplyDelays(delays) => {
                if let Err(err) = apply_delays(&mut self.scenario, &delays, &mut self.observers) {
                    self.alert(format!("Cannot apply delays: {}", err));
                }
            }
            SimCommand::SetAmplitude { id, amplitude } => match self.scenario.set_emitter_amplitude(&id, amplitude) {
                Ok(()) => self.observers.notify(&ModelChange::AmplitudeChanged(id)),
                Err(err) => self.alert(err.to_string()),
            },
            SimCommand::Cancel => {
                self.scheduler.cancel();
                self.apply_deferred();
            }
            SimCommand::Reset => {
                if !self.deferred.is_empty() {
                    log::debug!("Reset drops {} deferred command(s)", self.deferred.len());
                    self.deferred.clear();
                }
                self.scheduler.reset();
            }
            SimCommand::Shutdown => {
                self.scheduler.cancel();
                self.push(SimEvent::Stopped);
                return false;
            }
        }
        true
    }

    /// Evaluate the next queued region. Returns false when nothing was queued.
    pub fn step(&mut self) -> bool {
        let ran = self.scheduler.run_next_task(&self.scenario, self.settings.columns, self.settings.sample_mode);

        let reports: Vec<RegionReport> = self.completed.borrow_mut().drain(..).collect();
        for report in reports {
            if report.outcome.is_ok() {
                self.observers.notify(&ModelChange::RegionSimulated(report.region));
            }
            let finished = report.queue_empty.then_some(report.run_id);
            self.push(SimEvent::RegionDone(report));
            if let Some(run_id) = finished {
                self.push(SimEvent::RunFinished { run_id });
            }
        }

        if !self.is_running() {
            self.apply_deferred();
        }
        ran
    }

    /// Events produced since the last call, oldest first.
    pub fn take_events(&mut self) -> Vec<SimEvent> {
        self.outbox.borrow_mut().drain(..).collect()
    }

    fn apply_deferred(&mut self) {
        while let Some(command) = self.deferred.pop_front() {
            self.handle_command(command);
        }
    }

    fn push(&self, event: SimEvent) {
        self.outbox.borrow_mut().push_back(event);
    }

    fn alert(&self, message: String) {
        log::warn!("{}", message);
        self.push(SimEvent::Alert(message));
    }
}

/// Drive `host` from `command_rx` until a shutdown command, forwarding events to `event_tx`.
pub async fn serve(
    host: &mut SimulationHost,
    command_rx: Receiver<'_, CriticalSectionRawMutex, SimCommand, COMMAND_CHANNEL_SIZE>,
    event_tx: Sender<'_, CriticalSectionRawMutex, SimEvent, EVENT_CHANNEL_SIZE>,
) {
    let yield_delay = host.settings().yield_delay;
    loop {
        let command = if host.is_running() {
            match select(command_rx.receive(), yield_to_host(yield_delay)).await {
                Either::First(command) => Some(command),
                Either::Second(()) => {
                    host.step();
                    None
                }
            }
        } else {
            Some(command_rx.receive().await)
        };

        let keep_running = command.is_none_or(|command| host.handle_command(command));
        for event in host.take_events() {
            event_tx.send(event).await;
        }
        if !keep_running {
            break;
        }
    }
}

/// Simulation task spawned on the embassy executor.
#[embassy_executor::task]
pub async fn simulation_task(scenario: Scenario, settings: SimulationSettings, command_rx: CommandChannelReceiver, event_tx: EventChannelSender) {
    log::info!(
        "Simulation task started: {} emitter(s), {}x{} samples, {} sub-region(s) by default",
        scenario.emitters().len(),
        settings.columns,
        settings.rows,
        settings.sub_regions
    );
    let mut host = SimulationHost::new(scenario, settings);
    serve(&mut host, command_rx, event_tx).await;
    log::info!("Simulation task stopped");
}
