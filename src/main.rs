use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use embassy_executor::{Executor, Spawner};
use env_logger::Builder;
use log::{LevelFilter, error, info};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::thread;

use beamforming_simulator::config::SimulatorConfig;
use beamforming_simulator::geometry::AxisAlignedRegion;
use beamforming_simulator::scenario::{Scenario, load_scenario};
use beamforming_simulator::simulation::task::{CommandChannel, CommandChannelReceiver, EventChannel, EventChannelSender};
use beamforming_simulator::simulation::{
    EmitterDelay, RegionField, SampleMode, SimCommand, SimEvent, SimulationSettings, compute_delays, lead_emitter_for, simulation_task,
};
use beamforming_simulator::vector::{deg_to_rad, to_engineering_string};

#[derive(Parser)]
#[command(name = "beamforming-simulator")]
#[command(version, about = "Acoustic beamforming field simulator")]
struct Cli {
    /// Simulator settings (TOML). Built-in defaults when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate the field over the whole simulation area.
    Run {
        /// Scenario file (JSON). Uses the built-in single-emitter scenario when omitted.
        scenario: Option<PathBuf>,

        /// Simulation time in seconds.
        #[arg(short, long, default_value_t = 0.0)]
        time: f64,

        /// Steer the array to this angle (degrees from +x) before evaluating.
        #[arg(long, allow_negative_numbers = true)]
        steer_deg: Option<f64>,

        /// Reference emitter for steering. Defaults to the lead emitter for the angle.
        #[arg(short, long)]
        reference: Option<String>,

        /// Number of horizontal strips, overriding the config.
        #[arg(short = 'n', long)]
        sub_regions: Option<usize>,

        /// Write sampled region fields to this JSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the transmit delays that steer the array to an angle.
    Steer {
        /// Scenario file (JSON). Uses the built-in scenario when omitted.
        scenario: Option<PathBuf>,

        /// Steering angle in degrees from +x.
        #[arg(short, long, allow_negative_numbers = true)]
        angle_deg: f64,

        /// Reference emitter. Defaults to the lead emitter for the angle.
        #[arg(short, long)]
        reference: Option<String>,
    },

    /// Load and validate a scenario file.
    Validate {
        /// Scenario file (JSON).
        scenario: PathBuf,
    },
}

/// Sampled output of one run, as written by `run --output`.
#[derive(Serialize)]
struct RunOutput<'a> {
    sim_area: &'a AxisAlignedRegion,
    sim_time: f64,
    sample_mode: SampleMode,
    regions: Vec<RegionField>,
}

fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match SimulatorConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("Error: {err}");
                std::process::exit(1);
            }
        },
        None => SimulatorConfig::default(),
    };

    // Logging setup
    Builder::new()
        .filter_level(LevelFilter::Warn)
        .filter(Some("beamforming_simulator"), config.log_filter().unwrap_or(LevelFilter::Info))
        .init();

    let result = match cli.command {
        Commands::Run {
            scenario,
            time,
            steer_deg,
            reference,
            sub_regions,
            output,
        } => {
            let mut settings = config.settings();
            if let Some(sub_regions) = sub_regions {
                settings.sub_regions = sub_regions;
            }
            run(scenario.as_deref(), settings, time, steer_deg, reference, output.as_deref())
        }
        Commands::Steer {
            scenario,
            angle_deg,
            reference,
        } => steer(scenario.as_deref(), angle_deg, reference),
        Commands::Validate { scenario } => validate(&scenario),
    };

    if let Err(err) = result {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn scenario_from(path: Option<&Path>) -> Result<Scenario> {
    match path {
        Some(path) => Ok(load_scenario(path)?),
        None => {
            info!("No scenario file given, using the built-in scenario");
            Ok(Scenario::default())
        }
    }
}

fn reference_for(scenario: &Scenario, reference: Option<String>, angle: f64) -> Result<String> {
    match reference {
        Some(reference) => Ok(reference),
        None => lead_emitter_for(scenario, angle)
            .map(|e| e.id.clone())
            .ok_or_else(|| anyhow!("scenario has no emitters to steer")),
    }
}

fn print_delays(delays: &[EmitterDelay]) {
    for entry in delays {
        println!("{:>8}  {}", entry.emitter_id, to_engineering_string(entry.delay, "s"));
    }
}

fn embassy_init(spawner: Spawner, scenario: Scenario, settings: SimulationSettings, command_rx: CommandChannelReceiver, event_tx: EventChannelSender) {
    let _ = spawner.spawn(simulation_task(scenario, settings, command_rx, event_tx));
}

fn run(
    scenario_path: Option<&Path>,
    settings: SimulationSettings,
    sim_time: f64,
    steer_deg: Option<f64>,
    reference: Option<String>,
    output: Option<&Path>,
) -> Result<()> {
    let scenario = scenario_from(scenario_path)?;
    let steering = match steer_deg {
        Some(deg) => {
            let angle = deg_to_rad(deg);
            Some((reference_for(&scenario, reference, angle)?, angle))
        }
        None => None,
    };

    let command_channel: &'static CommandChannel = Box::leak(Box::new(CommandChannel::new()));
    let event_channel: &'static EventChannel = Box::leak(Box::new(EventChannel::new()));
    let command_tx = command_channel.sender();
    let command_rx = command_channel.receiver();
    let event_tx = event_channel.sender();
    let event_rx = event_channel.receiver();

    // Spawn Embassy executor on a dedicated background thread
    let task_scenario = scenario.clone();
    thread::Builder::new()
        .name("embassy-executor".to_string())
        .spawn(move || {
            // Leak the executor to satisfy the 'static lifetime required by run()
            let executor: &'static mut Executor = Box::leak(Box::new(Executor::new()));
            executor.run(|spawner| embassy_init(spawner, task_scenario, settings, command_rx, event_tx));
        })
        .context("failed to spawn embassy thread")?;

    let (regions, failures) = embassy_futures::block_on(async {
        command_tx.send(SimCommand::SetSimTime(sim_time)).await;
        if let Some((reference, angle)) = steering {
            command_tx.send(SimCommand::Steer { reference, angle }).await;
        }
        command_tx
            .send(SimCommand::StartRun {
                sub_regions: settings.sub_regions,
            })
            .await;

        let mut regions = Vec::with_capacity(settings.sub_regions);
        let mut failures = 0;
        loop {
            match event_rx.receive().await {
                SimEvent::RegionDone(report) => {
                    info!("Region {} of run {} done ({:.0}%)", report.index + 1, report.run_id, report.progress);
                    match report.outcome {
                        Ok(field) => regions.push(field),
                        Err(err) => {
                            error!("Region {} failed: {}", report.region, err);
                            failures += 1;
                        }
                    }
                }
                SimEvent::DelaysComputed(delays) => print_delays(&delays),
                SimEvent::Alert(message) => bail!(message),
                SimEvent::RunFinished { .. } => break,
                SimEvent::ModelChanged(_) | SimEvent::Stopped => {}
            }
        }
        command_tx.send(SimCommand::Shutdown).await;
        while !matches!(event_rx.receive().await, SimEvent::Stopped) {}
        Ok::<_, anyhow::Error>((regions, failures))
    })?;

    let peak = regions.iter().map(|r| r.peak_displacement).fold(0.0, f64::max);
    println!(
        "Evaluated {} region(s) at t={} ({} failed), peak displacement {:.4}",
        regions.len() + failures,
        to_engineering_string(sim_time, "s"),
        failures,
        peak
    );

    if let Some(path) = output {
        let file = File::create(path).with_context(|| format!("Failed to create output file: {}", path.display()))?;
        let run_output = RunOutput {
            sim_area: scenario.sim_area(),
            sim_time,
            sample_mode: settings.sample_mode,
            regions,
        };
        serde_json::to_writer_pretty(BufWriter::new(file), &run_output).context("Failed to write region fields")?;
        info!("Region fields written to {}", path.display());
    }

    if failures > 0 {
        bail!("{} region(s) could not be evaluated", failures);
    }
    Ok(())
}

fn steer(scenario_path: Option<&Path>, angle_deg: f64, reference: Option<String>) -> Result<()> {
    let scenario = scenario_from(scenario_path)?;
    let angle = deg_to_rad(angle_deg);
    let reference = reference_for(&scenario, reference, angle)?;
    let delays = compute_delays(&scenario, &reference, angle)?;
    println!("Steering to {angle_deg} deg, reference {reference}:");
    print_delays(&delays);
    Ok(())
}

fn validate(path: &Path) -> Result<()> {
    let scenario = load_scenario(path)?;
    println!(
        "{}: OK ({} signal(s), {} emitter(s), {} reflector(s), area {})",
        path.display(),
        scenario.signals().len(),
        scenario.emitters().len(),
        scenario.reflectors().len(),
        scenario.sim_area()
    );
    Ok(())
}
