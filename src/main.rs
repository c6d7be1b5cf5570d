use anyhow::{Context, Result, bail};
use rand::SeedableRng;
use rand::rngs::StdRng;
use reactime_core::InputEvent;
use reactime_experiment::{
    BatteryConfig, BatteryDriver, BatteryEvent, JsonSessionRecorder, ParticipantInfo,
    SummaryTable, flatten_summary,
};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod participant;
use participant::{ParticipantModel, SimulatedParticipant};

const USAGE: &str = "usage: reactime [--battery FILE] [--out FILE] [--summary FILE] [--seed N] [--name NAME]";

#[derive(Debug)]
struct Options {
    battery: PathBuf,
    out: PathBuf,
    summary: Option<PathBuf>,
    seed: Option<u64>,
    name: String,
}

impl Options {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut options = Options {
            battery: PathBuf::from("battery.json"),
            out: PathBuf::from("reactime-session.json"),
            summary: None,
            seed: None,
            name: "simulated".to_string(),
        };
        while let Some(flag) = args.next() {
            let mut value = || args.next().with_context(|| format!("{flag} needs a value\n{USAGE}"));
            match flag.as_str() {
                "--battery" => options.battery = value()?.into(),
                "--out" => options.out = value()?.into(),
                "--summary" => options.summary = Some(value()?.into()),
                "--seed" => options.seed = Some(value()?.parse().context("--seed must be a number")?),
                "--name" => options.name = value()?,
                other => bail!("unknown argument {other}\n{USAGE}"),
            }
        }
        Ok(options)
    }
}

/// Runs the whole battery in virtual time. Inputs and timer deadlines are
/// delivered in time order, inputs first on ties.
fn run_battery(
    driver: &mut BatteryDriver,
    recorder: &mut JsonSessionRecorder,
    participant: &mut SimulatedParticipant,
) -> u64 {
    let mut pending: Vec<InputEvent> = Vec::new();
    let mut now = 0;
    let mut events = driver.start(now, recorder);
    loop {
        for event in &events {
            log_event(event);
            pending.extend(participant.respond(event, now));
        }
        pending.sort_by_key(InputEvent::at_ms);
        let next_input = pending.first().map(InputEvent::at_ms);
        events = match (next_input, driver.next_deadline()) {
            (Some(t), Some(d)) if t <= d => {
                now = now.max(t);
                driver.handle_input(pending.remove(0), recorder)
            }
            (Some(t), None) => {
                now = now.max(t);
                driver.handle_input(pending.remove(0), recorder)
            }
            (_, Some(d)) => {
                now = now.max(d);
                driver.advance(d, recorder)
            }
            (None, None) => break,
        };
        if driver.is_finished() && events.is_empty() {
            break;
        }
    }
    now
}

fn log_event(event: &BatteryEvent) {
    match event {
        BatteryEvent::TaskStarted { task, position } => info!(task = %task, position, "task started"),
        BatteryEvent::TaskSkipped { task, error } => warn!(task = %task, %error, "task skipped"),
        BatteryEvent::TaskFinished { task, status } => {
            info!(task = %task, status = status.as_str(), "task finished")
        }
        BatteryEvent::Completed { at_ms } => info!(at_ms, "battery completed"),
        BatteryEvent::Aborted { at_ms } => warn!(at_ms, "battery aborted"),
        BatteryEvent::Runner { task, event } => debug!(task = %task, ?event),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let options = Options::parse(std::env::args().skip(1))?;
    let mut config = BatteryConfig::load(&options.battery)
        .with_context(|| format!("loading battery {}", options.battery.display()))?;
    if options.seed.is_some() {
        config.seed = options.seed;
    }
    let participant_rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
        None => StdRng::from_os_rng(),
    };

    let info = ParticipantInfo {
        name: options.name.clone(),
        consent: true,
        ..Default::default()
    };
    info.validate()?;

    let mut recorder = JsonSessionRecorder::new(&options.out, Some(info));
    let mut driver = BatteryDriver::new(config);
    let mut participant = SimulatedParticipant::new(ParticipantModel::default(), participant_rng);

    let ended_at = run_battery(&mut driver, &mut recorder, &mut participant);
    info!(
        virtual_ms = ended_at,
        skipped = driver.skipped().len(),
        "simulation finished"
    );

    recorder
        .save()
        .with_context(|| format!("writing session {}", options.out.display()))?;

    let mut table = SummaryTable::new();
    table.append(flatten_summary(recorder.session()));
    let csv = table.to_csv();
    match &options.summary {
        Some(path) => std::fs::write(path, &csv)
            .with_context(|| format!("writing summary {}", path.display()))?,
        None => print!("{csv}"),
    }
    Ok(())
}
