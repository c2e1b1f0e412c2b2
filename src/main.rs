use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ride_tracker_rs::export::{RideExport, SettlementExport};
use ride_tracker_rs::replay::{load_event_log, Replayer};
use ride_tracker_rs::{Command, Ledger, RecordingState, SettlementSolver, TrackerConfig};

#[derive(Parser, Debug)]
#[command(name = "ride_tracker")]
#[command(about = "Replay ride event logs and settle shared trip expenses", long_about = None)]
struct Args {
    /// JSON configuration file (defaults apply to missing fields)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Run an event log (*.json or *.json.gz) through the recording engine
    Replay {
        #[arg(long)]
        log: PathBuf,

        /// Override the log's start odometer reading
        #[arg(long)]
        start_odometer: Option<f64>,

        /// End odometer reading to reconcile against GPS distance
        #[arg(long)]
        end_odometer: Option<f64>,

        /// Accept every auto-start prompt
        #[arg(long, default_value_t = false)]
        auto_confirm: bool,

        /// Let timers still pending after the last entry fire
        #[arg(long, default_value_t = false)]
        drain: bool,

        /// Disable automatic detection
        #[arg(long, default_value_t = false)]
        manual: bool,

        /// Write the final snapshot here
        #[arg(long)]
        snapshot_out: Option<PathBuf>,

        /// Write the finalized ride export here
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Compute settlement transfers for an expense ledger
    Settle {
        #[arg(long)]
        ledger: PathBuf,

        /// Write the plan export here
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => TrackerConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TrackerConfig::default(),
    };

    match args.command {
        Mode::Replay {
            log,
            start_odometer,
            end_odometer,
            auto_confirm,
            drain,
            manual,
            snapshot_out,
            export,
        } => {
            let mut event_log = load_event_log(&log).with_context(|| format!("loading {}", log.display()))?;
            if let Some(start) = start_odometer {
                event_log.start_odometer = start;
            }
            let mut recording = config.recording;
            if manual {
                recording.automatic = false;
            }

            let mut replayer = Replayer::for_log(recording, &event_log)?.auto_confirm(auto_confirm);
            replayer.run(&event_log)?;
            if drain {
                replayer.drain_timers()?;
            }

            if let Some(end) = end_odometer {
                if replayer.state().is_active() {
                    replayer.command(Command::End)?;
                }
                if replayer.state() != RecordingState::Ended {
                    bail!("no ride was recorded, cannot reconcile the odometer");
                }
                replayer.command(Command::SubmitEndOdometer { value: end })?;
            }

            let snapshot = replayer.engine().snapshot();
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            println!("{}", serde_json::to_string_pretty(replayer.report())?);
            if let Some(path) = snapshot_out {
                snapshot.save(&path.to_string_lossy())?;
            }

            let (engine, _) = replayer.into_parts();
            let ride = match engine.into_ride() {
                Some(ride) => ride,
                None => {
                    log::info!("no ride recorded");
                    return Ok(());
                }
            };
            if let Some(path) = export {
                RideExport::new(ride).write_to(&path)?;
                log::info!("ride exported to {}", path.display());
            }
        }
        Mode::Settle { ledger, out } => {
            let ledger = Ledger::from_json_file(&ledger).with_context(|| format!("loading {}", ledger.display()))?;
            let solver = SettlementSolver::new(config.settlement);
            let plan = solver.plan(&ledger.expenses, &ledger.members)?;

            for s in &plan.settlements {
                println!("{} -> {}: {}", s.from, s.to, s.amount);
            }
            if let Some(path) = out {
                SettlementExport::new(plan).write_to(&path)?;
                log::info!("settlement plan written to {}", path.display());
            }
        }
    }

    Ok(())
}
