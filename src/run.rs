//! The `run` command: execute the net to its completion target.
//!
//! One worker thread is spawned per configured transition sequence; each
//! cycles its sequence through [`Monitor::fire_transition`] until the
//! monitor reports completion. A fatal error (bad index, broken invariant)
//! halts the owning worker only; the run is already suspect, but sibling
//! workers are left to observe completion on their own.
//!
//! After the join the firing timeline collected by the [`RunLog`] is turned
//! into a summary report and, on request, a VCD waveform with one wire per
//! transition toggling at each firing.

use std::{
    cmp, fs,
    io::{self, BufWriter, Write},
    path::PathBuf,
    thread,
    time::{Duration, Instant},
};

use anyhow::Result;
use clap::Parser;
use itertools::Itertools;
use ordered_float::OrderedFloat;
use prettytable::*;

use crate::logger::{FiringEvent, RunLog};
use crate::monitor::Monitor;
use crate::petrinet::{NetConfig, PetriNet, TransitionPair};
use crate::policy::{self, PolicyKind};

/// Command-line arguments for the run command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Scheduling policy arbitrating between enabled transitions
    #[clap(long, short, value_enum, default_value = "balanced")]
    pub policy: PolicyKind,

    /// Completion target: firings of the terminal transition
    #[clap(long, short)]
    pub target: Option<u64>,

    /// Tracked transition pair, A:B or A:B@SHARE (repeatable)
    #[clap(long = "pair", value_parser = policy::parse_pair_spec)]
    pub pairs: Vec<TransitionPair>,

    /// Seed for the policy RNG (omit for OS entropy)
    #[clap(long)]
    pub seed: Option<u64>,

    /// Run log file (default: stdout)
    #[clap(long)]
    pub log: Option<PathBuf>,

    /// Flat transition trace file
    #[clap(long)]
    pub trace: Option<PathBuf>,

    /// Report file for the run summary (default: stdout)
    #[clap(long, short)]
    pub report: Option<PathBuf>,

    /// VCD waveform of the firing timeline
    #[clap(long)]
    pub vcd: Option<PathBuf>,
}

pub fn run_main(args: RunArgs) -> Result<()> {
    let RunArgs {
        policy,
        target,
        pairs,
        seed,
        log,
        trace,
        report,
        vcd,
    } = args;

    let mut config = NetConfig::agency();
    if let Some(target) = target {
        config = config.with_completion_target(target);
    }
    if !pairs.is_empty() {
        config = config.with_pairs(pairs);
    }

    let net = PetriNet::new(&config)?;
    let scheduler = policy::make_policy(policy, &config.pairs, seed);
    let monitor = Monitor::new(net, scheduler)?;
    let run_log = RunLog::to_files(log.as_deref(), trace.as_deref())?;

    run_log.info(format!(
        "starting {} workers under the {:?} policy, completion target {}",
        config.sequences.len(),
        policy,
        config.completion_target
    ));

    let started = Instant::now();
    thread::scope(|scope| {
        for (worker, sequence) in config.sequences.iter().enumerate() {
            let monitor = &monitor;
            let run_log = &run_log;
            scope.spawn(move || drive_sequence(worker, sequence, monitor, run_log));
        }
    });
    let wall = started.elapsed();

    run_log.info(format!(
        "run complete: {} terminal firings in {:.3}s",
        monitor.completions(),
        wall.as_secs_f64()
    ));

    let mut writer: Box<dyn Write> = match report {
        Some(path) => Box::new(fs::File::create(path)?),
        None => Box::new(io::stdout()),
    };
    write_report(&mut writer, &config, &run_log, policy, wall)?;

    if let Some(filename) = vcd {
        let mut file = BufWriter::new(fs::File::create(filename)?);
        write_vcd(&run_log.events(), config.transitions.len(), &mut file)?;
    }

    Ok(())
}

/// Worker loop: cycle the assigned sequence until the net completes.
fn drive_sequence(worker: usize, sequence: &[usize], monitor: &Monitor, log: &RunLog) {
    while !monitor.has_finished() {
        for &transition in sequence {
            if let Err(err) = monitor.fire_transition(transition, log) {
                log.error(format!("worker {} halted: {}", worker, err));
                return;
            }
            if monitor.has_finished() {
                log.info(format!("worker {} finished", worker));
                return;
            }
        }
    }
}

/// Summary tables: per-transition firings, then per-pair achieved shares.
fn write_report<W: Write>(
    writer: &mut W,
    config: &NetConfig,
    log: &RunLog,
    policy: PolicyKind,
    wall: Duration,
) -> Result<()> {
    let counts = log.fire_counts(config.transitions.len());
    let total: u64 = counts.iter().sum();

    writeln!(
        writer,
        "Policy {:?}: {} firings ({} of terminal T{}) in {:.3}s",
        policy,
        total,
        counts[config.terminal],
        config.terminal,
        wall.as_secs_f64()
    )?;

    let mut table = Table::new();
    table.set_titles(row!["Transition", "Dwell (ms)", "Firings"]);
    table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    for transition in &config.transitions {
        table.add_row(row![
            transition.name(),
            transition.dwell().as_millis(),
            counts[transition.index()],
        ]);
    }
    table.print(writer)?;

    if !config.pairs.is_empty() {
        let mut rows: Vec<(TransitionPair, u64, u64, f64)> = config
            .pairs
            .iter()
            .map(|pair| {
                let a = counts[pair.a];
                let b = counts[pair.b];
                let share = if a + b == 0 {
                    0.0
                } else {
                    a as f64 / (a + b) as f64
                };
                (*pair, a, b, share)
            })
            .collect();
        rows.sort_unstable_by_key(|&(_, _, _, share)| cmp::Reverse(OrderedFloat(share)));

        writeln!(writer, "\nTracked pairs:")?;
        let mut table = Table::new();
        table.set_titles(row!["Pair", "Target share", "Fired A", "Fired B", "Achieved"]);
        table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
        for (pair, a, b, share) in rows {
            table.add_row(row![
                format!("T{}:T{}", pair.a, pair.b),
                format!("{:.2}", pair.priority_share),
                a,
                b,
                format!("{:.3}", share),
            ]);
        }
        table.print(writer)?;
    }

    Ok(())
}

/// Firing timeline as a Value Change Dump: one wire per transition, toggled
/// at each firing, microsecond timescale.
fn write_vcd(
    events: &[FiringEvent],
    transitions: usize,
    w: &mut dyn io::Write,
) -> Result<()> {
    let mut writer = vcd::Writer::new(w);

    writer.timescale(1, vcd::TimescaleUnit::US)?;
    writer.add_module("net")?;
    let wires: Vec<vcd::IdCode> = (0..transitions)
        .map(|t| writer.add_wire(1, &format!("T{}", t)))
        .collect::<io::Result<_>>()?;
    writer.upscope()?;
    writer.enddefinitions()?;

    for wire in &wires {
        writer.change_scalar(*wire, vcd::Value::V0)?;
    }

    let mut high = vec![false; transitions];
    for (time, group) in &events.iter().group_by(|event| event.offset.as_micros()) {
        writer.timestamp(time as u64)?;
        for event in group {
            high[event.transition] = !high[event.transition];
            let value = if high[event.transition] {
                vcd::Value::V1
            } else {
                vcd::Value::V0
            };
            writer.change_scalar(wires[event.transition], value)?;
        }
    }

    Ok(())
}
