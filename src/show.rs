//! The `show` command: inspect the net without executing it.

use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
};

use anyhow::Result;
use clap::Parser;
use petgraph::dot;
use prettytable::*;

use crate::petrinet::{NetConfig, graph};

/// Command-line arguments for the show command.
#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Report file (default: stdout)
    #[clap(long, short)]
    pub report: Option<PathBuf>,

    /// DOT file displaying the place/transition graph
    #[clap(long)]
    pub dot: Option<PathBuf>,
}

pub fn show_main(args: ShowArgs) -> Result<()> {
    let ShowArgs { report, dot } = args;
    let config = NetConfig::agency();

    let mut writer: Box<dyn Write> = match report {
        Some(path) => Box::new(fs::File::create(path)?),
        None => Box::new(io::stdout()),
    };
    write_structure(&mut writer, &config)?;

    if let Some(filename) = dot {
        fs::write(
            filename,
            format!("{:?}", dot::Dot::new(&graph::topology_graph(&config))),
        )?;
    }

    Ok(())
}

fn write_structure<W: Write>(writer: &mut W, config: &NetConfig) -> Result<()> {
    writeln!(
        writer,
        "{} places, {} transitions, terminal T{} (target {} firings)",
        config.places.len(),
        config.transitions.len(),
        config.terminal,
        config.completion_target
    )?;

    let mut table = Table::new();
    table.set_titles(row!["Place", "Initial tokens"]);
    table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    for place in &config.places {
        table.add_row(row![place.name(), place.initial_tokens()]);
    }
    table.print(writer)?;

    // Which worker drives each transition.
    let mut owner = vec![None; config.transitions.len()];
    for (worker, sequence) in config.sequences.iter().enumerate() {
        for &t in sequence {
            owner[t] = Some(worker);
        }
    }

    writeln!(writer, "\nTransitions:")?;
    let mut table = Table::new();
    table.set_titles(row!["Transition", "Dwell (ms)", "Worker"]);
    table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    for transition in &config.transitions {
        table.add_row(row![
            transition.name(),
            transition.dwell().as_millis(),
            owner[transition.index()]
                .map_or_else(|| "-".to_string(), |worker| worker.to_string()),
        ]);
    }
    table.print(writer)?;

    writeln!(writer, "\nPlace invariants:")?;
    for invariant in &config.invariants {
        writeln!(writer, "  {}", invariant.describe())?;
    }

    if !config.pairs.is_empty() {
        writeln!(writer, "\nTracked pairs:")?;
        for pair in &config.pairs {
            writeln!(
                writer,
                "  T{}:T{} at {:.0}% priority share",
                pair.a,
                pair.b,
                pair.priority_share * 100.0
            )?;
        }
    }

    Ok(())
}
