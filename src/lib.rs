//! Concurrent timed Petri net execution engine.
//!
//! This library executes a timed Petri net with true multi-threaded
//! parallelism: one worker thread per configured transition sequence, all
//! funnelling their firing attempts through a central [`Monitor`] that
//! serializes access to the shared net state while a pluggable scheduling
//! [`Policy`] decides, among several simultaneously enabled transitions,
//! which one effectively proceeds.
//!
//! # Overview
//!
//! - **[`petrinet`]**: the net state machine (marking, incidence matrices,
//!   place invariants, enabled-set computation and the dwell clocks of timed
//!   transitions) plus the static [`NetConfig`] it is built from.
//! - **[`policy`]**: the scheduling strategies (first-come-first-served,
//!   balanced, prioritized) and their shared pair-tracking state.
//! - **[`monitor`]**: the coordination engine: one mutex, one parking queue
//!   per transition index, bounded aging so no deferred transition starves.
//! - **[`logger`]**: the fire-and-forget run log and firing timeline.
//! - **[`run`]** / **[`show`]**: the two CLI commands, executing a net to its
//!   completion target or inspecting its structure.
//!
//! # Usage Example
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use tpn::{Monitor, NetConfig, PetriNet, RunLog, policy};
//!
//! let config = NetConfig::agency().with_completion_target(10);
//! let net = PetriNet::new(&config)?;
//! let scheduler = policy::make_policy(policy::PolicyKind::Balanced, &config.pairs, None);
//! let monitor = Monitor::new(net, scheduler)?;
//! let log = RunLog::disabled();
//!
//! while !monitor.has_finished() {
//!     monitor.fire_transition(0, &log)?;
//! #   break;
//! }
//! # Ok(())
//! # }
//! ```

use clap::Parser;

pub mod logger;
pub mod monitor;
pub mod petrinet;
pub mod policy;
pub mod run;
pub mod show;

// Re-export the main types for easy access
pub use logger::{FiringEvent, RunLog};
pub use monitor::Monitor;
pub use petrinet::{NetConfig, NetError, PetriNet, Symbol};
pub use policy::{Policy, PolicyKind};
pub use run::{RunArgs, run_main};
pub use show::{ShowArgs, show_main};

/// Command-line interface arguments for the TPN tools.
#[derive(Debug, Parser)]
#[clap(
    name = "TPN Tools",
    about = "Concurrent timed Petri net execution tools"
)]
pub enum CLIArguments {
    /// Execute the net until its completion target is reached.
    Run(RunArgs),
    /// Print the net structure, invariants and scheduling pairs.
    Show(ShowArgs),
}
