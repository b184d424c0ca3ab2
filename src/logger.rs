//! Run log: the fire-and-forget side channel of a net execution.
//!
//! A [`RunLog`] is constructed once by the entry point and handed by
//! reference to the monitor and the workers. Nothing in the core consults a
//! return value from it, and write failures are swallowed, so the engine
//! behaves identically whether the log points at files, stdout or nothing at
//! all ([`RunLog::disabled`]).
//!
//! Besides the line sink and the flat transition trace, the log keeps an
//! in-memory timeline of firing events; the post-run report and the VCD
//! export are built from it.

use std::{
    fs,
    io::{self, Write},
    path::Path,
    sync::Mutex,
    time::{Duration, Instant},
};

/// One successful firing, with its offset from the start of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiringEvent {
    pub offset: Duration,
    pub transition: usize,
}

pub struct RunLog {
    epoch: Instant,
    sink: Option<Mutex<Box<dyn Write + Send>>>,
    trace: Option<Mutex<Box<dyn Write + Send>>>,
    events: Mutex<Vec<FiringEvent>>,
}

impl RunLog {
    pub fn new(
        sink: Option<Box<dyn Write + Send>>,
        trace: Option<Box<dyn Write + Send>>,
    ) -> Self {
        Self {
            epoch: Instant::now(),
            sink: sink.map(Mutex::new),
            trace: trace.map(Mutex::new),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Log lines to `log` (stdout when `None`), the flat trace to `trace`
    /// (dropped when `None`).
    pub fn to_files(log: Option<&Path>, trace: Option<&Path>) -> io::Result<Self> {
        let sink: Box<dyn Write + Send> = match log {
            Some(path) => Box::new(fs::File::create(path)?),
            None => Box::new(io::stdout()),
        };
        let trace: Option<Box<dyn Write + Send>> = match trace {
            Some(path) => Some(Box::new(fs::File::create(path)?)),
            None => None,
        };
        Ok(Self::new(Some(sink), trace))
    }

    /// The no-op stub: nothing is written, only the timeline is kept.
    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.write_line("INFO", message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.write_line("ERROR", message.as_ref());
    }

    /// Record a successful firing with its marking snapshot.
    pub fn fired(&self, transition: usize, marking: &str) {
        let offset = self.epoch.elapsed();
        if let Ok(mut events) = self.events.lock() {
            events.push(FiringEvent { offset, transition });
        }
        self.write_line(
            "INFO",
            &format!("Transition fired: {{T{}}} Marking: {{{}}}", transition, marking),
        );
        if let Some(trace) = &self.trace {
            if let Ok(mut writer) = trace.lock() {
                let _ = write!(writer, "T{} ", transition);
                let _ = writer.flush();
            }
        }
    }

    /// Snapshot of the firing timeline so far, in firing order.
    pub fn events(&self) -> Vec<FiringEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Per-transition firing totals over the timeline.
    pub fn fire_counts(&self, transitions: usize) -> Vec<u64> {
        let mut counts = vec![0u64; transitions];
        for event in self.events() {
            if event.transition < transitions {
                counts[event.transition] += 1;
            }
        }
        counts
    }

    fn write_line(&self, level: &str, message: &str) {
        if let Some(sink) = &self.sink {
            if let Ok(mut writer) = sink.lock() {
                let _ = writeln!(
                    writer,
                    "[{:>10.3}s] {}: {}",
                    self.epoch.elapsed().as_secs_f64(),
                    level,
                    message
                );
            }
        }
    }
}
