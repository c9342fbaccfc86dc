//! FailureReporter - process-wide fallback for failed write requests
//!
//! Failed requests are fire-and-forget from the caller's point of view, so
//! the only place their errors can surface is here. The reporter itself must
//! never fail: fallback write errors are swallowed.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

use chrono::Utc;
use tracing::error;

static REPORTER: OnceLock<FailureReporter> = OnceLock::new();

/// Records errors raised by individual write requests
pub struct FailureReporter {
    fallback: Mutex<Box<dyn Write + Send>>,
    reports: AtomicU64,
}

impl FailureReporter {
    /// Reporter writing to the given fallback writer
    pub fn new(fallback: Box<dyn Write + Send>) -> Self {
        Self {
            fallback: Mutex::new(fallback),
            reports: AtomicU64::new(0),
        }
    }

    /// The process-wide reporter, lazily initialized with a stderr fallback
    pub fn global() -> &'static FailureReporter {
        REPORTER.get_or_init(|| FailureReporter::new(Box::new(std::io::stderr())))
    }

    /// Install a custom fallback writer as the process-wide reporter
    ///
    /// Succeeds at most once, and only before the first [`global`] use;
    /// returns `false` if a reporter was already in place.
    ///
    /// [`global`]: FailureReporter::global
    pub fn install(fallback: Box<dyn Write + Send>) -> bool {
        REPORTER.set(FailureReporter::new(fallback)).is_ok()
    }

    /// Record one failed write request
    ///
    /// Emits a structured tracing event and appends one line
    /// `<rfc3339> <sink> <error>` to the fallback writer.
    pub fn report(&self, sink_name: &str, error: &dyn std::fmt::Display) {
        self.reports.fetch_add(1, Ordering::Relaxed);
        error!(sink = %sink_name, error = %error, "Write request failed");
        if let Ok(mut out) = self.fallback.lock() {
            // the reporter never fails; a broken fallback just loses the line
            let _ = writeln!(out, "{} {} {}", Utc::now().to_rfc3339(), sink_name, error);
            let _ = out.flush();
        }
    }

    /// Total failures recorded by this reporter
    pub fn reports(&self) -> u64 {
        self.reports.load(Ordering::Relaxed)
    }
}
