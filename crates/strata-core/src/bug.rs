//! Loud, non-fatal reporting of invariant violations.
//!
//! A violated invariant in one snapshot must not take down a long-running
//! service, so reports are logged at `error` level and kept in a bounded
//! in-process buffer for bug reports instead of panicking.

use std::collections::VecDeque;
use std::panic::Location;
use std::sync::OnceLock;

use parking_lot::Mutex;

const MAX_REPORTS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BugReport {
    pub message: String,
    pub file: &'static str,
    pub line: u32,
}

fn buffer() -> &'static Mutex<VecDeque<BugReport>> {
    static REPORTS: OnceLock<Mutex<VecDeque<BugReport>>> = OnceLock::new();
    REPORTS.get_or_init(|| Mutex::new(VecDeque::with_capacity(MAX_REPORTS)))
}

/// Records an invariant violation.
#[track_caller]
pub fn report(message: impl Into<String>) {
    let loc = Location::caller();
    let message = message.into();
    tracing::error!(
        target = "strata.bug",
        file = loc.file(),
        line = loc.line(),
        "invariant violated: {message}"
    );

    let mut reports = buffer().lock();
    if reports.len() == MAX_REPORTS {
        reports.pop_front();
    }
    reports.push_back(BugReport {
        message,
        file: loc.file(),
        line: loc.line(),
    });
}

/// Reports `message` when `cond` is false. Returns `cond`.
#[track_caller]
pub fn check(cond: bool, message: impl FnOnce() -> String) -> bool {
    if !cond {
        report(message());
    }
    cond
}

/// Returns the reports recorded so far (oldest first).
pub fn reports() -> Vec<BugReport> {
    buffer().lock().iter().cloned().collect()
}

/// Formats and records an invariant violation.
#[macro_export]
macro_rules! bug {
    ($($arg:tt)*) => {
        $crate::bug::report(format!($($arg)*))
    };
}
