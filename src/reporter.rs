//! Error reporting for live sessions.
//!
//! Mid-stream failures (a dropped audio frame, a provider error message) must
//! not interrupt a recording in progress, so they are reported through this
//! seam instead of being returned to the caller.

/// Trait for reporting non-fatal session errors.
pub trait ErrorReporter: Send + Sync {
    /// Reports an error from the named scope (e.g. "send", "deepgram").
    fn report(&self, scope: &str, detail: &str);
}

/// Simple error reporter that logs to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, scope: &str, detail: &str) {
        eprintln!("sotto: [{}] {}", scope, detail);
    }
}

/// Reporter that collects reports in memory, for tests.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    reports: std::sync::Mutex<Vec<(String, String)>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all reports received so far as `(scope, detail)` pairs.
    pub fn reports(&self) -> Vec<(String, String)> {
        self.reports.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, scope: &str, detail: &str) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push((scope.to_string(), detail.to_string()));
        }
    }
}
