//! Build timing utilities.

use std::time::{Duration, Instant};

/// A simple timer for measuring build phase durations.
pub struct Timer {
    name: String,
    start: Instant,
}

impl Timer {
    /// Start a new timer with the given phase name.
    pub fn start(name: &str) -> Self {
        Self {
            name: name.to_string(),
            start: Instant::now(),
        }
    }

    /// Log the elapsed time and return it.
    pub fn finish(self) -> Duration {
        let elapsed = self.start.elapsed();
        tracing::info!("[{}] {}", format_elapsed(elapsed), self.name);
        elapsed
    }
}

/// Seconds below one minute, minutes above.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs >= 60.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.1}s", secs)
    }
}
