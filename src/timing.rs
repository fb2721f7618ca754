//! Phase timing.

use std::time::Instant;

/// Measures one build phase and logs its duration when finished.
pub struct Timer {
    name: String,
    start: Instant,
}

impl Timer {
    pub fn start(name: &str) -> Self {
        Self {
            name: name.to_string(),
            start: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Log the elapsed time at info level.
    pub fn finish(self) {
        tracing::info!(phase = %self.name, elapsed = %format_elapsed(self.elapsed_secs()), "done");
    }
}

fn format_elapsed(secs: f64) -> String {
    if secs >= 60.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.1}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(2.31), "2.3s");
        assert_eq!(format_elapsed(90.0), "1.5m");
    }
}
