//! Progress reporting for long-running steps.
//!
//! A [`Phase`] is one step of a run (loading sheets, writing the store). In an
//! interactive run it draws an indicatif bar or spinner on stderr. In log-only
//! mode nothing is drawn and the phase reports through `tracing` instead.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

/// Global flag for log-only mode (set from args in main)
pub static LOG_ONLY: AtomicBool = AtomicBool::new(false);

const BAR_TEMPLATE: &str = "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}";
const SPINNER_TEMPLATE: &str = "{msg} {spinner} [{elapsed_precise}]";

pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// "850ms", "4.2s" or "3m 05s".
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else if d.as_millis() >= 1000 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{}ms", d.as_millis())
    }
}

/// One reported step. Safe to advance from rayon workers.
pub struct Phase {
    label: String,
    bar: ProgressBar,
    total: Option<u64>,
    started: Instant,
}

impl Phase {
    /// A phase over a known number of items.
    pub fn counted(label: &str, total: u64) -> Self {
        let bar = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar().template(BAR_TEMPLATE) {
            bar.set_style(style.progress_chars("=> "));
        }
        Self::start(label, bar, Some(total))
    }

    /// A phase of unknown length, drawn as a spinner.
    pub fn open(label: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template(SPINNER_TEMPLATE) {
            bar.set_style(style);
        }
        Self::start(label, bar, None)
    }

    fn start(label: &str, bar: ProgressBar, total: Option<u64>) -> Self {
        if is_log_only() {
            bar.set_draw_target(ProgressDrawTarget::hidden());
            info!(phase = label, "started");
        } else if total.is_none() {
            bar.enable_steady_tick(Duration::from_millis(100));
        }
        bar.set_message(label.to_string());
        Self {
            label: label.to_string(),
            bar,
            total,
            started: Instant::now(),
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.bar.is_hidden()
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Count one finished item. In log-only mode every `every`th item and the
    /// last one are logged.
    pub fn advance(&self, every: u64) {
        self.bar.inc(1);
        let Some(total) = self.total.filter(|_| is_log_only()) else {
            return;
        };
        let current = self.bar.position();
        if total > 0 && (current % every.max(1) == 0 || current == total) {
            let pct = 100.0 * current as f64 / total as f64;
            info!(phase = %self.label, "{}/{} ({:.1}%)", current, total, pct);
        }
    }

    /// End the phase with a one-line summary. Returns how long it ran.
    pub fn finish(self, summary: &str) -> Duration {
        let elapsed = self.started.elapsed();
        self.bar
            .finish_with_message(format!("{}: {}", self.label, summary));
        if is_log_only() {
            info!(phase = %self.label, elapsed = %format_duration(elapsed), "{}", summary);
        }
        elapsed
    }

    /// End the phase and erase its line.
    pub fn clear(self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(850)), "850ms");
        assert_eq!(format_duration(Duration::from_millis(4200)), "4.2s");
        assert_eq!(format_duration(Duration::from_secs(185)), "3m 05s");
    }

    #[test]
    fn test_counted_phase_in_log_only_mode() {
        set_log_only(true);
        let phase = Phase::counted("Loading sheets", 3);
        assert!(phase.is_hidden());
        for _ in 0..3 {
            phase.advance(2);
        }
        assert_eq!(phase.position(), 3);
        phase.finish("3 rounds");

        let empty = Phase::counted("Nothing", 0);
        empty.advance(1);
        empty.clear();
        set_log_only(false);
    }
}
