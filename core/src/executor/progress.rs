use std::collections::HashMap;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Terminal progress for a scheduler run: one overall bar counting finished
/// tasks plus a spinner per in-flight task. Inert when disabled.
pub struct ProgressMonitor {
    bars: Option<Bars>,
}

struct Bars {
    multi: MultiProgress,
    overall: ProgressBar,
    tasks: HashMap<String, ProgressBar>,
}

impl ProgressMonitor {
    /// `enabled` is false for machine-readable output and non-tty runs.
    pub fn new(total_tasks: usize, enabled: bool) -> Self {
        if !enabled {
            return Self { bars: None };
        }

        let multi = MultiProgress::new();
        let overall = multi.add(ProgressBar::new(total_tasks as u64));
        overall.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} tasks {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓▒░  "),
        );
        overall.set_message("waiting for first wave");

        Self {
            bars: Some(Bars {
                multi,
                overall,
                tasks: HashMap::new(),
            }),
        }
    }

    pub fn add_task(&mut self, task_id: &str) {
        let Some(bars) = self.bars.as_mut() else {
            return;
        };

        let spinner = bars.multi.add(ProgressBar::new_spinner());
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(SPINNER_FRAMES),
        );
        spinner.set_message(format!("running {task_id}"));
        spinner.enable_steady_tick(Duration::from_millis(100));
        bars.tasks.insert(task_id.to_string(), spinner);
    }

    pub fn retry_task(&self, task_id: &str, attempt: u32) {
        if let Some(spinner) = self.bars.as_ref().and_then(|b| b.tasks.get(task_id)) {
            spinner.set_message(format!("retrying {task_id} (retry {attempt})"));
        }
    }

    pub fn complete_task(&mut self, task_id: &str, success: bool, duration_ms: u64) {
        let Some(bars) = self.bars.as_mut() else {
            return;
        };
        if let Some(spinner) = bars.tasks.remove(task_id) {
            let icon = if success { "✅" } else { "❌" };
            spinner.finish_with_message(format!("{icon} {task_id} ({duration_ms}ms)"));
        }
        bars.overall.inc(1);
    }

    /// Counts a task failed at drain time; it never had a spinner.
    pub fn skip_task(&self) {
        if let Some(bars) = &self.bars {
            bars.overall.inc(1);
        }
    }

    pub fn update_wave(&self, wave_id: usize, wave_size: usize) {
        if let Some(bars) = &self.bars {
            bars.overall
                .set_message(format!("wave {} ({} tasks)", wave_id + 1, wave_size));
        }
    }

    pub fn finish(&self, success: bool) {
        if let Some(bars) = &self.bars {
            let msg = if success {
                "✅ all tasks completed"
            } else {
                "❌ some tasks failed"
            };
            bars.overall.finish_with_message(msg);
        }
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.bars.as_ref().map_or(0, |b| b.tasks.len())
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        if let Some(bars) = self.bars.as_mut() {
            for (_, spinner) in bars.tasks.drain() {
                spinner.finish_and_clear();
            }
        }
    }
}
