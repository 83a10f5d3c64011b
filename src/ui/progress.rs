use crate::ui::icons::{CHECK, CROSS, RUNNING};
use crate::ui::output::OutputSink;
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

const TICK: Duration = Duration::from_millis(100);

/// Terminal UI for an agent session, rendered via `indicatif`.
///
/// A single spinner shows the running iteration and the latest agent
/// status. The UI is also the telemetry [`OutputSink`] while a session runs,
/// so progress lines print above the spinner instead of through it.
pub struct SessionUI {
    multi: MultiProgress,
    spinner: ProgressBar,
    verbose: bool,
    iteration: AtomicU32,
    total: AtomicU32,
}

impl SessionUI {
    pub fn new(iterations: u32, verbose: bool) -> Self {
        let multi = MultiProgress::new();
        let spinner_style = ProgressStyle::default_spinner()
            .template("{prefix:.dim} {spinner:.cyan} {msg}")
            .expect("progress bar template is a valid static string");

        let spinner = multi.add(ProgressBar::new_spinner());
        spinner.set_style(spinner_style);
        spinner.set_prefix(" relay");

        Self {
            multi,
            spinner,
            verbose,
            iteration: AtomicU32::new(0),
            total: AtomicU32::new(iterations),
        }
    }

    /// Print above the spinner, falling back to stderr when the bar is hidden
    /// or the terminal is gone.
    fn print_line(&self, line: impl AsRef<str>) {
        if self.multi.is_hidden() || self.multi.println(line.as_ref()).is_err() {
            eprintln!("{}", line.as_ref());
        }
    }

    fn set_iteration_message(&self, detail: impl std::fmt::Display) {
        self.spinner.set_message(format!(
            "agent {}/{} {}",
            style(self.iteration.load(Ordering::SeqCst)).cyan(),
            self.total.load(Ordering::SeqCst),
            detail
        ));
    }

    pub fn start_iteration(&self, number: u32, of: u32) {
        self.iteration.store(number, Ordering::SeqCst);
        self.total.store(of, Ordering::SeqCst);
        self.print_line(format!(
            "{}Iteration {}/{}",
            RUNNING,
            style(number).cyan().bold(),
            of
        ));
        self.set_iteration_message(style("(starting...)").dim());
        self.spinner.enable_steady_tick(TICK);
    }

    /// Short status shown on the spinner; echoed as a dim line when verbose.
    pub fn log_step(&self, step: &str) {
        self.set_iteration_message(style(format!("({})", step)).dim());
        if self.verbose {
            self.print_line(format!("    {} {}", style("·").dim(), style(step).dim()));
        }
    }

    /// Refresh the spinner with wall-clock time, `Xs` or `Xm Ys`.
    pub fn update_elapsed(&self, elapsed: Duration) {
        self.set_iteration_message(style(format!("({})", format_elapsed(elapsed))).dim());
    }

    pub fn iteration_done(&self, success: bool, elapsed: Duration, detail: &str) {
        let number = self.iteration.load(Ordering::SeqCst);
        let line = if success {
            format!(
                "{}Iteration {} complete in {} {}",
                CHECK,
                style(number).green(),
                format_elapsed(elapsed),
                style(detail).dim()
            )
        } else {
            format!(
                "{}Iteration {} failed after {}: {}",
                CROSS,
                style(number).red(),
                format_elapsed(elapsed),
                detail
            )
        };
        self.print_line(line);
        self.spinner.disable_steady_tick();
        self.spinner.set_message(String::new());
    }

    pub fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl OutputSink for SessionUI {
    fn write(&self, text: &str) {
        // Partial lines bypass the spinner.
        eprint!("{}", text);
    }

    fn write_line(&self, text: &str) {
        self.print_line(text);
    }
}

pub fn format_elapsed(elapsed: Duration) -> String {
    match elapsed.as_secs() {
        0 => format!("{}ms", elapsed.as_millis()),
        s if s < 60 => format!("{}s", s),
        s => format!("{}m {}s", s / 60, s % 60),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(250)), "250ms");
        assert_eq!(format_elapsed(Duration::from_secs(42)), "42s");
        assert_eq!(format_elapsed(Duration::from_secs(125)), "2m 5s");
    }

    #[test]
    fn test_ui_lifecycle_does_not_panic_without_terminal() {
        let ui = SessionUI::new(3, true);
        ui.start_iteration(1, 3);
        ui.log_step("spawning agent");
        ui.update_elapsed(Duration::from_secs(3));
        ui.write_line("[tool_start] Reading: src/main.rs");
        ui.iteration_done(true, Duration::from_secs(4), "All done");
        ui.finish();
    }
}
