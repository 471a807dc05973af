use console::style;
use std::fmt::Display;
use std::time::Duration;

/// Console progress for an update run, one line per revision
pub struct RevisionReporter {
    total: usize,
    current: usize,
    enabled: bool,
    verbose: bool,
}

impl RevisionReporter {
    pub fn new(enabled: bool, verbose: bool) -> Self {
        Self {
            total: 0,
            current: 0,
            enabled,
            verbose,
        }
    }

    /// Reporter that prints nothing
    pub fn silent() -> Self {
        Self::new(false, false)
    }

    pub fn start_run(&mut self, watermark: u32, target: u32, pending: usize) {
        self.total = pending;
        self.current = 0;

        if self.enabled && pending > 0 {
            println!(
                "Updating database from revision {} to {} ({} update{})",
                style(watermark).cyan(),
                style(target).cyan(),
                pending,
                if pending == 1 { "" } else { "s" }
            );
        }
    }

    pub fn up_to_date(&self, revision: u32) {
        if self.enabled {
            println!(
                "{} Database is up to date (revision {})",
                style("✓").green(),
                revision
            );
        }
    }

    pub fn start_revision(&mut self, revision: u32, description: &str) {
        self.current += 1;

        if self.enabled && self.verbose {
            println!(
                "  [{}/{}] r{}: {}",
                self.current, self.total, revision, description
            );
        }
    }

    pub fn complete_revision(&self, revision: u32, duration: Duration, statements: usize) {
        if !self.enabled {
            return;
        }

        let statements_str = match statements {
            0 => "nothing to do".to_string(),
            1 => "1 statement".to_string(),
            n => format!("{} statements", n),
        };

        println!(
            "  [{}/{}] r{} ({}, {})",
            self.current,
            self.total,
            revision,
            statements_str,
            style(format_duration(duration)).dim()
        );
    }

    pub fn fail_revision(&self, revision: u32, error: &dyn Display) {
        if self.enabled {
            println!(
                "{} r{} failed: {}",
                style("✗").red(),
                revision,
                style(error.to_string()).red()
            );
        }
    }

    pub fn run_summary(&self, total_duration: Duration, applied: usize, revision: u32) {
        if self.enabled {
            println!(
                "{} Applied {} update{} in {} (database now at revision {})",
                style("✓").green(),
                applied,
                if applied == 1 { "" } else { "s" },
                style(format_duration(total_duration)).green(),
                revision
            );
        }
    }
}

pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let millis = d.subsec_millis();

    if total_secs == 0 {
        format!("{}ms", millis)
    } else if total_secs < 60 {
        if millis > 0 {
            format!("{}.{}s", total_secs, millis / 100)
        } else {
            format!("{}s", total_secs)
        }
    } else if total_secs < 3600 {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        if secs > 0 {
            format!("{}m{}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    } else {
        let hours = total_secs / 3600;
        let mins = (total_secs % 3600) / 60;
        if mins > 0 {
            format!("{}h{}m", hours, mins)
        } else {
            format!("{}h", hours)
        }
    }
}
