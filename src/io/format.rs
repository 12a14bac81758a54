//! Log formatting for vibspace drivers.
//!
//! Everything a driver reports goes to the `vibspace-output` log target, so that it can be routed
//! separately from the debug chatter of the state-space machinery.

use std::fmt;

/// Width of section rules in the output log.
const OUTPUT_WIDTH: usize = 72;

/// Logs an error both to the default target and to the `vibspace-output` logger.
macro_rules! vibspace_error {
    ($fmt:expr $(, $($arg:tt)*)?) => {
        log::error!($fmt, $($($arg)*)?);
        log::error!(target: "vibspace-output", $fmt, $($($arg)*)?);
    }
}

/// Logs a warning to the `vibspace-output` logger.
macro_rules! vibspace_warn {
    ($fmt:expr $(, $($arg:tt)*)?) => { log::warn!(target: "vibspace-output", $fmt, $($($arg)*)?); }
}

/// Logs an output line to the `vibspace-output` logger.
macro_rules! vibspace_output {
    ($fmt:expr $(, $($arg:tt)*)?) => { log::info!(target: "vibspace-output", $fmt, $($($arg)*)?); }
}

pub(crate) use {vibspace_error, vibspace_output, vibspace_warn};

/// Logs a driver title between two full-width rules.
pub(crate) fn log_title(title: &str) {
    let rule = "=".repeat(OUTPUT_WIDTH.max(title.chars().count() + 4));
    let width = rule.len();
    vibspace_output!("{rule}");
    vibspace_output!("{:^width$}", title.to_uppercase());
    vibspace_output!("{rule}");
}

/// Logs a section heading padded with a rule to the full output width.
pub(crate) fn log_subtitle(subtitle: &str) {
    let used = subtitle.chars().count() + 4;
    vibspace_output!("-- {subtitle} {}", "-".repeat(OUTPUT_WIDTH.saturating_sub(used)));
}

pub(crate) fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

/// Values whose [`fmt::Display`] output is logged line by line.
pub(crate) trait LogLines: fmt::Display {
    fn log_lines(&self) {
        self.to_string().lines().for_each(|line| {
            vibspace_output!("{line}");
        })
    }
}

impl<T: fmt::Display + ?Sized> LogLines for T {}
