// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! Terminal color utilities
//!
//! Status marks shared by every command so output stays consistent.

use colored::{ColoredString, Colorize};

/// Mark for a passed check or succeeded stage
pub fn ok_mark() -> ColoredString {
    "✓".green()
}

/// Mark for a failed check or stage
pub fn fail_mark() -> ColoredString {
    "✗".red()
}

/// Mark for a warning
pub fn warn_mark() -> ColoredString {
    "⚠".yellow()
}

/// Mark for a stage that did not run
pub fn skip_mark() -> ColoredString {
    "-".dimmed()
}

/// Check if colors should be disabled
pub fn should_use_colors() -> bool {
    // Respect NO_COLOR environment variable
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    std::env::var("TERM").map(|t| t != "dumb").unwrap_or(false)
}

/// Apply the color decision globally
pub fn init_colors() {
    colored::control::set_override(should_use_colors());
}
