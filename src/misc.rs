// This file contains miscellaneous functions used by various parts of Otuclust.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)
// https://github.com/rrwick/Autocycler

// This file is part of Otuclust. Otuclust is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. Otuclust is
// distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with Otuclust. If not, see <http://www.gnu.org/licenses/>.

use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;


pub fn check_if_file_exists(filename: &Path) {
    // Quits with an error if the given path is not an existing file.
    if !filename.exists() {
        quit_with_error(&format!("file does not exist: {}", filename.display()));
    }
    if !filename.is_file() {
        quit_with_error(&format!("{} is not a file", filename.display()));
    }
}


pub fn check_if_parent_dir_exists(filename: &Path) {
    // Quits with an error if an output file would land in a directory that doesn't exist.
    if let Some(parent) = filename.parent() {
        if !parent.as_os_str().is_empty() && !parent.is_dir() {
            quit_with_error(&format!("directory does not exist: {}", parent.display()));
        }
    }
}


#[cfg(not(test))]
pub fn quit_with_error(text: &str) -> ! {
    // For friendly error messages, this function normally just prints the error and quits.
    eprintln!();
    eprintln!("Error: {}", text);
    std::process::exit(1);
}
#[cfg(test)]
pub fn quit_with_error(text: &str) -> ! {
    // But when running unit tests, this function instead panics so I can catch it for the test.
    panic!("{}", text);
}


pub fn format_duration(duration: std::time::Duration) -> String {
    let microseconds = duration.as_micros() % 1000000;
    let seconds =      duration.as_micros() / 1000000 % 60;
    let minutes =      duration.as_micros() / 1000000 / 60 % 60;
    let hours =        duration.as_micros() / 1000000 / 60 / 60;
    format!("{}:{:02}:{:02}.{:06}", hours, minutes, seconds, microseconds)
}


pub fn format_float(num: f64) -> String {
    // Formats a float with up to six decimal places but then drops trailing zeros.
    let mut formatted = format!("{:.6}", num);
    if !formatted.contains('.') { return formatted }
    while formatted.ends_with('0') { formatted.pop(); }
    if formatted.ends_with('.') { formatted.pop(); }
    formatted
}


pub fn spinner(message: &str) -> ProgressBar {
    if cfg!(test) {
        ProgressBar::hidden() // don't show a spinner during unit tests
    } else {
        let pb = ProgressBar::new_spinner();
        pb.enable_steady_tick(Duration::from_millis(100));
        let style = ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠚", "⠞", "⠖", "⠦", "⠴", "⠲", "⠳", "⠓"]);
        let style = style.clone().template("{spinner} {msg}").unwrap_or(style);
        pb.set_style(style);
        pb.set_message(message.to_string());
        pb
    }
}
