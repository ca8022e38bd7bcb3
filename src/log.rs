// This file contains functions for writing Otuclust's progress messages to stderr.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)
// https://github.com/rrwick/Autocycler

// This file is part of Otuclust. Otuclust is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. Otuclust is
// distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with Otuclust. If not, see <http://www.gnu.org/licenses/>.

use chrono::prelude::*;
use colored::Colorize;


pub fn section_header(text: &str) {
    let now = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let date = format!("({})", now);
    eprintln!();
    eprintln!("{} {}", text.bold().bright_yellow().underline(), date.dimmed());
}


pub fn explanation(text: &str) {
    let width = terminal_width();
    let wrapped = textwrap::fill(text, width);
    eprintln!("{}", wrapped.dimmed());
    eprintln!();
}


fn terminal_width() -> usize {
    // Long explanations are wrapped to the terminal, capped so they stay readable on wide screens.
    match term_size::dimensions_stderr() {
        Some((w, _)) => w.clamp(40, 100),
        None => 80,
    }
}
