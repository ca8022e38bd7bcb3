// This file contains the memory probe used to throttle edge loading during UPGMA clustering.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)
// https://github.com/rrwick/Autocycler

// This file is part of Otuclust. Otuclust is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. Otuclust is
// distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with Otuclust. If not, see <http://www.gnu.org/licenses/>.

use sysinfo::{Pid, System};


pub trait MemoryProbe {
    /// Memory currently in use as a fraction of the allowed maximum.
    fn memory_ratio(&mut self) -> f64;
}


/// Measures this process's resident memory against a ceiling, which defaults to the total system
/// memory.
pub struct ProcessMemory {
    system: System,
    pid: Option<Pid>,
    max_bytes: u64,
}

impl ProcessMemory {
    pub fn new(max_bytes: Option<u64>) -> Self {
        let mut system = System::new();
        system.refresh_memory();
        let max_bytes = max_bytes.unwrap_or_else(|| system.total_memory()).max(1);
        ProcessMemory { system, pid: sysinfo::get_current_pid().ok(), max_bytes }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn used_bytes(&mut self) -> u64 {
        let Some(pid) = self.pid else { return 0 };
        if !self.system.refresh_process(pid) {
            return 0;
        }
        self.system.process(pid).map_or(0, |p| p.memory())
    }
}

impl MemoryProbe for ProcessMemory {
    fn memory_ratio(&mut self) -> f64 {
        self.used_bytes() as f64 / self.max_bytes as f64
    }
}


pub fn gigabytes_to_bytes(gb: f64) -> u64 {
    (gb * 1024.0 * 1024.0 * 1024.0).round() as u64
}
