// This file contains the code for writing Otuclust's YAML files of metrics.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)
// https://github.com/rrwick/Autocycler

// This file is part of Otuclust. Otuclust is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. Otuclust is
// distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with Otuclust. If not, see <http://www.gnu.org/licenses/>.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io;
use std::io::Write;
use std::path::Path;

use crate::edge::unscale_distance;
use crate::linkage::LinkageSummary;
use crate::registry::{EdgeIndex, Registry};
use crate::upgma::UpgmaStats;


#[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct ClusteringMetrics {
    pub method: String,
    pub psi: Option<f64>,
    pub step: f64,
    pub edges_read: u64,
    pub sequence_count: usize,
    pub merge_count: u64,
    pub final_cluster_count: usize,
    pub final_cutoff: Option<f64>,
    pub snapshot_count: usize,
    pub halted: bool,
    pub last_safe_cutoff: Option<f64>,
    pub halt_detail: Option<String>,
    pub load_count: u64,
    pub lookahead_count: u64,
    pub lookahead_edges: u64,
}

impl ClusteringMetrics {
    pub fn new(method: &str, step: i32) -> Self {
        ClusteringMetrics { method: method.to_string(), step: unscale_distance(step),
                            ..Default::default() }
    }

    /// Fills in the final state of the clusters.
    pub fn add_registry<I: EdgeIndex>(&mut self, registry: &Registry<I>) {
        self.sequence_count = registry.partition().sequence_count();
        self.final_cluster_count = registry.partition().cluster_count();
        self.merge_count = registry.merges();
    }

    pub fn add_linkage_summary(&mut self, summary: &LinkageSummary) {
        self.edges_read = summary.edges_read;
        self.snapshot_count = summary.snapshots;
        self.final_cutoff = Some(unscale_distance(summary.final_cutoff));
    }

    pub fn add_upgma_stats(&mut self, psi: i32, stats: &UpgmaStats) {
        self.psi = Some(unscale_distance(psi));
        self.edges_read = stats.edges_read;
        self.snapshot_count = stats.snapshots;
        self.load_count = stats.loads;
        self.lookahead_count = stats.lookaheads;
        self.lookahead_edges = stats.lookahead_edges;
    }

    pub fn set_halted(&mut self, last_safe_cutoff: i32, detail: &str) {
        self.halted = true;
        self.last_safe_cutoff = Some(unscale_distance(last_safe_cutoff));
        self.halt_detail = Some(detail.to_string());
        self.final_cutoff = None;
    }

    pub fn save_to_yaml(&self, filename: &Path) -> io::Result<()> { save_yaml(filename, self) }
}


fn save_yaml<T: Serialize>(yaml_filename: &Path, data: T) -> io::Result<()> {
    let yaml_string = serde_yaml::to_string(&data)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut file = File::create(yaml_filename)?;
    file.write_all(yaml_string.as_bytes())?;
    Ok(())
}
