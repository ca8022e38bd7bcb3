// This file contains the code for the otuclust replay subcommand, which rebuilds cluster
// snapshots from a merge log without touching the edge data again.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)
// https://github.com/rrwick/Autocycler

// This file is part of Otuclust. Otuclust is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. Otuclust is
// distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with Otuclust. If not, see <http://www.gnu.org/licenses/>.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::edge::{scale_distance, unscale_distance};
use crate::error::Result;
use crate::log::{section_header, explanation};
use crate::merge_log::{MergeLogReader, MergeRecord};
use crate::misc::{check_if_file_exists, check_if_parent_dir_exists, format_duration,
                  format_float, quit_with_error, spinner};
use crate::registry::Partition;
use crate::snapshot::{ClusterFileSink, CutoffGrid, SnapshotSink};


#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub singletons: u64,
    pub merges: u64,
    pub snapshots: usize,
    pub final_cluster_count: usize,
    pub final_cutoff: i32,
}


pub fn replay(merges_file: PathBuf, out_file: PathBuf, step: f64) {
    let start_time = Instant::now();
    check_settings(&merges_file, &out_file, step);
    starting_message();
    print_settings(&merges_file, &out_file, step);
    let summary = replay_file(&merges_file, &out_file, scale_distance(step)).unwrap_or_else(|e| {
        quit_with_error(&format!("failed to replay {}\n{}", merges_file.display(), e));
    });
    finished_message(&out_file, &summary, start_time);
}


fn check_settings(merges_file: &Path, out_file: &Path, step: f64) {
    check_if_file_exists(merges_file);
    check_if_parent_dir_exists(out_file);
    if merges_file == out_file {
        quit_with_error("--merges_file and --out_file cannot be the same file");
    }
    if scale_distance(step) <= 0 { quit_with_error("--step must be at least 0.0001"); }
}


fn starting_message() {
    section_header("Starting otuclust replay");
    explanation("This command reads a merge log written by otuclust cluster and rebuilds the \
                 cluster snapshots from it, so snapshots at a different step can be made without \
                 clustering again.");
}


fn print_settings(merges_file: &Path, out_file: &Path, step: f64) {
    eprintln!("Settings:");
    eprintln!("  --merges_file {}", merges_file.display());
    eprintln!("  --out_file {}", out_file.display());
    eprintln!("  --step {}", format_float(step));
    eprintln!();
}


fn finished_message(out_file: &Path, summary: &ReplaySummary, start_time: Instant) {
    section_header("Finished!");
    eprintln!("Replayed {} singletons and {} merges", summary.singletons, summary.merges);
    eprintln!("Final clusters: {} at distance {}", summary.final_cluster_count,
              format_float(unscale_distance(summary.final_cutoff)));
    eprintln!("Snapshots ({}): {}", summary.snapshots, out_file.display());
    eprintln!("Time to run: {}", format_duration(start_time.elapsed()));
    eprintln!();
}


fn replay_file(merges_file: &Path, out_file: &Path, step: i32) -> Result<ReplaySummary> {
    let pb = spinner("replaying merge log...");
    let mut reader = MergeLogReader::open(merges_file)?;
    let mut sink = ClusterFileSink::create(out_file)?;
    let summary = replay_merge_log(&mut reader, step, &mut sink)?;
    sink.close()?;
    pb.finish_and_clear();
    Ok(summary)
}


/// Applies every record of a merge log to an empty partition, handing the partition to the sink
/// each time the merge distance passes the next cutoff on the grid.
pub fn replay_merge_log<R: Read>(reader: &mut MergeLogReader<R>, step: i32,
                                 sink: &mut dyn SnapshotSink) -> Result<ReplaySummary> {
    let mut partition = Partition::new();
    let mut grid = CutoffGrid::new(step);
    let mut summary = ReplaySummary::default();
    while let Some(record) = reader.next_record()? {
        match record {
            MergeRecord::Singleton { cluster, seq } => {
                partition.add_singleton(cluster, seq)?;
                summary.singletons += 1;
            }
            MergeRecord::Merge { ci, cj, ck, dist } => {
                grid.observe(dist, &partition, sink)?;
                partition.merge(ci, cj, ck)?;
                summary.merges += 1;
            }
        }
    }
    summary.final_cutoff = grid.finish(&partition, sink)?;
    summary.snapshots = grid.emitted();
    summary.final_cluster_count = partition.cluster_count();
    Ok(summary)
}
