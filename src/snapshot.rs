// This file contains the snapshot sinks that receive the clusters at each distance cutoff, and
// the cutoff grid that decides when a snapshot is due.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)
// https://github.com/rrwick/Autocycler

// This file is part of Otuclust. Otuclust is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. Otuclust is
// distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with Otuclust. If not, see <http://www.gnu.org/licenses/>.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::edge::unscale_distance;
use crate::error::Result;
use crate::registry::Partition;


pub trait SnapshotSink {
    /// Receives the clusters as they stand at a scaled distance cutoff.
    fn print_clusters(&mut self, partition: &Partition, cutoff: i32) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}


/// For runs that only want the merge log.
pub struct NoSnapshots;

impl SnapshotSink for NoSnapshots {
    fn print_clusters(&mut self, _partition: &Partition, _cutoff: i32) -> Result<()> { Ok(()) }
    fn close(&mut self) -> Result<()> { Ok(()) }
}


/// Writes snapshots as text: a cutoff line, a cluster count line, then one line per cluster with
/// its number, size and member sequence IDs.
pub struct ClusterFileSink<W: Write> {
    out: W,
    snapshots: usize,
}

impl ClusterFileSink<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(ClusterFileSink::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> ClusterFileSink<W> {
    pub fn new(out: W) -> Self {
        ClusterFileSink { out, snapshots: 0 }
    }

    pub fn snapshots(&self) -> usize {
        self.snapshots
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> SnapshotSink for ClusterFileSink<W> {
    fn print_clusters(&mut self, partition: &Partition, cutoff: i32) -> Result<()> {
        let clusters = partition.sorted_clusters();
        writeln!(self.out, "distance cutoff:\t{}", format_cutoff(cutoff))?;
        writeln!(self.out, "Total Clusters:\t{}", clusters.len())?;
        for (i, (_, members)) in clusters.iter().enumerate() {
            let ids: Vec<String> = members.iter().map(|s| s.to_string()).collect();
            writeln!(self.out, "{}\t{}\t{}", i + 1, members.len(), ids.join(" "))?;
        }
        writeln!(self.out)?;
        self.snapshots += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}


pub fn format_cutoff(cutoff: i32) -> String {
    // Up to four decimal places, but always at least one.
    let mut formatted = format!("{:.4}", unscale_distance(cutoff));
    while formatted.ends_with('0') && !formatted.ends_with(".0") {
        formatted.pop();
    }
    formatted
}


/// Tracks the next distance cutoff on a fixed-step grid. Each time the clustering distance passes
/// the current cutoff, the clusters are handed to the sink at that cutoff and the grid advances
/// beyond the new distance.
pub struct CutoffGrid {
    step: i32,
    cutoff: i32,
    max_seen: i32,
    last_emitted: Option<i32>,
    emitted: usize,
}

impl CutoffGrid {
    pub fn new(step: i32) -> Self {
        CutoffGrid { step: step.max(1), cutoff: 0, max_seen: 0, last_emitted: None, emitted: 0 }
    }

    pub fn observe(&mut self, dist: i32, partition: &Partition, sink: &mut dyn SnapshotSink)
            -> Result<()> {
        if dist > self.cutoff {
            self.emit(partition, sink)?;
            self.advance_past(dist);
        }
        self.max_seen = self.max_seen.max(dist);
        Ok(())
    }

    /// Emits the final snapshot at the first grid cutoff covering every distance seen.
    pub fn finish(&mut self, partition: &Partition, sink: &mut dyn SnapshotSink) -> Result<i32> {
        self.advance_past(self.max_seen);
        self.emit(partition, sink)?;
        Ok(self.cutoff)
    }

    pub fn last_emitted(&self) -> Option<i32> {
        self.last_emitted
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    fn emit(&mut self, partition: &Partition, sink: &mut dyn SnapshotSink) -> Result<()> {
        sink.print_clusters(partition, self.cutoff)?;
        self.last_emitted = Some(self.cutoff);
        self.emitted += 1;
        Ok(())
    }

    /// Moves the cutoff to the first grid point at or above dist. A grid point beyond the i32
    /// range is clamped to i32::MAX.
    fn advance_past(&mut self, dist: i32) {
        if dist <= self.cutoff {
            return;
        }
        let step = self.step as i64;
        let next = (dist as i64 + step - 1) / step * step;
        self.cutoff = i32::try_from(next).unwrap_or(i32::MAX);
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CutoffRecorder {
        cutoffs: Vec<(i32, usize)>,
    }

    impl SnapshotSink for CutoffRecorder {
        fn print_clusters(&mut self, partition: &Partition, cutoff: i32) -> Result<()> {
            self.cutoffs.push((cutoff, partition.cluster_count()));
            Ok(())
        }
        fn close(&mut self) -> Result<()> { Ok(()) }
    }

    #[test]
    fn test_format_cutoff() {
        assert_eq!(format_cutoff(0), "0.0");
        assert_eq!(format_cutoff(100), "0.01");
        assert_eq!(format_cutoff(150), "0.015");
        assert_eq!(format_cutoff(1234), "0.1234");
        assert_eq!(format_cutoff(10000), "1.0");
        assert_eq!(format_cutoff(2500), "0.25");
    }

    #[test]
    fn test_grid() {
        let partition = Partition::new();
        let mut sink = CutoffRecorder::default();
        let mut grid = CutoffGrid::new(100);
        for d in [0, 0, 50, 100, 100, 101, 350, 360] {
            grid.observe(d, &partition, &mut sink).unwrap();
        }
        assert_eq!(grid.finish(&partition, &mut sink).unwrap(), 400);
        let cutoffs: Vec<i32> = sink.cutoffs.iter().map(|c| c.0).collect();
        assert_eq!(cutoffs, vec![0, 100, 200, 400]);
        assert_eq!(grid.last_emitted(), Some(400));
        assert_eq!(grid.emitted(), 4);
    }

    #[test]
    fn test_grid_near_largest_distance() {
        let partition = Partition::new();
        let mut sink = CutoffRecorder::default();
        let mut grid = CutoffGrid::new(100);
        grid.observe(i32::MAX - 5, &partition, &mut sink).unwrap();
        assert_eq!(grid.finish(&partition, &mut sink).unwrap(), i32::MAX);
        let cutoffs: Vec<i32> = sink.cutoffs.iter().map(|c| c.0).collect();
        assert_eq!(cutoffs, vec![0, i32::MAX]);

        let mut sink = CutoffRecorder::default();
        let mut grid = CutoffGrid::new(1000);
        grid.observe(2_147_482_001, &partition, &mut sink).unwrap();
        assert_eq!(grid.finish(&partition, &mut sink).unwrap(), 2_147_483_000);
    }

    #[test]
    fn test_grid_no_distances() {
        let partition = Partition::new();
        let mut sink = CutoffRecorder::default();
        let mut grid = CutoffGrid::new(100);
        assert_eq!(grid.finish(&partition, &mut sink).unwrap(), 0);
        assert_eq!(sink.cutoffs, vec![(0, 0)]);
    }

    #[test]
    fn test_cluster_file_sink() {
        let mut partition = Partition::new();
        for (c, s) in [(0, 4), (1, 2), (2, 9)] {
            partition.add_singleton(c, s).unwrap();
        }
        partition.merge(0, 2, 3).unwrap();
        let mut sink = ClusterFileSink::new(Vec::new());
        sink.print_clusters(&partition, 300).unwrap();
        sink.close().unwrap();
        assert_eq!(sink.snapshots(), 1);
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(text, "distance cutoff:\t0.03\n\
                          Total Clusters:\t2\n\
                          1\t1\t2\n\
                          2\t2\t4 9\n\
                          \n");
    }
}
