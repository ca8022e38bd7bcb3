// This file contains the complete-linkage and single-linkage drivers, which cluster a sorted edge
// stream in a single pass.

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

use crate::edge::{check_ascending, EdgeReader};
use crate::error::Result;
use crate::registry::{Cluster, Registry};
use crate::snapshot::{CutoffGrid, SnapshotSink};


#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkageSummary {
    pub edges_read: u64,
    pub merges: u64,
    pub snapshots: usize,
    pub final_cutoff: i32,
}


/// Two clusters merge once every pair of their members has been seen, at the distance of the
/// last pair. Because edges arrive in ascending order, that is their maximum pairwise distance.
pub fn complete_linkage<R: Read>(registry: &mut Registry, reader: &mut EdgeReader<R>, step: i32,
                                 sink: &mut dyn SnapshotSink) -> Result<LinkageSummary> {
    stream_edges(registry, reader, step, sink, |registry, ci, cj, dist| {
        let h = registry.observe(ci.id, cj.id, dist)?;
        if registry.thick_edge(h).is_some_and(|e| e.is_complete()) {
            registry.merge_cluster(ci.id, cj.id, dist)?;
        }
        Ok(())
    })
}


/// Any edge between two different clusters merges them immediately.
pub fn single_linkage<R: Read>(registry: &mut Registry, reader: &mut EdgeReader<R>, step: i32,
                               sink: &mut dyn SnapshotSink) -> Result<LinkageSummary> {
    stream_edges(registry, reader, step, sink, |registry, ci, cj, dist| {
        registry.merge_cluster(ci.id, cj.id, dist)?;
        Ok(())
    })
}


fn stream_edges<R, F>(registry: &mut Registry, reader: &mut EdgeReader<R>, step: i32,
                      sink: &mut dyn SnapshotSink, mut link: F) -> Result<LinkageSummary>
        where R: Read, F: FnMut(&mut Registry, Cluster, Cluster, i32) -> Result<()> {
    let mut grid = CutoffGrid::new(step);
    let mut previous = None;
    let mut edges_read = 0;
    while let Some(edge) = reader.next_edge()? {
        if edge.is_tombstone() { continue; }
        check_ascending(previous, &edge, "edge stream")?;
        previous = Some(edge.dist);
        edges_read += 1;

        let ci = registry.get_or_create_cluster(edge.seq_i)?;
        let cj = registry.get_or_create_cluster(edge.seq_j)?;
        grid.observe(edge.dist, registry.partition(), sink)?;
        if ci.id == cj.id { continue; }
        link(registry, ci, cj, edge.dist)?;
    }
    let final_cutoff = grid.finish(registry.partition(), sink)?;
    registry.flush()?;
    Ok(LinkageSummary { edges_read, merges: registry.merges(), snapshots: grid.emitted(),
                        final_cutoff })
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::ThinEdge;
    use crate::error::ClusterError;
    use crate::tests::{edge_stream, SnapshotRecorder};

    fn three_sequences() -> Vec<ThinEdge> {
        vec![ThinEdge::new(0, 1, 100), ThinEdge::new(1, 2, 150), ThinEdge::new(0, 2, 200)]
    }

    #[test]
    fn test_complete_linkage() {
        let bytes = edge_stream(&three_sequences());
        let mut reader = EdgeReader::new(&bytes[..]);
        let mut registry = Registry::unindexed();
        let mut sink = SnapshotRecorder::default();
        let summary = complete_linkage(&mut registry, &mut reader, 100, &mut sink).unwrap();
        assert_eq!(summary.edges_read, 3);
        assert_eq!(summary.merges, 2);
        assert_eq!(summary.final_cutoff, 200);

        // {0,1} is formed at 100 and every sequence is together only at 200.
        assert_eq!(sink.cutoffs(), vec![0, 100, 200]);
        assert_eq!(sink.snapshots[0].1, vec![vec![0], vec![1]]);
        assert_eq!(sink.snapshots[1].1, vec![vec![0, 1], vec![2]]);
        assert_eq!(sink.snapshots[2].1, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn test_complete_linkage_waits_for_all_pairs() {
        let bytes = edge_stream(&[ThinEdge::new(0, 1, 10), ThinEdge::new(2, 3, 20),
                                  ThinEdge::new(0, 2, 30), ThinEdge::new(1, 3, 40),
                                  ThinEdge::new(0, 3, 50), ThinEdge::new(1, 2, 60)]);
        let mut reader = EdgeReader::new(&bytes[..]);
        let mut registry = Registry::unindexed();
        let mut sink = SnapshotRecorder::default();
        let summary = complete_linkage(&mut registry, &mut reader, 100, &mut sink).unwrap();
        assert_eq!(summary.merges, 3);
        assert_eq!(registry.partition().cluster_count(), 1);
        assert_eq!(registry.edges().len(), 0);
    }

    #[test]
    fn test_single_linkage() {
        let bytes = edge_stream(&three_sequences());
        let mut reader = EdgeReader::new(&bytes[..]);
        let mut registry = Registry::unindexed();
        let mut sink = SnapshotRecorder::default();
        let summary = single_linkage(&mut registry, &mut reader, 50, &mut sink).unwrap();
        assert_eq!(summary.merges, 2);

        // The 150 edge is enough to bring in sequence 2. The 200 edge changes nothing.
        assert_eq!(sink.cutoffs(), vec![0, 100, 150, 200]);
        assert_eq!(sink.snapshots[1].1, vec![vec![0, 1], vec![2]]);
        assert_eq!(sink.snapshots[2].1, vec![vec![0, 1, 2]]);
        assert_eq!(sink.snapshots[3].1, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn test_single_linkage_largest_distance() {
        let bytes = edge_stream(&[ThinEdge::new(0, 1, i32::MAX - 5)]);
        let mut reader = EdgeReader::new(&bytes[..]);
        let mut registry = Registry::unindexed();
        let mut sink = SnapshotRecorder::default();
        let summary = single_linkage(&mut registry, &mut reader, 100, &mut sink).unwrap();
        assert_eq!(summary.merges, 1);
        assert_eq!(summary.final_cutoff, i32::MAX);
        assert_eq!(sink.cutoffs(), vec![0, i32::MAX]);
    }

    #[test]
    fn test_unsorted_stream() {
        let edges = [ThinEdge::new(0, 1, 100), ThinEdge::new(1, 2, 50)];
        let bytes: Vec<u8> = edges.iter().flat_map(|e| e.to_bytes()).collect();
        let mut reader = EdgeReader::new(&bytes[..]);
        let mut registry = Registry::unindexed();
        let mut sink = SnapshotRecorder::default();
        assert!(matches!(single_linkage(&mut registry, &mut reader, 100, &mut sink),
                         Err(ClusterError::MalformedInput(_))));
    }

    #[test]
    fn test_empty_stream() {
        let mut reader = EdgeReader::new(&[0u8; 0][..]);
        let mut registry = Registry::unindexed();
        let mut sink = SnapshotRecorder::default();
        let summary = complete_linkage(&mut registry, &mut reader, 100, &mut sink).unwrap();
        assert_eq!(summary.edges_read, 0);
        assert_eq!(sink.cutoffs(), vec![0]);
    }
}
