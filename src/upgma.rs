// This file contains the bounded UPGMA (average-linkage) engine. It never holds the full distance
// matrix: edges are loaded from the sorted stream until memory runs short, and two clusters are
// merged only when upper and lower bounds on the average distances prove that no other pair could
// be closer. When memory blocks loading, a lookahead scan folds later edges into existing thick
// edges to tighten their bounds.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)
// https://github.com/rrwick/Autocycler

// This file is part of Otuclust. Otuclust is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. Otuclust is
// distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with Otuclust. If not, see <http://www.gnu.org/licenses/>.

use std::fmt;
use std::io::{Read, Seek, Write};
use std::time::{Duration, Instant};

use crate::edge::{check_ascending, ClusterId, ThinEdge};
use crate::edge_file::RandomAccessEdgeFile;
use crate::error::{ClusterError, Result};
use crate::heap::{HeapKeys, IndexedHeap};
use crate::memory::MemoryProbe;
use crate::registry::{EdgeArena, EdgeHandle, EdgeIndex, Registry};
use crate::snapshot::{CutoffGrid, SnapshotSink};


pub const DEFAULT_MAX_MEMORY_RATIO: f64 = 0.85;
pub const DEFAULT_SAMPLE_INTERVAL: u64 = 10000;


/// Thick edges ordered two ways: by upper bound (unseen pairs at psi) and by lower bound (unseen
/// pairs at lambda).
pub struct BoundHeaps {
    pub upper: IndexedHeap,
    pub lower: IndexedHeap,
}

impl BoundHeaps {
    pub fn new(psi: i32) -> Self {
        BoundHeaps { upper: IndexedHeap::new(psi as i64), lower: IndexedHeap::new(0) }
    }
}

impl EdgeIndex for BoundHeaps {
    fn inserted(&mut self, handle: EdgeHandle, edges: &EdgeArena) {
        self.upper.insert(handle, edges);
        self.lower.insert(handle, edges);
    }

    fn removed(&mut self, handle: EdgeHandle, edges: &EdgeArena) {
        self.upper.delete(handle, edges);
        self.lower.delete(handle, edges);
    }

    fn changed(&mut self, handle: EdgeHandle, edges: &EdgeArena) {
        self.upper.changed(handle, edges);
        self.lower.changed(handle, edges);
    }
}


pub fn upgma_registry(psi: i32) -> Registry<BoundHeaps> {
    Registry::new(BoundHeaps::new(psi))
}


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadStatus {
    Loaded,
    NeedLookahead,
    Exhausted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookaheadStatus {
    Progress,
    NoProgress,
    Exhausted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpgmaState {
    Loading,
    Merging,
    Lookahead,
    Halted,
    Done,
}


#[derive(Clone, Debug)]
pub struct UpgmaConfig {
    pub psi: i32,
    pub step: i32,
    pub max_memory_ratio: f64,
    pub sample_interval: u64,
    pub validate: bool,
}

impl UpgmaConfig {
    pub fn new(psi: i32, step: i32) -> Self {
        UpgmaConfig { psi, step, max_memory_ratio: DEFAULT_MAX_MEMORY_RATIO,
                      sample_interval: DEFAULT_SAMPLE_INTERVAL, validate: false }
    }
}


#[derive(Clone, Debug, Default)]
pub struct UpgmaStats {
    pub edges_read: u64,
    pub tombstones_skipped: u64,
    pub loads: u64,
    pub lookaheads: u64,
    pub lookahead_edges: u64,
    pub merges: u64,
    pub snapshots: usize,
    pub lambda: i64,
    pub time_loading: Duration,
    pub time_merging: Duration,
    pub time_lookahead: Duration,
}


/// Why merging paused: the best candidate's upper bound was above a rival's lower bound.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StallReport {
    pub ci: ClusterId,
    pub cj: ClusterId,
    pub pairs: i64,
    pub seen_edges: i64,
    pub seen_distances: i64,
    pub upper_bound: i64,
    pub lowest_lower_bound: i64,
    pub second_lower_bound: Option<i64>,
    pub lambda: i64,
}

impl fmt::Display for StallReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let second = match self.second_lower_bound {
            Some(b) => b.to_string(),
            None => "none".to_string(),
        };
        write!(f, "thick edge {}-{} ({}/{} pairs seen, distance sum {}) has upper bound {}, \
                   lowest lower bound {}, second lowest {}, lambda {}",
               self.ci, self.cj, self.seen_edges, self.pairs, self.seen_distances,
               self.upper_bound, self.lowest_lower_bound, second, self.lambda)
    }
}


/// Streams edges from a random-access edge file into the registry, watching memory as it goes.
pub struct UpgmaReader<F: Read + Write + Seek, P: MemoryProbe> {
    edge_file: RandomAccessEdgeFile<F>,
    probe: P,
    psi: i32,
    max_memory_ratio: f64,
    sample_interval: u64,
    unknown_lambda: i32,
    previous: Option<i32>,
    exhausted: bool,
    last_ratio: f64,
    edges_read: u64,
    tombstones_skipped: u64,
    lookaheads: u64,
    lookahead_edges: u64,
}

impl<F: Read + Write + Seek, P: MemoryProbe> UpgmaReader<F, P> {
    pub fn new(edge_file: RandomAccessEdgeFile<F>, probe: P, config: &UpgmaConfig) -> Self {
        UpgmaReader {
            edge_file,
            probe,
            psi: config.psi,
            max_memory_ratio: config.max_memory_ratio,
            sample_interval: config.sample_interval.max(1),
            unknown_lambda: 0,
            previous: None,
            exhausted: false,
            last_ratio: 0.0,
            edges_read: 0,
            tombstones_skipped: 0,
            lookaheads: 0,
            lookahead_edges: 0,
        }
    }

    /// The largest distance read so far. Every edge not yet read is at least this far.
    pub fn unknown_lambda(&self) -> i32 {
        self.unknown_lambda
    }

    pub fn last_memory_ratio(&self) -> f64 {
        self.last_ratio
    }

    /// Reads edges until memory reaches the ceiling or the stream ends.
    pub fn load_more_edges(&mut self, registry: &mut Registry<BoundHeaps>) -> Result<LoadStatus> {
        if self.exhausted {
            return Ok(LoadStatus::Exhausted);
        }
        let mut scanned = 0u64;
        let mut consumed = 0u64;
        loop {
            if scanned % self.sample_interval == 0 {
                self.last_ratio = self.probe.memory_ratio();
                if self.last_ratio >= self.max_memory_ratio { break; }
            }
            scanned += 1;
            let Some(edge) = self.edge_file.next_edge()? else {
                self.exhausted = true;
                break;
            };
            if edge.is_tombstone() {
                self.tombstones_skipped += 1;
                continue;
            }
            check_ascending(self.previous, &edge, "edge file")?;
            self.check_psi(&edge)?;
            self.previous = Some(edge.dist);
            self.unknown_lambda = edge.dist;
            consumed += 1;
            self.edges_read += 1;

            let ci = registry.get_or_create_cluster(edge.seq_i)?;
            let cj = registry.get_or_create_cluster(edge.seq_j)?;
            if ci.id != cj.id {
                registry.observe(ci.id, cj.id, edge.dist)?;
            }
        }
        Ok(if consumed > 0 {
            LoadStatus::Loaded
        } else if self.exhausted {
            LoadStatus::Exhausted
        } else {
            LoadStatus::NeedLookahead
        })
    }

    /// Scans the unread part of the file for edges between clusters that already share a thick
    /// edge. Those edges are added to their thick edge and tombstoned, which costs no new memory.
    /// The read position is unchanged afterwards.
    pub fn look_ahead(&mut self, registry: &mut Registry<BoundHeaps>)
            -> Result<LookaheadStatus> {
        self.edge_file.mark()?;
        let scan = self.scan_ahead(registry);
        let reset = self.edge_file.reset();
        let (folded, live) = scan?;
        reset?;
        self.edge_file.flush()?;
        self.lookaheads += 1;
        self.lookahead_edges += folded;
        Ok(if folded > 0 {
            LookaheadStatus::Progress
        } else if live == 0 {
            self.exhausted = true;
            LookaheadStatus::Exhausted
        } else {
            LookaheadStatus::NoProgress
        })
    }

    fn scan_ahead(&mut self, registry: &mut Registry<BoundHeaps>) -> Result<(u64, u64)> {
        let mut folded = 0;
        let mut live = 0;
        while let Some(edge) = self.edge_file.next_edge()? {
            if edge.is_tombstone() { continue; }
            self.check_psi(&edge)?;
            let (Some(ci), Some(cj)) = (registry.get_cluster(edge.seq_i),
                                        registry.get_cluster(edge.seq_j)) else {
                live += 1;
                continue;
            };
            if ci.id == cj.id {
                // Already together, so this edge can never matter again.
                self.edge_file.overwrite_edge(&ThinEdge::TOMBSTONE)?;
                continue;
            }
            match registry.get_thick_edge(ci.id, cj.id) {
                Some(h) => {
                    registry.add_distance(h, edge.dist)?;
                    self.edge_file.overwrite_edge(&ThinEdge::TOMBSTONE)?;
                    folded += 1;
                }
                None => live += 1,
            }
        }
        Ok((folded, live))
    }

    fn check_psi(&self, edge: &ThinEdge) -> Result<()> {
        if edge.dist > self.psi {
            return Err(ClusterError::MalformedInput(
                format!("edge {} is beyond psi ({})", edge, self.psi)));
        }
        Ok(())
    }
}


enum Candidate {
    Empty,
    Safe { ci: ClusterId, cj: ClusterId, height: i32 },
    Stalled(StallReport),
}


pub struct UpgmaEngine<F: Read + Write + Seek, P: MemoryProbe> {
    reader: UpgmaReader<F, P>,
    psi: i64,
    lambda: i64,
    grid: CutoffGrid,
    validate: bool,
    state: UpgmaState,
    exhausted: bool,
    last_stall: Option<StallReport>,
    loads: u64,
    merges: u64,
    time_loading: Duration,
    time_merging: Duration,
    time_lookahead: Duration,
}

impl<F: Read + Write + Seek, P: MemoryProbe> UpgmaEngine<F, P> {
    pub fn new(reader: UpgmaReader<F, P>, config: &UpgmaConfig) -> Self {
        UpgmaEngine {
            reader,
            psi: config.psi as i64,
            lambda: 0,
            grid: CutoffGrid::new(config.step),
            validate: config.validate,
            state: UpgmaState::Loading,
            exhausted: false,
            last_stall: None,
            loads: 0,
            merges: 0,
            time_loading: Duration::ZERO,
            time_merging: Duration::ZERO,
            time_lookahead: Duration::ZERO,
        }
    }

    pub fn state(&self) -> UpgmaState {
        self.state
    }

    pub fn last_stall(&self) -> Option<&StallReport> {
        self.last_stall.as_ref()
    }

    pub fn stats(&self) -> UpgmaStats {
        UpgmaStats {
            edges_read: self.reader.edges_read,
            tombstones_skipped: self.reader.tombstones_skipped,
            loads: self.loads,
            lookaheads: self.reader.lookaheads,
            lookahead_edges: self.reader.lookahead_edges,
            merges: self.merges,
            snapshots: self.grid.emitted(),
            lambda: self.lambda,
            time_loading: self.time_loading,
            time_merging: self.time_merging,
            time_lookahead: self.time_lookahead,
        }
    }

    /// Runs until every safe merge is done. Returns the cutoff of the final snapshot, or
    /// InsufficientData if memory ran out before clustering could finish.
    pub fn run(&mut self, registry: &mut Registry<BoundHeaps>, sink: &mut dyn SnapshotSink)
            -> Result<i32> {
        loop {
            self.state = match self.state {
                UpgmaState::Loading   => self.load(registry)?,
                UpgmaState::Lookahead => self.lookahead(registry)?,
                UpgmaState::Merging   => self.merge(registry, sink)?,
                UpgmaState::Halted => {
                    registry.flush()?;
                    return Err(self.insufficient_data());
                }
                UpgmaState::Done => {
                    let final_cutoff = self.grid.finish(registry.partition(), sink)?;
                    registry.flush()?;
                    return Ok(final_cutoff);
                }
            };
        }
    }

    fn load(&mut self, registry: &mut Registry<BoundHeaps>) -> Result<UpgmaState> {
        let start = Instant::now();
        let status = self.reader.load_more_edges(registry)?;
        self.time_loading += start.elapsed();
        Ok(match status {
            LoadStatus::Loaded => {
                self.loads += 1;
                self.lambda = self.reader.unknown_lambda() as i64;
                eprintln!("Load {}: {} edges read, lambda = {}, {} thick edges, memory {:.1}%",
                          self.loads, self.reader.edges_read, self.lambda, registry.edges().len(),
                          100.0 * self.reader.last_memory_ratio());
                UpgmaState::Merging
            }
            LoadStatus::NeedLookahead => {
                eprintln!("Memory limit reached ({:.1}%), looking ahead for edges between \
                           joined clusters", 100.0 * self.reader.last_memory_ratio());
                UpgmaState::Lookahead
            }
            LoadStatus::Exhausted => {
                self.finish_stream();
                UpgmaState::Merging
            }
        })
    }

    fn lookahead(&mut self, registry: &mut Registry<BoundHeaps>) -> Result<UpgmaState> {
        let start = Instant::now();
        let status = self.reader.look_ahead(registry)?;
        self.time_lookahead += start.elapsed();
        eprintln!("Lookahead {}: {} edges folded in so far", self.reader.lookaheads,
                  self.reader.lookahead_edges);
        Ok(match status {
            LookaheadStatus::Progress => UpgmaState::Merging,
            LookaheadStatus::NoProgress => UpgmaState::Halted,
            LookaheadStatus::Exhausted => {
                self.finish_stream();
                UpgmaState::Merging
            }
        })
    }

    fn finish_stream(&mut self) {
        // With nothing left to read, every unseen pair can be taken to be at psi.
        self.exhausted = true;
        self.lambda = self.psi;
    }

    fn merge(&mut self, registry: &mut Registry<BoundHeaps>, sink: &mut dyn SnapshotSink)
            -> Result<UpgmaState> {
        let start = Instant::now();
        self.apply_lambda(registry);
        if self.validate {
            self.validate_heaps(registry)?;
        }
        let result = self.merge_safe_edges(registry, sink);
        self.time_merging += start.elapsed();
        match result? {
            None => {
                self.last_stall = None;
                Ok(if self.exhausted { UpgmaState::Done } else { UpgmaState::Loading })
            }
            Some(stall) => {
                if self.exhausted {
                    return Err(ClusterError::Consistency(
                        format!("merging stalled after every edge was read: {}", stall)));
                }
                eprintln!("Merging paused: {}", stall);
                self.last_stall = Some(stall);
                Ok(UpgmaState::Loading)
            }
        }
    }

    fn apply_lambda(&self, registry: &mut Registry<BoundHeaps>) {
        let (heaps, edges) = registry.index_and_edges();
        if heaps.lower.param() != self.lambda {
            heaps.lower.set_param(self.lambda);
            heaps.lower.rebuild(edges);
        }
    }

    fn validate_heaps(&self, registry: &Registry<BoundHeaps>) -> Result<()> {
        let heaps = registry.index();
        heaps.upper.validate(registry.edges())?;
        heaps.lower.validate(registry.edges())?;
        if heaps.upper.len() != registry.edges().len() || heaps.lower.len() != heaps.upper.len() {
            return Err(ClusterError::Consistency(format!(
                "{} thick edges but heaps hold {} and {}", registry.edges().len(),
                heaps.upper.len(), heaps.lower.len())));
        }
        registry.validate()
    }

    fn merge_safe_edges(&mut self, registry: &mut Registry<BoundHeaps>,
                        sink: &mut dyn SnapshotSink) -> Result<Option<StallReport>> {
        loop {
            match self.next_candidate(registry)? {
                Candidate::Empty => return Ok(None),
                Candidate::Stalled(report) => return Ok(Some(report)),
                Candidate::Safe { ci, cj, height } => {
                    self.grid.observe(height, registry.partition(), sink)?;
                    registry.merge_cluster(ci, cj, height)?;
                    self.merges += 1;
                }
            }
        }
    }

    fn next_candidate(&self, registry: &Registry<BoundHeaps>) -> Result<Candidate> {
        // The candidate is the edge with the lowest upper bound. Its true average can be no more
        // than that, and every rival's true average is at least its lower bound. Clusters with no
        // thick edge between them have every pair unseen, so their rival bound is lambda.
        let heaps = registry.index();
        let edges = registry.edges();
        let Some(top) = heaps.upper.top() else { return Ok(Candidate::Empty) };
        let edge = edges.get(top).ok_or_else(|| {
            ClusterError::Consistency(format!("upper-bound heap holds dead handle {}", top))
        })?;
        let upper_bound = edge.bound(self.psi);
        let lowest = heaps.lower.top().ok_or_else(|| {
            ClusterError::Consistency("lower-bound heap is empty".to_string())
        })?;
        let lowest_lb = edges.key(lowest, self.lambda);
        let second_lb = heaps.lower.second_top(edges).map(|h| edges.key(h, self.lambda));

        // The second-lowest lower bound only stands in when the lowest belongs to the candidate.
        let rival = if lowest == top { second_lb } else { Some(lowest_lb) };
        let rival = rival.map_or(self.lambda, |lb| lb.min(self.lambda));
        if upper_bound <= rival {
            return Ok(Candidate::Safe { ci: edge.ci, cj: edge.cj, height: upper_bound as i32 });
        }
        Ok(Candidate::Stalled(StallReport {
            ci: edge.ci,
            cj: edge.cj,
            pairs: edge.pairs,
            seen_edges: edge.seen_edges,
            seen_distances: edge.seen_distances,
            upper_bound,
            lowest_lower_bound: lowest_lb,
            second_lower_bound: second_lb,
            lambda: self.lambda,
        }))
    }

    fn insufficient_data(&self) -> ClusterError {
        let detail = match &self.last_stall {
            Some(stall) => format!("merging stalled on {}", stall),
            None => "the memory limit was reached and no further edges could be loaded"
                .to_string(),
        };
        ClusterError::InsufficientData {
            last_safe_cutoff: self.grid.last_emitted().unwrap_or(0),
            detail,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use crate::tests::{edge_stream, ScriptedMemory, SnapshotRecorder};

    fn engine(edges: &[ThinEdge], psi: i32, ratios: Vec<f64>)
            -> UpgmaEngine<Cursor<Vec<u8>>, ScriptedMemory> {
        let mut config = UpgmaConfig::new(psi, 100);
        config.sample_interval = 1;
        config.validate = true;
        let file = RandomAccessEdgeFile::with_capacity(Cursor::new(edge_stream(edges)), 2);
        let reader = UpgmaReader::new(file, ScriptedMemory::new(ratios), &config);
        UpgmaEngine::new(reader, &config)
    }

    fn four_sequences() -> Vec<ThinEdge> {
        vec![ThinEdge::new(0, 1, 100), ThinEdge::new(2, 3, 200), ThinEdge::new(0, 2, 300),
             ThinEdge::new(1, 3, 400), ThinEdge::new(0, 3, 500), ThinEdge::new(1, 2, 600)]
    }

    #[test]
    fn test_bound_heaps_follow_registry() {
        let mut registry = upgma_registry(1000);
        for s in 0..3 { registry.create_singleton(s).unwrap(); }
        let a = registry.observe(0, 1, 300).unwrap();
        let b = registry.observe(0, 2, 100).unwrap();
        assert_eq!(registry.index().upper.top(), Some(b));
        registry.add_distance(a, 0).unwrap();
        registry.merge_cluster(0, 2, 100).unwrap();
        let heaps = registry.index();
        assert_eq!(heaps.upper.len(), 1);
        assert_eq!(heaps.lower.len(), 1);
        heaps.upper.validate(registry.edges()).unwrap();
        heaps.lower.validate(registry.edges()).unwrap();
    }

    #[test]
    fn test_ample_memory() {
        let mut engine = engine(&four_sequences(), 600, vec![0.0]);
        let mut registry = upgma_registry(600);
        let mut sink = SnapshotRecorder::default();
        assert_eq!(engine.run(&mut registry, &mut sink).unwrap(), 500);
        assert_eq!(engine.state(), UpgmaState::Done);
        assert_eq!(sink.cutoffs(), vec![0, 100, 200, 500]);
        assert_eq!(sink.snapshots[0].1, vec![vec![0], vec![1], vec![2], vec![3]]);
        assert_eq!(sink.snapshots[1].1, vec![vec![2], vec![3], vec![0, 1]]);
        assert_eq!(sink.snapshots[2].1, vec![vec![0, 1], vec![2, 3]]);
        assert_eq!(sink.snapshots[3].1, vec![vec![0, 1, 2, 3]]);
        let stats = engine.stats();
        assert_eq!(stats.edges_read, 6);
        assert_eq!(stats.merges, 3);
        assert_eq!(stats.lookaheads, 0);
        assert_eq!(stats.lambda, 600);
    }

    #[test]
    fn test_lookahead_then_finish() {
        let edges = vec![ThinEdge::new(0, 1, 50), ThinEdge::new(2, 3, 60),
                         ThinEdge::new(0, 2, 70), ThinEdge::new(0, 3, 800),
                         ThinEdge::new(1, 2, 900), ThinEdge::new(1, 3, 950)];
        let mut engine = engine(&edges, 1000, vec![0.0, 0.0, 0.0, 1.0]);
        let mut registry = upgma_registry(1000);
        let mut sink = SnapshotRecorder::default();
        assert_eq!(engine.run(&mut registry, &mut sink).unwrap(), 700);
        assert_eq!(sink.cutoffs(), vec![0, 100, 700]);
        assert_eq!(registry.partition().cluster_count(), 1);
        let stats = engine.stats();
        assert_eq!(stats.edges_read, 3);
        assert_eq!(stats.lookahead_edges, 3);
        assert_eq!(stats.lookaheads, 2);
        assert_eq!(stats.merges, 3);
    }

    #[test]
    fn test_halt_without_pending_edge() {
        let edges = vec![ThinEdge::new(0, 1, 50), ThinEdge::new(2, 3, 60),
                         ThinEdge::new(4, 5, 500)];
        let mut engine = engine(&edges, 1000, vec![0.0, 0.0, 1.0]);
        let mut registry = upgma_registry(1000);
        let mut sink = SnapshotRecorder::default();
        match engine.run(&mut registry, &mut sink) {
            Err(ClusterError::InsufficientData { last_safe_cutoff, detail }) => {
                assert_eq!(last_safe_cutoff, 0);
                assert!(detail.contains("memory limit"));
            }
            other => panic!("expected InsufficientData, got {:?}", other.map(|_| ())),
        }
        assert_eq!(engine.state(), UpgmaState::Halted);
        assert!(engine.last_stall().is_none());
        assert_eq!(registry.merges(), 2);
        assert_eq!(sink.cutoffs(), vec![0]);
    }

    #[test]
    fn test_halt_with_stall_report() {
        let edges = vec![ThinEdge::new(0, 1, 50), ThinEdge::new(2, 3, 60),
                         ThinEdge::new(0, 2, 70), ThinEdge::new(0, 3, 800),
                         ThinEdge::new(1, 2, 900), ThinEdge::new(4, 5, 990)];
        let mut engine = engine(&edges, 1000, vec![0.0, 0.0, 0.0, 1.0]);
        let mut registry = upgma_registry(1000);
        let mut sink = SnapshotRecorder::default();
        let result = engine.run(&mut registry, &mut sink);
        assert!(matches!(result, Err(ClusterError::InsufficientData { last_safe_cutoff: 0, .. })));
        let stall = engine.last_stall().unwrap();
        assert_eq!((stall.pairs, stall.seen_edges, stall.seen_distances), (4, 3, 1770));
        assert_eq!(stall.upper_bound, 692);
        assert_eq!(stall.lowest_lower_bound, 460);
        assert_eq!(stall.second_lower_bound, None);
        assert_eq!(registry.partition().cluster_count(), 2);
    }

    #[test]
    fn test_duplicate_edges() {
        let edges = vec![ThinEdge::new(0, 1, 50), ThinEdge::new(0, 1, 60)];
        let mut engine = engine(&edges, 60, vec![0.0]);
        let mut registry = upgma_registry(60);
        let mut sink = SnapshotRecorder::default();
        assert_eq!(engine.run(&mut registry, &mut sink).unwrap(), 100);
        assert_eq!(engine.state(), UpgmaState::Done);
        assert_eq!(registry.partition().cluster_count(), 1);
        assert_eq!(engine.stats().merges, 1);
        assert_eq!(sink.cutoffs(), vec![0, 100]);
        assert_eq!(sink.snapshots[1].1, vec![vec![0, 1]]);
    }

    #[test]
    fn test_edge_beyond_psi() {
        let edges = vec![ThinEdge::new(0, 1, 50), ThinEdge::new(2, 3, 2000)];
        let mut engine = engine(&edges, 1000, vec![0.0]);
        let mut registry = upgma_registry(1000);
        let mut sink = SnapshotRecorder::default();
        assert!(matches!(engine.run(&mut registry, &mut sink),
                         Err(ClusterError::MalformedInput(_))));
    }

    #[test]
    fn test_load_statuses() {
        let mut config = UpgmaConfig::new(1000, 100);
        config.sample_interval = 1;
        let file = RandomAccessEdgeFile::new(Cursor::new(edge_stream(&four_sequences())));
        let mut reader = UpgmaReader::new(file, ScriptedMemory::new(vec![1.0, 0.0]), &config);
        let mut registry = upgma_registry(1000);
        assert_eq!(reader.load_more_edges(&mut registry).unwrap(), LoadStatus::NeedLookahead);
        assert_eq!(reader.load_more_edges(&mut registry).unwrap(), LoadStatus::Loaded);
        assert_eq!(reader.unknown_lambda(), 600);
        assert_eq!(reader.load_more_edges(&mut registry).unwrap(), LoadStatus::Exhausted);
        assert_eq!(registry.edges().len(), 6);
    }
}
