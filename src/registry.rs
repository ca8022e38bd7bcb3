// This file contains the cluster registry: the partition of sequences into clusters, and the
// thick edges (aggregated distance statistics) between pairs of live clusters.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)
// https://github.com/rrwick/Autocycler

// This file is part of Otuclust. Otuclust is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. Otuclust is
// distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with Otuclust. If not, see <http://www.gnu.org/licenses/>.

use fxhash::{FxHashMap, FxHashSet};

use crate::edge::{ClusterId, SeqId};
use crate::error::{ClusterError, Result};
use crate::heap::HeapKeys;
use crate::merge_log::{MergeLogWriter, MergeRecord};


pub type EdgeHandle = usize;


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cluster {
    pub id: ClusterId,
    pub size: i64,
}


/// Which sequences belong to which cluster. Every known sequence is in exactly one cluster.
#[derive(Default)]
pub struct Partition {
    seq_to_cluster: FxHashMap<SeqId, ClusterId>,
    members: FxHashMap<ClusterId, Vec<SeqId>>,
}

impl Partition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_singleton(&mut self, cluster: ClusterId, seq: SeqId) -> Result<()> {
        if let Some(existing) = self.seq_to_cluster.get(&seq) {
            return Err(ClusterError::Consistency(
                format!("sequence {} is already in cluster {}", seq, existing)));
        }
        if self.members.contains_key(&cluster) {
            return Err(ClusterError::Consistency(format!("cluster {} already exists", cluster)));
        }
        self.seq_to_cluster.insert(seq, cluster);
        self.members.insert(cluster, vec![seq]);
        Ok(())
    }

    /// Retires clusters ci and cj, moving all of their sequences into the new cluster ck.
    pub fn merge(&mut self, ci: ClusterId, cj: ClusterId, ck: ClusterId) -> Result<()> {
        if ci == cj {
            return Err(ClusterError::Consistency(format!("cannot merge cluster {} with itself",
                                                         ci)));
        }
        if self.members.contains_key(&ck) {
            return Err(ClusterError::Consistency(format!("cluster {} already exists", ck)));
        }
        let members_i = self.members.remove(&ci).ok_or_else(|| unknown_cluster(ci))?;
        let members_j = match self.members.remove(&cj) {
            Some(m) => m,
            None => {
                self.members.insert(ci, members_i);
                return Err(unknown_cluster(cj));
            }
        };
        let (mut combined, other) = if members_i.len() >= members_j.len() {
            (members_i, members_j)
        } else {
            (members_j, members_i)
        };
        combined.extend(other);
        for seq in &combined {
            self.seq_to_cluster.insert(*seq, ck);
        }
        self.members.insert(ck, combined);
        Ok(())
    }

    pub fn cluster_of(&self, seq: SeqId) -> Option<ClusterId> {
        self.seq_to_cluster.get(&seq).copied()
    }

    pub fn size(&self, cluster: ClusterId) -> Option<usize> {
        self.members.get(&cluster).map(|m| m.len())
    }

    pub fn cluster_count(&self) -> usize {
        self.members.len()
    }

    pub fn sequence_count(&self) -> usize {
        self.seq_to_cluster.len()
    }

    /// All clusters ordered by ID, each with its members in ascending order.
    pub fn sorted_clusters(&self) -> Vec<(ClusterId, Vec<SeqId>)> {
        let mut clusters: Vec<_> = self.members.iter().map(|(&id, members)| {
            let mut members = members.clone();
            members.sort_unstable();
            (id, members)
        }).collect();
        clusters.sort_unstable_by_key(|(id, _)| *id);
        clusters
    }
}


fn unknown_cluster(cluster: ClusterId) -> ClusterError {
    ClusterError::Consistency(format!("cluster {} is not live", cluster))
}


/// Statistics for the raw distances seen so far between two live clusters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThickEdge {
    pub ci: ClusterId,
    pub cj: ClusterId,
    pub pairs: i64,
    pub seen_edges: i64,
    pub seen_distances: i64,
}

impl ThickEdge {
    pub fn new(ci: ClusterId, cj: ClusterId, pairs: i64) -> Self {
        ThickEdge { ci, cj, pairs, seen_edges: 0, seen_distances: 0 }
    }

    pub fn add(&mut self, dist: i32) {
        self.seen_edges += 1;
        self.seen_distances += dist as i64;
    }

    /// Member pairs not yet observed. Duplicate observations can't push this below zero.
    pub fn unseen(&self) -> i64 {
        (self.pairs - self.seen_edges).max(0)
    }

    /// Average distance between the two clusters if every unseen pair had distance x. When
    /// duplicate observations outnumber the member pairs, both bounds are the mean of everything
    /// seen.
    pub fn bound(&self, x: i64) -> i64 {
        if self.seen_edges > self.pairs {
            return self.seen_distances / self.seen_edges;
        }
        (self.seen_distances + x * self.unseen()) / self.pairs
    }

    pub fn is_complete(&self) -> bool {
        self.seen_edges >= self.pairs
    }
}


/// Thick edges addressed by stable integer handles. Freed handles are reused.
#[derive(Default)]
pub struct EdgeArena {
    slots: Vec<Option<ThickEdge>>,
    free: Vec<EdgeHandle>,
    live: usize,
}

impl EdgeArena {
    pub fn insert(&mut self, edge: ThickEdge) -> EdgeHandle {
        self.live += 1;
        if let Some(h) = self.free.pop() {
            self.slots[h] = Some(edge);
            h
        } else {
            self.slots.push(Some(edge));
            self.slots.len() - 1
        }
    }

    pub fn remove(&mut self, handle: EdgeHandle) -> Option<ThickEdge> {
        let edge = self.slots.get_mut(handle)?.take()?;
        self.free.push(handle);
        self.live -= 1;
        Some(edge)
    }

    pub fn get(&self, handle: EdgeHandle) -> Option<&ThickEdge> {
        self.slots.get(handle)?.as_ref()
    }

    pub fn get_mut(&mut self, handle: EdgeHandle) -> Option<&mut ThickEdge> {
        self.slots.get_mut(handle)?.as_mut()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (EdgeHandle, &ThickEdge)> {
        self.slots.iter().enumerate().filter_map(|(h, e)| e.as_ref().map(|e| (h, e)))
    }
}

impl HeapKeys for EdgeArena {
    fn key(&self, item: usize, param: i64) -> i64 {
        self.get(item).map_or(i64::MAX, |e| e.bound(param))
    }
}


/// Notified of every thick edge insertion, removal and statistics change, so a linkage method can
/// keep its own ordering of edges in step with the registry.
pub trait EdgeIndex {
    fn inserted(&mut self, handle: EdgeHandle, edges: &EdgeArena);
    fn removed(&mut self, handle: EdgeHandle, edges: &EdgeArena);
    fn changed(&mut self, handle: EdgeHandle, edges: &EdgeArena);
}


pub struct NoIndex;

impl EdgeIndex for NoIndex {
    fn inserted(&mut self, _handle: EdgeHandle, _edges: &EdgeArena) {}
    fn removed(&mut self, _handle: EdgeHandle, _edges: &EdgeArena) {}
    fn changed(&mut self, _handle: EdgeHandle, _edges: &EdgeArena) {}
}


pub struct Registry<I: EdgeIndex = NoIndex> {
    partition: Partition,
    next_id: ClusterId,
    edges: EdgeArena,
    adjacency: FxHashMap<ClusterId, FxHashMap<ClusterId, EdgeHandle>>,
    index: I,
    merge_log: Option<MergeLogWriter>,
    merges: u64,
}

impl Registry<NoIndex> {
    pub fn unindexed() -> Self {
        Registry::new(NoIndex)
    }
}

impl<I: EdgeIndex> Registry<I> {
    pub fn new(index: I) -> Self {
        Registry {
            partition: Partition::new(),
            next_id: 0,
            edges: EdgeArena::default(),
            adjacency: FxHashMap::default(),
            index,
            merge_log: None,
            merges: 0,
        }
    }

    pub fn with_merge_log(mut self, merge_log: MergeLogWriter) -> Self {
        self.merge_log = Some(merge_log);
        self
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn edges(&self) -> &EdgeArena {
        &self.edges
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    /// The index and the arena it orders, borrowed together.
    pub fn index_and_edges(&mut self) -> (&mut I, &EdgeArena) {
        (&mut self.index, &self.edges)
    }

    pub fn merges(&self) -> u64 {
        self.merges
    }

    pub fn get_cluster(&self, seq: SeqId) -> Option<Cluster> {
        let id = self.partition.cluster_of(seq)?;
        self.cluster(id)
    }

    pub fn cluster(&self, id: ClusterId) -> Option<Cluster> {
        self.partition.size(id).map(|size| Cluster { id, size: size as i64 })
    }

    pub fn create_singleton(&mut self, seq: SeqId) -> Result<Cluster> {
        let id = self.next_id;
        self.partition.add_singleton(id, seq)?;
        self.next_id += 1;
        self.log(MergeRecord::Singleton { cluster: id, seq })?;
        Ok(Cluster { id, size: 1 })
    }

    pub fn get_or_create_cluster(&mut self, seq: SeqId) -> Result<Cluster> {
        match self.get_cluster(seq) {
            Some(c) => Ok(c),
            None => self.create_singleton(seq),
        }
    }

    pub fn get_thick_edge(&self, ci: ClusterId, cj: ClusterId) -> Option<EdgeHandle> {
        self.adjacency.get(&ci).and_then(|m| m.get(&cj)).copied()
    }

    pub fn thick_edge(&self, handle: EdgeHandle) -> Option<&ThickEdge> {
        self.edges.get(handle)
    }

    pub fn create_thick_edge(&mut self, ci: ClusterId, cj: ClusterId, first_distance: i32)
            -> Result<EdgeHandle> {
        if ci == cj {
            return Err(ClusterError::Consistency(
                format!("cannot create a thick edge from cluster {} to itself", ci)));
        }
        if self.get_thick_edge(ci, cj).is_some() {
            return Err(ClusterError::Consistency(
                format!("thick edge between {} and {} already exists", ci, cj)));
        }
        let size_i = self.cluster(ci).ok_or_else(|| unknown_cluster(ci))?.size;
        let size_j = self.cluster(cj).ok_or_else(|| unknown_cluster(cj))?.size;
        let mut edge = ThickEdge::new(ci, cj, size_i * size_j);
        edge.add(first_distance);
        Ok(self.install_edge(edge))
    }

    pub fn add_distance(&mut self, handle: EdgeHandle, dist: i32) -> Result<()> {
        let edge = self.edges.get_mut(handle).ok_or_else(|| dead_handle(handle))?;
        edge.add(dist);
        self.index.changed(handle, &self.edges);
        Ok(())
    }

    /// Records one raw distance between two different clusters, creating their thick edge if
    /// needed.
    pub fn observe(&mut self, ci: ClusterId, cj: ClusterId, dist: i32) -> Result<EdgeHandle> {
        match self.get_thick_edge(ci, cj) {
            Some(h) => {
                self.add_distance(h, dist)?;
                Ok(h)
            }
            None => self.create_thick_edge(ci, cj, dist),
        }
    }

    /// Replaces clusters ci and cj with a new cluster. Thick edges to ci and cj are replaced with
    /// edges to the new cluster, and a neighbour joined to both gets one edge with summed stats.
    pub fn merge_cluster(&mut self, ci: ClusterId, cj: ClusterId, dist: i32) -> Result<Cluster> {
        let size_i = self.cluster(ci).ok_or_else(|| unknown_cluster(ci))?.size;
        let size_j = self.cluster(cj).ok_or_else(|| unknown_cluster(cj))?.size;
        let ck = self.next_id;
        self.partition.merge(ci, cj, ck)?;
        self.next_id += 1;
        self.log(MergeRecord::Merge { ci, cj, ck, dist })?;
        let size_k = size_i + size_j;

        if let Some(h) = self.get_thick_edge(ci, cj) {
            self.unlink_edge(h)?;
        }
        let from_i = self.neighbours(ci);
        let from_j = self.neighbours(cj);
        let mut folded = FxHashSet::default();
        for &(cn, hi) in &from_i {
            let mut edge = self.unlink_edge(hi)?;
            if let Some(hj) = self.get_thick_edge(cj, cn) {
                let other = self.unlink_edge(hj)?;
                edge.seen_edges += other.seen_edges;
                edge.seen_distances += other.seen_distances;
                folded.insert(cn);
            }
            self.install_replacement(ck, size_k, cn, &edge)?;
        }
        for &(cn, hj) in &from_j {
            if folded.contains(&cn) { continue; }
            let edge = self.unlink_edge(hj)?;
            self.install_replacement(ck, size_k, cn, &edge)?;
        }
        self.adjacency.remove(&ci);
        self.adjacency.remove(&cj);
        self.merges += 1;
        Ok(Cluster { id: ck, size: size_k })
    }

    fn install_replacement(&mut self, ck: ClusterId, size_k: i64, cn: ClusterId,
                           old: &ThickEdge) -> Result<EdgeHandle> {
        let size_n = self.cluster(cn).ok_or_else(|| unknown_cluster(cn))?.size;
        let mut edge = ThickEdge::new(ck, cn, size_k * size_n);
        edge.seen_edges = old.seen_edges;
        edge.seen_distances = old.seen_distances;
        Ok(self.install_edge(edge))
    }

    fn neighbours(&self, cluster: ClusterId) -> Vec<(ClusterId, EdgeHandle)> {
        // Sorted so handles are assigned in the same order on every run.
        let mut n: Vec<_> = self.adjacency.get(&cluster)
            .map(|m| m.iter().map(|(&c, &h)| (c, h)).collect())
            .unwrap_or_default();
        n.sort_unstable();
        n
    }

    fn install_edge(&mut self, edge: ThickEdge) -> EdgeHandle {
        let (ci, cj) = (edge.ci, edge.cj);
        let handle = self.edges.insert(edge);
        self.adjacency.entry(ci).or_default().insert(cj, handle);
        self.adjacency.entry(cj).or_default().insert(ci, handle);
        self.index.inserted(handle, &self.edges);
        handle
    }

    fn unlink_edge(&mut self, handle: EdgeHandle) -> Result<ThickEdge> {
        // The index must hear about the removal while the edge is still in the arena.
        self.index.removed(handle, &self.edges);
        let edge = self.edges.remove(handle).ok_or_else(|| dead_handle(handle))?;
        if let Some(m) = self.adjacency.get_mut(&edge.ci) { m.remove(&edge.cj); }
        if let Some(m) = self.adjacency.get_mut(&edge.cj) { m.remove(&edge.ci); }
        Ok(edge)
    }

    fn log(&mut self, record: MergeRecord) -> Result<()> {
        if let Some(log) = &mut self.merge_log {
            log.write(&record)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(log) = &mut self.merge_log {
            log.flush()?;
        }
        Ok(())
    }

    /// Checks that every thick edge joins two live clusters, is reachable from both ends and has
    /// the right pair count.
    pub fn validate(&self) -> Result<()> {
        for (h, edge) in self.edges.iter() {
            let size_i = self.cluster(edge.ci).ok_or_else(|| unknown_cluster(edge.ci))?.size;
            let size_j = self.cluster(edge.cj).ok_or_else(|| unknown_cluster(edge.cj))?.size;
            if edge.pairs != size_i * size_j {
                return Err(ClusterError::Consistency(format!(
                    "thick edge {} has {} pairs but its clusters have {}", h, edge.pairs,
                    size_i * size_j)));
            }
            if self.get_thick_edge(edge.ci, edge.cj) != Some(h) ||
               self.get_thick_edge(edge.cj, edge.ci) != Some(h) {
                return Err(ClusterError::Consistency(format!(
                    "thick edge {} is not linked from both of its clusters", h)));
            }
        }
        let linked: usize = self.adjacency.values().map(|m| m.len()).sum();
        if linked != 2 * self.edges.len() {
            return Err(ClusterError::Consistency(format!(
                "{} adjacency links for {} thick edges", linked, self.edges.len())));
        }
        Ok(())
    }
}


fn dead_handle(handle: EdgeHandle) -> ClusterError {
    ClusterError::Consistency(format!("thick edge handle {} is not live", handle))
}
