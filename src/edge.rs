// This file contains the binary edge format: fixed-width records of two sequence IDs and a scaled
// distance, along with sequential readers and writers for edge files.

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
use std::fs::File;
use std::io;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{ClusterError, Result};


pub type SeqId = i32;
pub type ClusterId = i32;

// Distances are stored as integers: the real distance times this multiplier.
pub const MULTIPLIER: f64 = 10000.0;

pub const RECORD_SIZE: usize = 12;


pub fn scale_distance(distance: f64) -> i32 {
    (distance * MULTIPLIER).round() as i32
}


pub fn unscale_distance(scaled: i32) -> f64 {
    scaled as f64 / MULTIPLIER
}


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThinEdge {
    pub seq_i: SeqId,
    pub seq_j: SeqId,
    pub dist: i32,
}

impl ThinEdge {
    /// Written over records that have already been consumed so later passes skip them.
    pub const TOMBSTONE: ThinEdge = ThinEdge { seq_i: i32::MAX, seq_j: i32::MAX, dist: i32::MAX };

    pub fn new(seq_i: SeqId, seq_j: SeqId, dist: i32) -> Self {
        ThinEdge { seq_i, seq_j, dist }
    }

    pub fn is_tombstone(&self) -> bool {
        *self == ThinEdge::TOMBSTONE
    }

    pub fn is_identity(&self) -> bool {
        self.seq_i == self.seq_j
    }

    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.seq_i.to_be_bytes());
        buf[4..8].copy_from_slice(&self.seq_j.to_be_bytes());
        buf[8..12].copy_from_slice(&self.dist.to_be_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Self {
        let int_at = |i: usize| i32::from_be_bytes([buf[i], buf[i+1], buf[i+2], buf[i+3]]);
        ThinEdge { seq_i: int_at(0), seq_j: int_at(4), dist: int_at(8) }
    }

    pub fn validate(&self) -> Result<()> {
        // Tombstones are the one identity edge allowed in a file.
        if self.is_tombstone() {
            return Ok(());
        }
        if self.is_identity() {
            return Err(ClusterError::MalformedInput(format!("identity edge {}", self)));
        }
        if self.dist < 0 {
            return Err(ClusterError::MalformedInput(format!("negative distance in edge {}",
                                                            self)));
        }
        Ok(())
    }
}

impl fmt::Display for ThinEdge {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {}, {})", self.seq_i, self.seq_j, self.dist)
    }
}


pub fn check_ascending(previous: Option<i32>, edge: &ThinEdge, source: &str) -> Result<()> {
    if let Some(prev) = previous {
        if edge.dist < prev {
            return Err(ClusterError::MalformedInput(
                format!("{} is not sorted: distance {} follows {}", source, edge.dist, prev)));
        }
    }
    Ok(())
}


pub struct EdgeWriter<W: Write> {
    out: W,
    count: u64,
}

impl EdgeWriter<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(EdgeWriter::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> EdgeWriter<W> {
    pub fn new(out: W) -> Self {
        EdgeWriter { out, count: 0 }
    }

    pub fn write_edge(&mut self, edge: &ThinEdge) -> Result<()> {
        if edge.is_identity() {
            return Err(ClusterError::MalformedInput(format!("refusing to write identity edge {}",
                                                            edge)));
        }
        self.out.write_all(&edge.to_bytes())?;
        self.count += 1;
        Ok(())
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn finish(mut self) -> Result<u64> {
        self.out.flush()?;
        Ok(self.count)
    }
}


pub struct EdgeReader<R: Read> {
    input: R,
    count: u64,
}

impl EdgeReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(EdgeReader::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: Read> EdgeReader<R> {
    pub fn new(input: R) -> Self {
        EdgeReader { input, count: 0 }
    }

    /// Returns the next record, or None at a clean end of stream.
    pub fn next_edge(&mut self) -> Result<Option<ThinEdge>> {
        let mut buf = [0u8; RECORD_SIZE];
        let filled = read_record(&mut self.input, &mut buf)?;
        if filled == 0 {
            return Ok(None);
        }
        if filled < RECORD_SIZE {
            return Err(ClusterError::MalformedInput(
                format!("truncated edge record after {} complete records ({} trailing bytes)",
                        self.count, filled)));
        }
        let edge = ThinEdge::from_bytes(&buf);
        edge.validate()?;
        self.count += 1;
        Ok(Some(edge))
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}


pub fn read_record<R: Read>(input: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    // Like read_exact, but reports how many bytes were available so a clean EOF can be told apart
    // from a truncated record.
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}


pub fn write_edges(edges: &[ThinEdge], path: &Path) -> Result<u64> {
    // Checked before anything is created, so a bad edge never leaves a partial file behind.
    if let Some(bad) = edges.iter().find(|e| e.is_identity()) {
        return Err(ClusterError::MalformedInput(format!("refusing to write identity edge {}",
                                                        bad)));
    }
    let mut sorted = edges.to_vec();
    sorted.sort_by_key(|e| e.dist);
    let mut writer = EdgeWriter::create(path)?;
    for edge in &sorted {
        writer.write_edge(edge)?;
    }
    writer.finish()
}


pub fn read_edges(path: &Path) -> Result<Vec<ThinEdge>> {
    let mut reader = EdgeReader::open(path)?;
    let mut edges = Vec::new();
    while let Some(edge) = reader.next_edge()? {
        edges.push(edge);
    }
    Ok(edges)
}


pub fn max_distance(path: &Path) -> Result<Option<i32>> {
    // Used as the default psi when none is given.
    let mut reader = EdgeReader::open(path)?;
    let mut max_dist = None;
    while let Some(edge) = reader.next_edge()? {
        if edge.is_tombstone() { continue; }
        max_dist = Some(max_dist.map_or(edge.dist, |m: i32| m.max(edge.dist)));
    }
    Ok(max_dist)
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_record_layout() {
        let edge = ThinEdge::new(1, 258, 10000);
        assert_eq!(edge.to_bytes(), [0, 0, 0, 1, 0, 0, 1, 2, 0, 0, 39, 16]);
        assert_eq!(ThinEdge::from_bytes(&edge.to_bytes()), edge);
        assert_eq!(ThinEdge::TOMBSTONE.to_bytes(),
                   [127, 255, 255, 255, 127, 255, 255, 255, 127, 255, 255, 255]);
    }

    #[test]
    fn test_scale_distance() {
        assert_eq!(scale_distance(0.0), 0);
        assert_eq!(scale_distance(0.03), 300);
        assert_eq!(scale_distance(0.5), 5000);
        assert_eq!(unscale_distance(250), 0.025);
    }

    #[test]
    fn test_write_edges_sorts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("edges.bin");
        let edges = vec![ThinEdge::new(0, 2, 200), ThinEdge::new(0, 1, 100),
                         ThinEdge::new(1, 2, 150), ThinEdge::new(3, 4, 100)];
        assert_eq!(write_edges(&edges, &path).unwrap(), 4);
        assert_eq!(fs::metadata(&path).unwrap().len(), 48);
        let loaded = read_edges(&path).unwrap();
        let dists: Vec<i32> = loaded.iter().map(|e| e.dist).collect();
        assert_eq!(dists, vec![100, 100, 150, 200]);
        let mut a = edges.clone();
        let mut b = loaded.clone();
        a.sort_by_key(|e| (e.dist, e.seq_i, e.seq_j));
        b.sort_by_key(|e| (e.dist, e.seq_i, e.seq_j));
        assert_eq!(a, b);
    }

    #[test]
    fn test_write_identity_edge_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("edges.bin");
        let edges = vec![ThinEdge::new(0, 1, 100), ThinEdge::new(5, 5, 0)];
        assert!(matches!(write_edges(&edges, &path), Err(ClusterError::MalformedInput(_))));
        assert!(!path.exists());

        let mut writer = EdgeWriter::new(Vec::new());
        assert!(writer.write_edge(&ThinEdge::new(2, 2, 10)).is_err());
        assert_eq!(writer.count(), 0);
    }

    #[test]
    fn test_truncated_record() {
        let mut bytes = ThinEdge::new(0, 1, 5).to_bytes().to_vec();
        bytes.extend_from_slice(&[0, 0, 0, 2, 0]);
        let mut reader = EdgeReader::new(&bytes[..]);
        assert_eq!(reader.next_edge().unwrap(), Some(ThinEdge::new(0, 1, 5)));
        assert!(matches!(reader.next_edge(), Err(ClusterError::MalformedInput(_))));
    }

    #[test]
    fn test_identity_record_on_read() {
        let bytes = ThinEdge::new(4, 4, 5).to_bytes();
        let mut reader = EdgeReader::new(&bytes[..]);
        assert!(matches!(reader.next_edge(), Err(ClusterError::MalformedInput(_))));

        let bytes = ThinEdge::TOMBSTONE.to_bytes();
        let mut reader = EdgeReader::new(&bytes[..]);
        assert!(reader.next_edge().unwrap().unwrap().is_tombstone());
        assert_eq!(reader.next_edge().unwrap(), None);
    }

    #[test]
    fn test_empty_stream() {
        let mut reader = EdgeReader::new(&[0u8; 0][..]);
        assert_eq!(reader.next_edge().unwrap(), None);
        assert_eq!(reader.count(), 0);
    }

    #[test]
    fn test_max_distance() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("edges.bin");
        write_edges(&[ThinEdge::new(0, 1, 30), ThinEdge::new(1, 2, 900),
                      ThinEdge::new(2, 3, 450)], &path).unwrap();
        assert_eq!(max_distance(&path).unwrap(), Some(900));

        let empty = dir.path().join("empty.bin");
        write_edges(&[], &empty).unwrap();
        assert_eq!(max_distance(&empty).unwrap(), None);
    }

    #[test]
    fn test_check_ascending() {
        let edge = ThinEdge::new(0, 1, 10);
        assert!(check_ascending(None, &edge, "x").is_ok());
        assert!(check_ascending(Some(10), &edge, "x").is_ok());
        assert!(check_ascending(Some(11), &edge, "x").is_err());
    }
}
