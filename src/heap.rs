// This file contains an indexed binary min-heap. It stores integer handles rather than values and
// keeps a handle-to-position array, so an item whose key changes in place can be found and
// re-sifted without a linear scan.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)
// https://github.com/rrwick/Autocycler

// This file is part of Otuclust. Otuclust is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. Otuclust is
// distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with Otuclust. If not, see <http://www.gnu.org/licenses/>.

use crate::error::{ClusterError, Result};


const NOT_IN_HEAP: usize = usize::MAX;


/// Supplies the ordering key for a handle. The heap's parameter is passed through so one store of
/// items can be ordered differently by different heaps.
pub trait HeapKeys {
    fn key(&self, item: usize, param: i64) -> i64;
}


pub struct IndexedHeap {
    nodes: Vec<usize>,
    positions: Vec<usize>,
    param: i64,
}

impl IndexedHeap {
    pub fn new(param: i64) -> Self {
        IndexedHeap { nodes: Vec::new(), positions: Vec::new(), param }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn param(&self) -> i64 {
        self.param
    }

    /// Changing the parameter invalidates the heap order, so rebuild should follow.
    pub fn set_param(&mut self, param: i64) {
        self.param = param;
    }

    pub fn contains(&self, item: usize) -> bool {
        item < self.positions.len() && self.positions[item] != NOT_IN_HEAP
    }

    pub fn insert<K: HeapKeys>(&mut self, item: usize, keys: &K) {
        debug_assert!(!self.contains(item));
        if item >= self.positions.len() {
            self.positions.resize(item + 1, NOT_IN_HEAP);
        }
        self.nodes.push(item);
        let i = self.nodes.len() - 1;
        self.positions[item] = i;
        self.sift_up(i, keys);
    }

    pub fn top(&self) -> Option<usize> {
        self.nodes.first().copied()
    }

    /// The cheaper of the root's two children, which is the second-smallest item overall.
    pub fn second_top<K: HeapKeys>(&self, keys: &K) -> Option<usize> {
        match (self.nodes.get(1), self.nodes.get(2)) {
            (Some(&a), Some(&b)) => Some(if self.less(b, a, keys) { b } else { a }),
            (Some(&a), None) => Some(a),
            _ => None,
        }
    }

    pub fn delete_top<K: HeapKeys>(&mut self, keys: &K) -> Option<usize> {
        let top = self.top()?;
        self.delete(top, keys);
        Some(top)
    }

    /// Removes an item from anywhere in the heap. Returns false if it wasn't there.
    pub fn delete<K: HeapKeys>(&mut self, item: usize, keys: &K) -> bool {
        if !self.contains(item) {
            return false;
        }
        let pos = self.positions[item];
        let last = self.nodes.len() - 1;
        self.swap(pos, last);
        self.nodes.pop();
        self.positions[item] = NOT_IN_HEAP;
        if pos < self.nodes.len() {
            let moved = self.nodes[pos];
            self.changed(moved, keys);
        }
        true
    }

    /// Restores heap order after the key of one item changed.
    pub fn changed<K: HeapKeys>(&mut self, item: usize, keys: &K) {
        if !self.contains(item) {
            return;
        }
        let pos = self.positions[item];
        self.sift_up(pos, keys);
        let pos = self.positions[item];
        self.sift_down(pos, keys);
    }

    /// Full O(n) re-heapify, for when every key changed at once.
    pub fn rebuild<K: HeapKeys>(&mut self, keys: &K) {
        for i in (0..self.nodes.len() / 2).rev() {
            self.sift_down(i, keys);
        }
    }

    pub fn validate<K: HeapKeys>(&self, keys: &K) -> Result<()> {
        for i in 1..self.nodes.len() {
            let parent = (i - 1) / 2;
            if self.less(self.nodes[i], self.nodes[parent], keys) {
                return Err(ClusterError::Consistency(format!(
                    "heap order violated: item {} at {} sorts before its parent {} at {}",
                    self.nodes[i], i, self.nodes[parent], parent)));
            }
        }
        for (i, &item) in self.nodes.iter().enumerate() {
            if self.positions.get(item) != Some(&i) {
                return Err(ClusterError::Consistency(format!(
                    "position of item {} should be {}", item, i)));
            }
        }
        let tracked = self.positions.iter().filter(|&&p| p != NOT_IN_HEAP).count();
        if tracked != self.nodes.len() {
            return Err(ClusterError::Consistency(format!(
                "{} positions tracked for {} heap nodes", tracked, self.nodes.len())));
        }
        Ok(())
    }

    fn less<K: HeapKeys>(&self, a: usize, b: usize, keys: &K) -> bool {
        // Ties go to the lower handle so the order is deterministic.
        (keys.key(a, self.param), a) < (keys.key(b, self.param), b)
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.nodes.swap(a, b);
        self.positions[self.nodes[a]] = a;
        self.positions[self.nodes[b]] = b;
    }

    fn sift_up<K: HeapKeys>(&mut self, mut i: usize, keys: &K) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if !self.less(self.nodes[i], self.nodes[parent], keys) {
                break;
            }
            self.swap(i, parent);
            i = parent;
        }
    }

    fn sift_down<K: HeapKeys>(&mut self, mut i: usize, keys: &K) {
        let len = self.nodes.len();
        loop {
            let left = 2 * i + 1;
            let right = left + 1;
            let mut smallest = i;
            if left < len && self.less(self.nodes[left], self.nodes[smallest], keys) {
                smallest = left;
            }
            if right < len && self.less(self.nodes[right], self.nodes[smallest], keys) {
                smallest = right;
            }
            if smallest == i {
                break;
            }
            self.swap(i, smallest);
            i = smallest;
        }
    }
}
