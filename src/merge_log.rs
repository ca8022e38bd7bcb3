// This file contains the binary merge log: an append-only record of singleton cluster creations
// and cluster merges which can be replayed later to rebuild the clusters at any cutoff.

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
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::edge::{read_record, ClusterId, SeqId};
use crate::error::{ClusterError, Result};


const SINGLETON_TAG: u8 = 1;
const MERGE_TAG: u8 = 0;


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeRecord {
    Singleton { cluster: ClusterId, seq: SeqId },
    Merge { ci: ClusterId, cj: ClusterId, ck: ClusterId, dist: i32 },
}


pub struct MergeLogWriter {
    out: Box<dyn Write>,
    records: u64,
}

impl MergeLogWriter {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(MergeLogWriter::new(Box::new(BufWriter::new(File::create(path)?))))
    }

    pub fn new(out: Box<dyn Write>) -> Self {
        MergeLogWriter { out, records: 0 }
    }

    pub fn write(&mut self, record: &MergeRecord) -> Result<()> {
        match *record {
            MergeRecord::Singleton { cluster, seq } => {
                self.out.write_all(&[SINGLETON_TAG])?;
                self.out.write_all(&cluster.to_be_bytes())?;
                self.out.write_all(&seq.to_be_bytes())?;
            }
            MergeRecord::Merge { ci, cj, ck, dist } => {
                self.out.write_all(&[MERGE_TAG])?;
                for v in [ci, cj, ck, dist] {
                    self.out.write_all(&v.to_be_bytes())?;
                }
            }
        }
        self.records += 1;
        Ok(())
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}


pub struct MergeLogReader<R: Read> {
    input: R,
}

impl MergeLogReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(MergeLogReader::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: Read> MergeLogReader<R> {
    pub fn new(input: R) -> Self {
        MergeLogReader { input }
    }

    pub fn next_record(&mut self) -> Result<Option<MergeRecord>> {
        let mut tag = [0u8; 1];
        if read_record(&mut self.input, &mut tag)? == 0 {
            return Ok(None);
        }
        match tag[0] {
            SINGLETON_TAG => {
                let v = self.read_ints::<2>()?;
                Ok(Some(MergeRecord::Singleton { cluster: v[0], seq: v[1] }))
            }
            MERGE_TAG => {
                let v = self.read_ints::<4>()?;
                Ok(Some(MergeRecord::Merge { ci: v[0], cj: v[1], ck: v[2], dist: v[3] }))
            }
            other => Err(ClusterError::MalformedInput(
                format!("unknown merge log record tag {}", other))),
        }
    }

    fn read_ints<const N: usize>(&mut self) -> Result<[i32; N]> {
        let mut buf = vec![0u8; N * 4];
        if read_record(&mut self.input, &mut buf)? < buf.len() {
            return Err(ClusterError::MalformedInput("truncated merge log record".to_string()));
        }
        let mut values = [0i32; N];
        for (i, v) in values.iter_mut().enumerate() {
            *v = i32::from_be_bytes([buf[i*4], buf[i*4+1], buf[i*4+2], buf[i*4+3]]);
        }
        Ok(values)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::SharedBuffer;

    #[test]
    fn test_byte_layout() {
        let buffer = SharedBuffer::default();
        let mut writer = MergeLogWriter::new(Box::new(buffer.clone()));
        writer.write(&MergeRecord::Singleton { cluster: 1, seq: 7 }).unwrap();
        writer.write(&MergeRecord::Merge { ci: 1, cj: 2, ck: 3, dist: 256 }).unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.records(), 2);
        let bytes = buffer.bytes();
        assert_eq!(bytes, vec![1, 0, 0, 0, 1, 0, 0, 0, 7,
                               0, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 1, 0]);
    }

    #[test]
    fn test_read_back() {
        let buffer = SharedBuffer::default();
        let records = vec![MergeRecord::Singleton { cluster: 0, seq: 10 },
                           MergeRecord::Singleton { cluster: 1, seq: 11 },
                           MergeRecord::Merge { ci: 0, cj: 1, ck: 2, dist: 150 }];
        let mut writer = MergeLogWriter::new(Box::new(buffer.clone()));
        for r in &records { writer.write(r).unwrap(); }
        let bytes = buffer.bytes();
        let mut reader = MergeLogReader::new(&bytes[..]);
        let mut loaded = Vec::new();
        while let Some(r) = reader.next_record().unwrap() {
            loaded.push(r);
        }
        assert_eq!(loaded, records);
    }

    #[test]
    fn test_bad_records() {
        let bytes = [7u8, 0, 0, 0, 0];
        let mut reader = MergeLogReader::new(&bytes[..]);
        assert!(matches!(reader.next_record(), Err(ClusterError::MalformedInput(_))));

        let bytes = [0u8, 0, 0, 0, 1, 0, 0];
        let mut reader = MergeLogReader::new(&bytes[..]);
        assert!(matches!(reader.next_record(), Err(ClusterError::MalformedInput(_))));
    }
}
