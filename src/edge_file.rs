// This file contains a buffered random-access cursor over an edge file. On top of sequential
// reading, it can mark and return to a position and overwrite the record it last read, which is
// how consumed edges get tombstoned during lookahead scans.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)
// https://github.com/rrwick/Autocycler

// This file is part of Otuclust. Otuclust is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. Otuclust is
// distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with Otuclust. If not, see <http://www.gnu.org/licenses/>.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::edge::{read_record, ThinEdge, RECORD_SIZE};
use crate::error::{ClusterError, Result};


const DEFAULT_BUFFER_RECORDS: usize = 8192;


pub struct RandomAccessEdgeFile<F: Read + Write + Seek> {
    file: F,
    buffer: Vec<u8>,
    buffer_start: u64,
    buffer_len: usize,
    buffer_pos: usize,
    last_read: Option<u64>,
    mark: Option<u64>,
}

impl RandomAccessEdgeFile<File> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(RandomAccessEdgeFile::new(file))
    }
}

impl<F: Read + Write + Seek> RandomAccessEdgeFile<F> {
    pub fn new(file: F) -> Self {
        RandomAccessEdgeFile::with_capacity(file, DEFAULT_BUFFER_RECORDS)
    }

    pub fn with_capacity(file: F, buffer_records: usize) -> Self {
        RandomAccessEdgeFile {
            file,
            buffer: vec![0u8; buffer_records.max(1) * RECORD_SIZE],
            buffer_start: 0,
            buffer_len: 0,
            buffer_pos: 0,
            last_read: None,
            mark: None,
        }
    }

    /// Byte offset of the next record to be read.
    pub fn position(&self) -> u64 {
        self.buffer_start + self.buffer_pos as u64
    }

    pub fn next_edge(&mut self) -> Result<Option<ThinEdge>> {
        if self.buffer_pos + RECORD_SIZE > self.buffer_len {
            self.refill()?;
            if self.buffer_len == 0 {
                return Ok(None);
            }
            if self.buffer_len < RECORD_SIZE {
                return Err(ClusterError::MalformedInput(
                    format!("truncated edge record at byte {}", self.buffer_start)));
            }
        }
        let offset = self.position();
        let i = self.buffer_pos;
        let edge = ThinEdge::from_bytes(&self.buffer[i..i + RECORD_SIZE]);
        edge.validate()?;
        self.buffer_pos += RECORD_SIZE;
        self.last_read = Some(offset);
        Ok(Some(edge))
    }

    fn refill(&mut self) -> Result<()> {
        let pos = self.position();
        self.file.seek(SeekFrom::Start(pos))?;
        let filled = read_record(&mut self.file, &mut self.buffer)?;
        self.buffer_start = pos;
        self.buffer_len = filled;
        self.buffer_pos = 0;
        Ok(())
    }

    pub fn mark(&mut self) -> Result<()> {
        if let Some(existing) = self.mark {
            return Err(ClusterError::Consistency(
                format!("edge file already marked at byte {}", existing)));
        }
        self.mark = Some(self.position());
        Ok(())
    }

    pub fn reset(&mut self) -> Result<()> {
        let pos = self.mark.take().ok_or_else(|| {
            ClusterError::Consistency("reset called on edge file without a mark".to_string())
        })?;
        let buffer_end = self.buffer_start + self.buffer_len as u64;
        if pos >= self.buffer_start && pos <= buffer_end {
            self.buffer_pos = (pos - self.buffer_start) as usize;
        } else {
            self.buffer_start = pos;
            self.buffer_len = 0;
            self.buffer_pos = 0;
        }
        self.last_read = None;
        Ok(())
    }

    pub fn overwrite_edge(&mut self, edge: &ThinEdge) -> Result<()> {
        let offset = self.last_read.ok_or_else(|| {
            ClusterError::Consistency("overwrite called before any edge was read".to_string())
        })?;
        let bytes = edge.to_bytes();
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&bytes)?;

        // Keep the buffered copy in step with the file.
        let buffer_end = self.buffer_start + self.buffer_len as u64;
        if offset >= self.buffer_start && offset + RECORD_SIZE as u64 <= buffer_end {
            let i = (offset - self.buffer_start) as usize;
            self.buffer[i..i + RECORD_SIZE].copy_from_slice(&bytes);
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> F {
        self.file
    }
}
