// This file contains the external merge-sort that turns many sorted edge-partition files into one
// globally sorted edge file, along with the code for the merge subcommand.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)
// https://github.com/rrwick/Autocycler

// This file is part of Otuclust. Otuclust is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. Otuclust is
// distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with Otuclust. If not, see <http://www.gnu.org/licenses/>.

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::fs;
use std::io;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::edge::{check_ascending, EdgeReader, EdgeWriter, ThinEdge, RECORD_SIZE};
use crate::error::{ClusterError, Result};
use crate::log::{section_header, explanation};
use crate::misc::{check_if_file_exists, format_duration, quit_with_error};


pub fn merge(out_file: PathBuf, in_files: Vec<PathBuf>, threads: usize) {
    let start_time = Instant::now();
    check_settings(&out_file, &in_files, threads);
    starting_message();
    print_settings(&out_file, &in_files, threads);
    let edge_count = merge_sorted_files(&in_files, &out_file, threads).unwrap_or_else(|e| {
        quit_with_error(&format!("failed to merge edge files\n{}", e));
    });
    finished_message(&out_file, edge_count, start_time);
}


fn check_settings(out_file: &Path, in_files: &[PathBuf], threads: usize) {
    if in_files.is_empty() { quit_with_error("no input edge files were given"); }
    for f in in_files {
        check_if_file_exists(f);
        if f == out_file {
            quit_with_error(&format!("{} is both an input and the output", f.display()));
        }
    }
    if threads < 1   { quit_with_error("--threads must be at least 1"); }
    if threads > 100 { quit_with_error("--threads cannot be greater than 100"); }
}


fn starting_message() {
    section_header("Starting otuclust merge");
    explanation("This command merges sorted edge-partition files into a single edge file sorted \
                 by distance, ready for clustering. The input files are consumed (deleted) as \
                 they are merged.");
}


fn print_settings(out_file: &Path, in_files: &[PathBuf], threads: usize) {
    eprintln!("Settings:");
    eprintln!("  --out_file {}", out_file.display());
    eprintln!("  --in_files {}", in_files[0].display());
    for f in in_files.iter().skip(1) {
        eprintln!("             {}", f.display());
    }
    eprintln!("  --threads {}", threads);
    eprintln!();
}


fn finished_message(out_file: &Path, edge_count: u64, start_time: Instant) {
    section_header("Finished!");
    eprintln!("Merged edge file: {} ({} edges)", out_file.display(), edge_count);
    eprintln!("Time to run: {}", format_duration(start_time.elapsed()));
    eprintln!();
}


/// Merges sorted edge files into `dest`, deleting the inputs along the way. Files are merged in
/// pairwise rounds, and the merges within one round run in parallel on `threads` workers.
pub fn merge_sorted_files(inputs: &[PathBuf], dest: &Path, threads: usize) -> Result<u64> {
    if inputs.is_empty() {
        return Err(ClusterError::MalformedInput("no edge files to merge".to_string()));
    }
    if dest.exists() {
        fs::remove_file(dest)?;
    }
    let work_dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let pool = ThreadPoolBuilder::new().num_threads(threads.max(1)).build()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    let mut current = inputs.to_vec();
    let mut round = 0;
    while current.len() > 1 {
        round += 1;
        eprintln!("Merge round {}: {} files", round, current.len());
        let merged: Vec<Result<PathBuf>> = pool.install(|| {
            current.par_chunks(2).map(|pair| -> Result<PathBuf> {
                if pair.len() == 1 {
                    return Ok(pair[0].clone());  // odd one out waits for the next round
                }
                let out = temp_merge_path(&work_dir)?;
                merge_two(&pair[0], &pair[1], &out)?;
                fs::remove_file(&pair[0])?;
                fs::remove_file(&pair[1])?;
                Ok(out)
            }).collect()
        });
        current = merged.into_iter().collect::<Result<Vec<_>>>()?;
    }

    let last = &current[0];
    move_file(last, dest)?;
    let edge_count = fs::metadata(dest)?.len() / RECORD_SIZE as u64;
    Ok(edge_count)
}


fn temp_merge_path(dir: &Path) -> Result<PathBuf> {
    let temp = tempfile::Builder::new().prefix("merge_dist_").suffix(".bin").tempfile_in(dir)?;
    let path = temp.into_temp_path().keep().map_err(|e| e.error)?;
    Ok(path)
}


fn move_file(from: &Path, to: &Path) -> Result<()> {
    // Renaming fails across filesystems, in which case we fall back to copy-then-delete.
    if fs::rename(from, to).is_err() {
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    }
    Ok(())
}


/// Merges two sorted edge files into `out`, returning the number of edges written.
pub fn merge_two(a: &Path, b: &Path, out: &Path) -> Result<u64> {
    let mut reader_a = EdgeReader::open(a)?;
    let mut reader_b = EdgeReader::open(b)?;
    let mut writer = EdgeWriter::create(out)?;
    let (mut prev_a, mut prev_b) = (None, None);
    let mut edge_a = next_sorted(&mut reader_a, &mut prev_a, a)?;
    let mut edge_b = next_sorted(&mut reader_b, &mut prev_b, b)?;
    loop {
        match (edge_a, edge_b) {
            (Some(x), Some(y)) => {
                if x.dist <= y.dist {
                    writer.write_edge(&x)?;
                    edge_a = next_sorted(&mut reader_a, &mut prev_a, a)?;
                } else {
                    writer.write_edge(&y)?;
                    edge_b = next_sorted(&mut reader_b, &mut prev_b, b)?;
                }
            }
            (Some(x), None) => {
                writer.write_edge(&x)?;
                edge_a = next_sorted(&mut reader_a, &mut prev_a, a)?;
            }
            (None, Some(y)) => {
                writer.write_edge(&y)?;
                edge_b = next_sorted(&mut reader_b, &mut prev_b, b)?;
            }
            (None, None) => break,
        }
    }
    writer.finish()
}


fn next_sorted<R: Read>(reader: &mut EdgeReader<R>, previous: &mut Option<i32>, source: &Path)
        -> Result<Option<ThinEdge>> {
    let edge = reader.next_edge()?;
    if let Some(e) = &edge {
        check_ascending(*previous, e, &source.display().to_string())?;
        *previous = Some(e.dist);
    }
    Ok(edge)
}
