// This file contains the code for the otuclust cluster subcommand, which reads a distance-sorted
// edge file and clusters its sequences by complete, single or average (UPGMA) linkage.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)
// https://github.com/rrwick/Autocycler

// This file is part of Otuclust. Otuclust is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. Otuclust is
// distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with Otuclust. If not, see <http://www.gnu.org/licenses/>.

use clap::ValueEnum;
use colored::Colorize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::edge::{max_distance, scale_distance, unscale_distance, EdgeReader};
use crate::edge_file::RandomAccessEdgeFile;
use crate::error::{ClusterError, Result};
use crate::linkage::{complete_linkage, single_linkage};
use crate::log::{section_header, explanation};
use crate::memory::{gigabytes_to_bytes, MemoryProbe, ProcessMemory};
use crate::merge_log::MergeLogWriter;
use crate::metrics::ClusteringMetrics;
use crate::misc::{check_if_file_exists, check_if_parent_dir_exists, format_duration,
                  format_float, quit_with_error, spinner};
use crate::registry::{EdgeIndex, Registry};
use crate::snapshot::{format_cutoff, ClusterFileSink, NoSnapshots, SnapshotSink};
use crate::upgma::{upgma_registry, UpgmaConfig, UpgmaEngine, UpgmaReader};


#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Complete,
    Single,
    Upgma,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Method::Complete => write!(f, "complete"),
            Method::Single   => write!(f, "single"),
            Method::Upgma    => write!(f, "upgma"),
        }
    }
}


/// Clustering settings with distances already scaled to integers.
#[derive(Clone, Debug)]
pub struct ClusterSettings {
    pub method: Method,
    pub step: i32,
    pub psi: Option<i32>,
    pub max_mem_ratio: f64,
    pub max_memory: Option<u64>,
    pub sample_interval: u64,
}


#[allow(clippy::too_many_arguments)]
pub fn cluster(dist_file: PathBuf, method: Method, out_file: Option<PathBuf>,
               merges_file: Option<PathBuf>, metrics_file: Option<PathBuf>, step: f64,
               psi: Option<f64>, max_mem_ratio: f64, max_memory: Option<f64>,
               sample_interval: u64) {
    let start_time = Instant::now();
    check_settings(&dist_file, method, &out_file, &merges_file, &metrics_file, step, psi,
                   max_mem_ratio, max_memory, sample_interval);
    starting_message();
    let settings = ClusterSettings {
        method,
        step: scale_distance(step),
        psi: if method == Method::Upgma { Some(resolve_psi(&dist_file, psi)) } else { None },
        max_mem_ratio,
        max_memory: max_memory.map(gigabytes_to_bytes),
        sample_interval,
    };
    print_settings(&dist_file, &out_file, &merges_file, &metrics_file, &settings, psi.is_none(),
                   max_memory);
    let metrics = cluster_file(&dist_file, out_file.as_deref(), merges_file.as_deref(),
                               &settings).unwrap_or_else(|e| {
        quit_with_error(&format!("clustering failed\n{}", e));
    });
    if let Some(metrics_file) = &metrics_file {
        metrics.save_to_yaml(metrics_file).unwrap_or_else(|e| {
            quit_with_error(&format!("failed to write {}\n{}", metrics_file.display(), e));
        });
    }
    finished_message(&out_file, &merges_file, &metrics_file, &metrics, start_time);
}


#[allow(clippy::too_many_arguments)]
fn check_settings(dist_file: &Path, method: Method, out_file: &Option<PathBuf>,
                  merges_file: &Option<PathBuf>, metrics_file: &Option<PathBuf>, step: f64,
                  psi: Option<f64>, max_mem_ratio: f64, max_memory: Option<f64>,
                  sample_interval: u64) {
    check_if_file_exists(dist_file);
    if out_file.is_none() && merges_file.is_none() {
        quit_with_error("at least one of --out_file or --merges_file is required");
    }
    for f in [out_file, merges_file, metrics_file].into_iter().flatten() {
        check_if_parent_dir_exists(f);
        if f.as_path() == dist_file {
            quit_with_error(&format!("{} is both the input and an output", f.display()));
        }
    }
    if scale_distance(step) <= 0 { quit_with_error("--step must be at least 0.0001"); }
    if let Some(psi) = psi {
        if method != Method::Upgma {
            quit_with_error("--psi can only be used with --method upgma");
        }
        if psi < 0.0 { quit_with_error("--psi cannot be negative"); }
    }
    if max_mem_ratio <= 0.0 || max_mem_ratio > 1.0 {
        quit_with_error("--max_mem_ratio must be greater than 0 and no more than 1");
    }
    if let Some(gb) = max_memory {
        if gb <= 0.0 { quit_with_error("--max_memory must be greater than 0"); }
    }
    if sample_interval < 1 { quit_with_error("--sample_interval must be at least 1"); }
}


fn starting_message() {
    section_header("Starting otuclust cluster");
    explanation("This command reads pairwise sequence distances, sorted from closest to most \
                 distant, and clusters the sequences into OTUs. Cluster memberships are written \
                 at each distance cutoff on a fixed grid, and every merge can be logged for later \
                 replay.");
}


#[allow(clippy::too_many_arguments)]
fn print_settings(dist_file: &Path, out_file: &Option<PathBuf>, merges_file: &Option<PathBuf>,
                  metrics_file: &Option<PathBuf>, settings: &ClusterSettings, psi_automatic: bool,
                  max_memory: Option<f64>) {
    eprintln!("Settings:");
    eprintln!("  --dist_file {}", dist_file.display());
    eprintln!("  --method {}", settings.method);
    if let Some(f) = out_file { eprintln!("  --out_file {}", f.display()); }
    if let Some(f) = merges_file { eprintln!("  --merges_file {}", f.display()); }
    if let Some(f) = metrics_file { eprintln!("  --metrics_file {}", f.display()); }
    eprintln!("  --step {}", format_float(unscale_distance(settings.step)));
    if let Some(psi) = settings.psi {
        if psi_automatic {
            eprintln!("  --psi {} (automatically set)", format_float(unscale_distance(psi)));
        } else {
            eprintln!("  --psi {}", format_float(unscale_distance(psi)));
        }
        eprintln!("  --max_mem_ratio {}", format_float(settings.max_mem_ratio));
        match max_memory {
            Some(gb) => eprintln!("  --max_memory {}", format_float(gb)),
            None     => eprintln!("  --max_memory total system memory"),
        }
        eprintln!("  --sample_interval {}", settings.sample_interval);
    }
    eprintln!();
}


fn finished_message(out_file: &Option<PathBuf>, merges_file: &Option<PathBuf>,
                    metrics_file: &Option<PathBuf>, metrics: &ClusteringMetrics,
                    start_time: Instant) {
    section_header("Finished!");
    if metrics.halted {
        eprintln!("{}", "Clustering stopped early: not enough data was available in memory"
                        .red().bold());
        if let Some(cutoff) = metrics.last_safe_cutoff {
            eprintln!("Snapshots are complete up to distance {}", format_float(cutoff));
        }
    } else {
        eprintln!("{}", "Clustering complete".green().bold());
    }
    eprintln!("Sequences: {}", metrics.sequence_count);
    eprintln!("Merges:    {}", metrics.merge_count);
    eprintln!("Clusters:  {}", metrics.final_cluster_count);
    eprintln!();
    if let Some(f) = out_file { eprintln!("Cluster snapshots: {}", f.display()); }
    if let Some(f) = merges_file { eprintln!("Merge log:         {}", f.display()); }
    if let Some(f) = metrics_file { eprintln!("Metrics:           {}", f.display()); }
    eprintln!("Time to run: {}", format_duration(start_time.elapsed()));
    eprintln!();
}


fn resolve_psi(dist_file: &Path, psi: Option<f64>) -> i32 {
    if let Some(psi) = psi {
        return scale_distance(psi);
    }
    let pb = spinner("finding maximum distance...");
    let max_dist = max_distance(dist_file).unwrap_or_else(|e| {
        quit_with_error(&format!("failed to read {}\n{}", dist_file.display(), e));
    });
    pb.finish_and_clear();
    max_dist.unwrap_or(0)
}


/// Clusters an edge file, writing snapshots and the merge log where requested. Running out of
/// memory during UPGMA is not an error: the metrics record where clustering stopped.
pub fn cluster_file(dist_file: &Path, out_file: Option<&Path>, merges_file: Option<&Path>,
                    settings: &ClusterSettings) -> Result<ClusteringMetrics> {
    let probe = ProcessMemory::new(settings.max_memory);
    cluster_file_with_probe(dist_file, out_file, merges_file, settings, probe)
}


pub fn cluster_file_with_probe<P: MemoryProbe>(dist_file: &Path, out_file: Option<&Path>,
                                               merges_file: Option<&Path>,
                                               settings: &ClusterSettings, probe: P)
        -> Result<ClusteringMetrics> {
    let mut sink: Box<dyn SnapshotSink> = match out_file {
        Some(path) => Box::new(ClusterFileSink::create(path)?),
        None => Box::new(NoSnapshots),
    };
    let merge_log = merges_file.map(MergeLogWriter::create).transpose()?;
    let mut metrics = ClusteringMetrics::new(&settings.method.to_string(), settings.step);

    match settings.method {
        Method::Complete | Method::Single => {
            let mut registry = attach_merge_log(Registry::unindexed(), merge_log);
            let mut reader = EdgeReader::open(dist_file)?;
            let summary = if settings.method == Method::Complete {
                complete_linkage(&mut registry, &mut reader, settings.step, sink.as_mut())?
            } else {
                single_linkage(&mut registry, &mut reader, settings.step, sink.as_mut())?
            };
            metrics.add_linkage_summary(&summary);
            metrics.add_registry(&registry);
        }
        Method::Upgma => {
            run_upgma(dist_file, settings, merge_log, probe, sink.as_mut(), &mut metrics)?;
        }
    }
    sink.close()?;
    Ok(metrics)
}


fn attach_merge_log<I: EdgeIndex>(registry: Registry<I>, merge_log: Option<MergeLogWriter>)
        -> Registry<I> {
    match merge_log {
        Some(log) => registry.with_merge_log(log),
        None => registry,
    }
}


fn run_upgma<P: MemoryProbe>(dist_file: &Path, settings: &ClusterSettings,
                             merge_log: Option<MergeLogWriter>, probe: P,
                             sink: &mut dyn SnapshotSink, metrics: &mut ClusteringMetrics)
        -> Result<()> {
    let psi = match settings.psi {
        Some(psi) => psi,
        None => max_distance(dist_file)?.unwrap_or(0),
    };

    // Lookahead tombstones records in place, so it gets a private copy of the edges.
    let work_dir = match dist_file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let working_copy = tempfile::Builder::new().prefix("otuclust_work_")
        .tempfile_in(work_dir)?;
    fs::copy(dist_file, working_copy.path())?;

    let mut config = UpgmaConfig::new(psi, settings.step);
    config.max_memory_ratio = settings.max_mem_ratio;
    config.sample_interval = settings.sample_interval;
    let edge_file = RandomAccessEdgeFile::open(working_copy.path())?;
    let reader = UpgmaReader::new(edge_file, probe, &config);
    let mut engine = UpgmaEngine::new(reader, &config);
    let mut registry = attach_merge_log(upgma_registry(psi), merge_log);

    let result = engine.run(&mut registry, sink);
    metrics.add_upgma_stats(psi, &engine.stats());
    metrics.add_registry(&registry);
    match result {
        Ok(final_cutoff) => {
            metrics.final_cutoff = Some(unscale_distance(final_cutoff));
        }
        Err(ClusterError::InsufficientData { last_safe_cutoff, detail }) => {
            eprintln!();
            eprintln!("{}", format!("Warning: insufficient data to continue past cutoff {}",
                                    format_cutoff(last_safe_cutoff)).red());
            eprintln!("  {}", detail);
            eprintln!();
            metrics.set_halted(last_safe_cutoff, &detail);
        }
        Err(e) => return Err(e),
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::read_to_string;
    use tempfile::tempdir;
    use crate::edge::{write_edges, ThinEdge};
    use crate::merge_log::{MergeLogReader, MergeRecord};
    use crate::tests::ScriptedMemory;

    fn settings(method: Method) -> ClusterSettings {
        ClusterSettings { method, step: 100, psi: None, max_mem_ratio: 0.85, max_memory: None,
                          sample_interval: 1 }
    }

    fn three_sequences() -> Vec<ThinEdge> {
        vec![ThinEdge::new(0, 1, 100), ThinEdge::new(1, 2, 150), ThinEdge::new(0, 2, 200)]
    }

    #[test]
    fn test_method_display() {
        assert_eq!(Method::Complete.to_string(), "complete");
        assert_eq!(Method::Single.to_string(), "single");
        assert_eq!(Method::Upgma.to_string(), "upgma");
    }

    #[test]
    fn test_complete_linkage_files() {
        let dir = tempdir().unwrap();
        let dist_file = dir.path().join("edges.bin");
        let out_file = dir.path().join("clusters.txt");
        let merges_file = dir.path().join("merges.bin");
        write_edges(&three_sequences(), &dist_file).unwrap();
        let metrics = cluster_file(&dist_file, Some(&out_file), Some(&merges_file),
                                   &settings(Method::Complete)).unwrap();
        assert_eq!(metrics.method, "complete");
        assert_eq!(metrics.edges_read, 3);
        assert_eq!(metrics.sequence_count, 3);
        assert_eq!(metrics.merge_count, 2);
        assert_eq!(metrics.final_cluster_count, 1);
        assert_eq!(metrics.snapshot_count, 3);
        assert_eq!(metrics.final_cutoff, Some(0.02));
        assert!(!metrics.halted);

        assert_eq!(read_to_string(&out_file).unwrap(),
                   "distance cutoff:\t0.0\nTotal Clusters:\t2\n1\t1\t0\n2\t1\t1\n\n\
                    distance cutoff:\t0.01\nTotal Clusters:\t2\n1\t2\t0 1\n2\t1\t2\n\n\
                    distance cutoff:\t0.02\nTotal Clusters:\t1\n1\t3\t0 1 2\n\n");

        let mut reader = MergeLogReader::open(&merges_file).unwrap();
        let mut merges = Vec::new();
        while let Some(record) = reader.next_record().unwrap() {
            if let MergeRecord::Merge { dist, .. } = record { merges.push(dist); }
        }
        assert_eq!(merges, vec![100, 200]);
    }

    #[test]
    fn test_single_linkage_without_snapshots() {
        let dir = tempdir().unwrap();
        let dist_file = dir.path().join("edges.bin");
        let merges_file = dir.path().join("merges.bin");
        write_edges(&three_sequences(), &dist_file).unwrap();
        let metrics = cluster_file(&dist_file, None, Some(&merges_file),
                                   &settings(Method::Single)).unwrap();
        assert_eq!(metrics.merge_count, 2);
        assert_eq!(metrics.final_cluster_count, 1);
        assert!(merges_file.exists());
    }

    #[test]
    fn test_upgma_leaves_input_untouched() {
        let dir = tempdir().unwrap();
        let dist_file = dir.path().join("edges.bin");
        let out_file = dir.path().join("clusters.txt");
        let edges = vec![ThinEdge::new(0, 1, 100), ThinEdge::new(2, 3, 200),
                         ThinEdge::new(0, 2, 300), ThinEdge::new(1, 3, 400),
                         ThinEdge::new(0, 3, 500), ThinEdge::new(1, 2, 600)];
        write_edges(&edges, &dist_file).unwrap();
        let before = fs::read(&dist_file).unwrap();
        let metrics = cluster_file_with_probe(&dist_file, Some(&out_file), None,
                                              &settings(Method::Upgma),
                                              ScriptedMemory::new(vec![0.0])).unwrap();
        assert_eq!(fs::read(&dist_file).unwrap(), before);
        assert_eq!(metrics.psi, Some(0.06));
        assert_eq!(metrics.merge_count, 3);
        assert_eq!(metrics.final_cluster_count, 1);
        assert_eq!(metrics.final_cutoff, Some(0.05));
        assert_eq!(metrics.snapshot_count, 4);

        // Only the input and the snapshot file remain: the working copy is gone.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_upgma_halt_is_not_an_error() {
        let dir = tempdir().unwrap();
        let dist_file = dir.path().join("edges.bin");
        let merges_file = dir.path().join("merges.bin");
        write_edges(&[ThinEdge::new(0, 1, 50), ThinEdge::new(2, 3, 60),
                      ThinEdge::new(4, 5, 500)], &dist_file).unwrap();
        let mut settings = settings(Method::Upgma);
        settings.psi = Some(1000);
        let metrics = cluster_file_with_probe(&dist_file, None, Some(&merges_file), &settings,
                                              ScriptedMemory::new(vec![0.0, 0.0, 1.0])).unwrap();
        assert!(metrics.halted);
        assert_eq!(metrics.last_safe_cutoff, Some(0.0));
        assert_eq!(metrics.final_cutoff, None);
        assert_eq!(metrics.merge_count, 2);
        assert_eq!(metrics.lookahead_count, 1);
    }

    #[test]
    fn test_upgma_psi_too_small() {
        let dir = tempdir().unwrap();
        let dist_file = dir.path().join("edges.bin");
        let merges_file = dir.path().join("merges.bin");
        write_edges(&three_sequences(), &dist_file).unwrap();
        let mut settings = settings(Method::Upgma);
        settings.psi = Some(120);
        let result = cluster_file_with_probe(&dist_file, None, Some(&merges_file), &settings,
                                             ScriptedMemory::new(vec![0.0]));
        assert!(matches!(result, Err(ClusterError::MalformedInput(_))));
    }

    #[test]
    #[should_panic(expected = "at least one of --out_file or --merges_file")]
    fn test_check_settings_no_outputs() {
        let dir = tempdir().unwrap();
        let dist_file = dir.path().join("edges.bin");
        fs::write(&dist_file, b"").unwrap();
        check_settings(&dist_file, Method::Complete, &None, &None, &None, 0.01, None, 0.85, None,
                       10000);
    }

    #[test]
    #[should_panic(expected = "--psi can only be used with --method upgma")]
    fn test_check_settings_psi_without_upgma() {
        let dir = tempdir().unwrap();
        let dist_file = dir.path().join("edges.bin");
        fs::write(&dist_file, b"").unwrap();
        let out_file = Some(dir.path().join("clusters.txt"));
        check_settings(&dist_file, Method::Single, &out_file, &None, &None, 0.01, Some(0.2), 0.85,
                       None, 10000);
    }

    #[test]
    #[should_panic(expected = "--max_mem_ratio must be greater than 0")]
    fn test_check_settings_ratio() {
        let dir = tempdir().unwrap();
        let dist_file = dir.path().join("edges.bin");
        fs::write(&dist_file, b"").unwrap();
        let out_file = Some(dir.path().join("clusters.txt"));
        check_settings(&dist_file, Method::Upgma, &out_file, &None, &None, 0.01, None, 1.5, None,
                       10000);
    }

    #[test]
    #[should_panic(expected = "is both the input and an output")]
    fn test_check_settings_overwrite_input() {
        let dir = tempdir().unwrap();
        let dist_file = dir.path().join("edges.bin");
        fs::write(&dist_file, b"").unwrap();
        check_settings(&dist_file, Method::Complete, &Some(dist_file.clone()), &None, &None, 0.01,
                       None, 0.85, None, 10000);
    }
}
