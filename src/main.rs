// This is the main file of Otuclust and where execution starts. It mainly handles the CLI and
// then calls into other files to run whichever subcommand the user chose.

// Copyright 2024 Ryan Wick (rrwick@gmail.com)
// https://github.com/rrwick/Autocycler

// This file is part of Otuclust. Otuclust is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. Otuclust is
// distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with Otuclust. If not, see <http://www.gnu.org/licenses/>.

use std::path::PathBuf;
use clap::{Parser, Subcommand, crate_version};

mod cluster;
mod edge;
mod edge_file;
mod error;
mod heap;
mod linkage;
mod log;
mod memory;
mod merge;
mod merge_log;
mod metrics;
mod misc;
mod registry;
mod replay;
mod snapshot;
mod upgma;


use cluster::Method;

#[derive(Parser)]
#[clap(name = "Otuclust",
       version = concat!("v", crate_version!()),
       about = "a tool for clustering sequences into OTUs from a stream of pairwise distances",
       before_help = concat!(r#"       _              _           _   "#, "\n",
                             r#"  ___ | |_ _   _  ___| |_   _ ___| |_ "#, "\n",
                             r#" / _ \| __| | | |/ __| | | | / __| __|"#, "\n",
                             r#"| (_) | |_| |_| | (__| | |_| \__ \ |_ "#, "\n",
                             r#" \___/ \__|\__,_|\___|_|\__,_|___/\__|"#))]
#[command(author, version, long_about = None, disable_help_subcommand = true,
          propagate_version = true)]
#[clap(subcommand_required = true)]
#[clap(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {

    /// cluster sequences from a distance-sorted edge file
    Cluster {
        /// Edge file sorted by distance (required)
        #[clap(short = 'i', long = "dist_file", required = true)]
        dist_file: PathBuf,

        /// Linkage method
        #[clap(short = 'm', long = "method", value_enum, default_value = "upgma")]
        method: Method,

        /// Text file of cluster snapshots (either -o or -l is required)
        #[clap(short = 'o', long = "out_file")]
        out_file: Option<PathBuf>,

        /// Binary merge log (either -o or -l is required)
        #[clap(short = 'l', long = "merges_file")]
        merges_file: Option<PathBuf>,

        /// YAML file of clustering metrics
        #[clap(long = "metrics_file")]
        metrics_file: Option<PathBuf>,

        /// Distance between snapshot cutoffs
        #[clap(long = "step", default_value = "0.01")]
        step: f64,

        /// Largest distance of interest for UPGMA
        #[clap(long = "psi", hide_default_value = true,
               help = "Largest distance of interest for UPGMA [default: largest in file]")]
        psi: Option<f64>,

        /// Fraction of the memory ceiling at which UPGMA stops loading edges
        #[clap(long = "max_mem_ratio", default_value = "0.85")]
        max_mem_ratio: f64,

        /// Memory ceiling in GB
        #[clap(long = "max_memory", hide_default_value = true,
               help = "Memory ceiling in GB [default: total system memory]")]
        max_memory: Option<f64>,

        /// Edges read between memory checks
        #[clap(long = "sample_interval", default_value = "10000")]
        sample_interval: u64,
    },

    /// merge sorted edge files into one
    Merge {
        /// Merged edge file (required)
        #[clap(short = 'o', long = "out_file", required = true)]
        out_file: PathBuf,

        /// Sorted edge files, which are deleted once merged (one or more required)
        #[clap(short = 'i', long = "in_files", required = true, num_args = 1..)]
        in_files: Vec<PathBuf>,

        /// Number of CPU threads
        #[clap(short = 't', long = "threads", default_value = "1")]
        threads: usize,
    },

    /// rebuild cluster snapshots from a merge log
    Replay {
        /// Binary merge log (required)
        #[clap(short = 'l', long = "merges_file", required = true)]
        merges_file: PathBuf,

        /// Text file of cluster snapshots (required)
        #[clap(short = 'o', long = "out_file", required = true)]
        out_file: PathBuf,

        /// Distance between snapshot cutoffs
        #[clap(long = "step", default_value = "0.01")]
        step: f64,
    },
}


fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Cluster { dist_file, method, out_file, merges_file, metrics_file, step,
                                 psi, max_mem_ratio, max_memory, sample_interval }) => {
            cluster::cluster(dist_file, method, out_file, merges_file, metrics_file, step, psi,
                             max_mem_ratio, max_memory, sample_interval);
        },
        Some(Commands::Merge { out_file, in_files, threads }) => {
            merge::merge(out_file, in_files, threads);
        },
        Some(Commands::Replay { merges_file, out_file, step }) => {
            replay::replay(merges_file, out_file, step);
        },
        None => {}
    }
}
