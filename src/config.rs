use crate::types::Region;
use clap::Parser;
use std::path::PathBuf;

/// Per-handle tuning for [`TabixReader`](crate::TabixReader).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Keep the records of the last dense query's chunks in memory.
    pub cache: bool,
    /// Queries spanning fewer bases than this are dense. Defaults to half
    /// of the index's smallest bin.
    pub dense_threshold: Option<u64>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            cache: true,
            dense_threshold: None,
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "tabixr")]
#[command(about = "Query bgzipped, tabix- or CSI-indexed text files by region")]
pub struct Config {
    /// Indexed file (.bed.gz, .vcf.gz, ...); the index is <PATH>.tbi or <PATH>.csi
    pub path: PathBuf,

    /// Regions as chrom, chrom:start or chrom:start-end (1-based, inclusive).
    /// Without regions, the whole file is printed.
    pub regions: Vec<Region>,

    /// Print the header lines before the records
    #[arg(short = 'H', long)]
    pub print_header: bool,

    /// Print one JSON object per record
    #[arg(long)]
    pub json: bool,

    /// Disable the block cache for dense queries
    #[arg(long, env = "TABIXR_NO_CACHE", default_value = "false")]
    pub no_cache: bool,

    /// Span below which a query counts as dense
    #[arg(long, env = "TABIXR_DENSE_THRESHOLD")]
    pub dense_threshold: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "warn")]
    pub log_level: String,
}

impl Config {
    pub fn options(&self) -> Options {
        Options {
            cache: !self.no_cache,
            dense_threshold: self.dense_threshold,
        }
    }
}
