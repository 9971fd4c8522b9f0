//! Coordinate index access for tabix (`.tbi`) and CSI (`.csi`) files.
//!
//! Both encodings carry the same tabix header (column layout, comment
//! character, header skip count, reference names) and the same binning
//! scheme, so they are normalized into one [`IndexDescriptor`]. The binning
//! query itself is delegated to noodles.
//!
//! # Example
//!
//! ```no_run
//! use tabixr::index::IndexDescriptor;
//! use tabixr::types::Region;
//!
//! let descriptor = IndexDescriptor::open("calls.vcf.gz")?;
//! let chunks = descriptor.chunks(&Region::new("chr1", 999, 2000))?;
//! # Ok::<(), tabixr::Error>(())
//! ```

mod resolver;

pub use resolver::{LookupError, resolve, toggle_chr_prefix};

use crate::types::Region;
use crate::{Error, Result};
use noodles::core::Position;
use noodles::core::region::Interval;
use noodles::csi::binning_index::BinningIndex;
use noodles::csi::binning_index::index::Header;
use noodles::csi::binning_index::index::header::Format;
use noodles::csi::binning_index::index::header::format::CoordinateSystem;
use noodles::csi::binning_index::index::reference_sequence::bin::Chunk;
use noodles::{csi, tabix};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;

/// On-disk index encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Tabix,
    Csi,
}

impl IndexFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            IndexFormat::Tabix => "tbi",
            IndexFormat::Csi => "csi",
        }
    }
}

/// Kind of data file the index was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Generic,
    Sam,
    Vcf,
}

/// Where the coordinates live in each line. Column indices are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    pub name: usize,
    pub begin: usize,
    /// `None` when the file has no end column; extents then come from the
    /// alleles.
    pub end: Option<usize>,
    pub zero_based: bool,
}

impl ColumnLayout {
    pub fn vcf() -> Self {
        Self {
            name: 0,
            begin: 1,
            end: None,
            zero_based: false,
        }
    }

    pub fn bed() -> Self {
        Self {
            name: 0,
            begin: 1,
            end: Some(2),
            zero_based: true,
        }
    }

    /// True when the end column exists and is not the begin column.
    pub fn has_distinct_end(&self) -> bool {
        self.end.is_some_and(|end| end != self.begin)
    }
}

/// A decoded index, one variant per supported encoding.
#[derive(Debug)]
pub enum Index {
    Tabix(tabix::Index),
    Csi(csi::Index),
}

impl Index {
    pub fn read(path: &Path, format: IndexFormat) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let index = match format {
            IndexFormat::Tabix => tabix::io::Reader::new(reader).read_index().map(Index::Tabix),
            IndexFormat::Csi => csi::io::Reader::new(reader).read_index().map(Index::Csi),
        };

        index.map_err(|e| {
            Error::InvalidIndex(format!(
                "failed to read {} index {}: {}",
                format.extension(),
                path.display(),
                e
            ))
        })
    }

    pub fn format(&self) -> IndexFormat {
        match self {
            Index::Tabix(_) => IndexFormat::Tabix,
            Index::Csi(_) => IndexFormat::Csi,
        }
    }

    pub fn header(&self) -> Option<&Header> {
        match self {
            Index::Tabix(index) => index.header(),
            Index::Csi(index) => index.header(),
        }
    }

    pub fn min_shift(&self) -> u8 {
        match self {
            Index::Tabix(index) => index.min_shift(),
            Index::Csi(index) => index.min_shift(),
        }
    }

    pub fn depth(&self) -> u8 {
        match self {
            Index::Tabix(index) => index.depth(),
            Index::Csi(index) => index.depth(),
        }
    }

    fn query(&self, reference_sequence_id: usize, interval: Interval) -> io::Result<Vec<Chunk>> {
        match self {
            Index::Tabix(index) => index.query(reference_sequence_id, interval),
            Index::Csi(index) => index.query(reference_sequence_id, interval),
        }
    }
}

/// Everything the query engine needs to know about an index, fixed at open
/// time.
#[derive(Debug)]
pub struct IndexDescriptor {
    index: Index,
    path: PathBuf,
    file_format: FileFormat,
    layout: ColumnLayout,
    meta_char: u8,
    skip_lines: u32,
    reference_names: Vec<String>,
}

impl IndexDescriptor {
    /// Find and read the index of `data_path`: `<data_path>.tbi`, falling
    /// back to `<data_path>.csi`.
    pub fn open<P: AsRef<Path>>(data_path: P) -> Result<Self> {
        let data_path = data_path.as_ref();

        for format in [IndexFormat::Tabix, IndexFormat::Csi] {
            let path = PathBuf::from(format!("{}.{}", data_path.display(), format.extension()));
            if path.exists() {
                debug!("reading {} index {}", format.extension(), path.display());
                let index = Index::read(&path, format)?;
                return Self::from_index(index, path);
            }
        }

        Err(Error::IndexNotFound(data_path.display().to_string()))
    }

    pub fn from_index(index: Index, path: PathBuf) -> Result<Self> {
        let header = index.header().ok_or_else(|| {
            Error::InvalidIndex(format!("{} has no tabix header", path.display()))
        })?;

        let (file_format, zero_based) = match header.format() {
            Format::Generic(CoordinateSystem::Bed) => (FileFormat::Generic, true),
            Format::Generic(CoordinateSystem::Gff) => (FileFormat::Generic, false),
            Format::Sam => (FileFormat::Sam, false),
            Format::Vcf => (FileFormat::Vcf, false),
        };

        let layout = ColumnLayout {
            name: header.reference_sequence_name_index(),
            begin: header.start_position_index(),
            end: header.end_position_index(),
            zero_based,
        };

        let reference_names = header
            .reference_sequence_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let meta_char = header.line_comment_prefix();
        let skip_lines = header.line_skip_count();

        Ok(Self {
            file_format,
            layout,
            meta_char,
            skip_lines,
            reference_names,
            path,
            index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index_format(&self) -> IndexFormat {
        self.index.format()
    }

    pub fn file_format(&self) -> FileFormat {
        self.file_format
    }

    pub fn layout(&self) -> ColumnLayout {
        self.layout
    }

    pub fn meta_char(&self) -> u8 {
        self.meta_char
    }

    pub fn skip_lines(&self) -> u32 {
        self.skip_lines
    }

    pub fn reference_names(&self) -> &[String] {
        &self.reference_names
    }

    pub fn min_shift(&self) -> u8 {
        self.index.min_shift()
    }

    /// Largest 1-based position the binning scheme can address.
    pub fn max_position(&self) -> u64 {
        let bits = u32::from(self.index.min_shift()) + 3 * u32::from(self.index.depth());
        1u64.checked_shl(bits).map_or(u64::MAX, |n| n - 1)
    }

    /// Chunks that may hold records overlapping `region`, with the
    /// chromosome-name fallback applied.
    pub fn chunks(&self, region: &Region) -> Result<Vec<Chunk>> {
        let Some((start, end)) = self.bounds(region) else {
            return Ok(Vec::new());
        };

        let chunks = resolve(&region.chrom, |name| {
            let id = self
                .reference_id(name)
                .ok_or(LookupError::UnknownReference)?;
            Ok(self.index.query(id, Interval::from(start..=end))?)
        })?;

        debug!(
            region = %region,
            chunks = chunks.len(),
            "resolved chunks in {}",
            self.path.display()
        );

        Ok(chunks)
    }

    fn reference_id(&self, name: &str) -> Option<usize> {
        self.reference_names.iter().position(|n| n == name)
    }

    /// 1-based closed bounds of a 0-based half-open region, clamped to what
    /// the index can address.
    fn bounds(&self, region: &Region) -> Option<(Position, Position)> {
        let max = self.max_position();
        if region.is_empty() || region.start >= max {
            return None;
        }

        let start = usize::try_from(region.start + 1).ok()?;
        let end = usize::try_from(region.end.min(max)).ok()?;

        Some((Position::try_from(start).ok()?, Position::try_from(end).ok()?))
    }
}
