use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A genomic region in 0-based, half-open coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
}

impl Region {
    pub fn new(chrom: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            chrom: chrom.into(),
            start,
            end,
        }
    }

    /// The whole of a chromosome.
    pub fn whole(chrom: impl Into<String>) -> Self {
        Self::new(chrom, 0, u64::MAX)
    }

    /// Number of bases covered by the region.
    pub fn span(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Displays in the 1-based inclusive form accepted by [`FromStr`].
impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == 0 && self.end == u64::MAX {
            write!(f, "{}", self.chrom)
        } else if self.end == u64::MAX {
            write!(f, "{}:{}", self.chrom, self.start + 1)
        } else {
            write!(f, "{}:{}-{}", self.chrom, self.start + 1, self.end)
        }
    }
}

/// Parses `chrom`, `chrom:start` or `chrom:start-end`.
///
/// Positions are 1-based and inclusive, as on the `tabix` command line, and
/// may contain thousands separators (`chr1:1,000-2,000`).
impl FromStr for Region {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (chrom, range) = match s.rsplit_once(':') {
            Some((chrom, range)) if !range.is_empty() && range_like(range) => (chrom, Some(range)),
            _ => (s, None),
        };

        if chrom.is_empty() {
            return Err(Error::InvalidRegion(format!("missing chromosome in {:?}", s)));
        }

        let Some(range) = range else {
            return Ok(Region::whole(chrom));
        };

        let (start, end) = match range.split_once('-') {
            Some((start, end)) => (parse_position(start, s)?, Some(parse_position(end, s)?)),
            None => (parse_position(range, s)?, None),
        };

        if start == 0 {
            return Err(Error::InvalidRegion(format!(
                "positions are 1-based, got 0 in {:?}",
                s
            )));
        }

        match end {
            Some(end) if end < start => Err(Error::InvalidRegion(format!(
                "end before start in {:?}",
                s
            ))),
            Some(end) => Ok(Region::new(chrom, start - 1, end)),
            None => Ok(Region::new(chrom, start - 1, u64::MAX)),
        }
    }
}

fn range_like(range: &str) -> bool {
    range
        .bytes()
        .all(|b| b.is_ascii_digit() || b == b',' || b == b'-')
}

fn parse_position(text: &str, region: &str) -> Result<u64> {
    let digits: String = text.chars().filter(|&c| c != ',').collect();
    digits
        .parse()
        .map_err(|e| Error::InvalidRegion(format!("bad position {:?} in {:?}: {}", text, region, e)))
}
