//! Single-entry cache of built records for dense repeated queries.
//!
//! Consecutive small queries (a variant annotator walking a sorted file) tend
//! to resolve to the very same chunk list. The cache keeps every record of the
//! last such chunk list; a hit re-filters them instead of decompressing and
//! parsing the same blocks again.

use crate::record::Record;
use crate::types::Region;
use noodles::bgzf::VirtualPosition;
use noodles::csi::binning_index::index::reference_sequence::bin::Chunk;
use std::sync::Arc;
use tracing::debug;

type Key = Vec<(VirtualPosition, VirtualPosition)>;

#[derive(Debug)]
struct CacheEntry {
    key: Key,
    /// `None` when the chunk list holds a line that fails to build.
    records: Option<Arc<[Record]>>,
}

impl CacheEntry {
    fn matches(&self, chunks: &[Chunk]) -> bool {
        self.key.len() == chunks.len()
            && self
                .key
                .iter()
                .zip(chunks)
                .all(|(&(start, end), chunk)| start == chunk.start() && end == chunk.end())
    }
}

#[derive(Debug)]
pub struct BlockCache {
    entry: Option<CacheEntry>,
    threshold: u64,
}

impl BlockCache {
    /// Queries narrower than `threshold` bases use the cache.
    pub fn new(threshold: u64) -> Self {
        Self {
            entry: None,
            threshold,
        }
    }

    /// Default threshold: half of the index's smallest bin.
    pub fn default_threshold(min_shift: u8) -> u64 {
        (1u64 << min_shift) / 2
    }

    pub fn is_dense(&self, region: &Region) -> bool {
        region.span() < self.threshold
    }

    /// Records for exactly this chunk list, if cached.
    pub fn get(&self, chunks: &[Chunk]) -> Option<Arc<[Record]>> {
        self.entry
            .as_ref()
            .filter(|entry| entry.matches(chunks))
            .and_then(|entry| entry.records.clone())
    }

    /// True when this exact chunk list already failed to build.
    pub fn is_uncacheable(&self, chunks: &[Chunk]) -> bool {
        self.entry
            .as_ref()
            .is_some_and(|entry| entry.records.is_none() && entry.matches(chunks))
    }

    /// Replace the entry.
    pub fn insert(&mut self, chunks: &[Chunk], records: Vec<Record>) -> Arc<[Record]> {
        let records: Arc<[Record]> = records.into();
        debug!(
            chunks = chunks.len(),
            records = records.len(),
            "populated block cache"
        );

        self.entry = Some(CacheEntry {
            key: key(chunks),
            records: Some(Arc::clone(&records)),
        });
        records
    }

    /// Drop the entry and remember that `chunks` cannot be cached.
    pub fn mark_uncacheable(&mut self, chunks: &[Chunk]) {
        self.entry = Some(CacheEntry {
            key: key(chunks),
            records: None,
        });
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }

    /// True when no records are held.
    pub fn is_empty(&self) -> bool {
        self.entry
            .as_ref()
            .is_none_or(|entry| entry.records.is_none())
    }
}

fn key(chunks: &[Chunk]) -> Key {
    chunks
        .iter()
        .map(|chunk| (chunk.start(), chunk.end()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Interval, RawFields};
    use crate::classify::LineSplitter;

    fn chunk(start: u64, end: u64) -> Chunk {
        Chunk::new(VirtualPosition::from(start), VirtualPosition::from(end))
    }

    fn record(line: &str) -> Record {
        let mut splitter = LineSplitter::default();
        let fields = RawFields::from_fields(&splitter.split(line.as_bytes()));
        Record::Interval(Interval {
            chrom: "1".to_string(),
            start: 0,
            end: 1,
            fields,
        })
    }

    #[test]
    fn test_default_threshold() {
        assert_eq!(BlockCache::default_threshold(14), 8192);
    }

    #[test]
    fn test_density() {
        let cache = BlockCache::new(100);
        assert!(cache.is_dense(&Region::new("1", 0, 99)));
        assert!(!cache.is_dense(&Region::new("1", 0, 100)));
        assert!(!cache.is_dense(&Region::whole("1")));
    }

    #[test]
    fn test_hit_requires_identical_chunks() {
        let mut cache = BlockCache::new(100);
        let chunks = [chunk(0, 10), chunk(20, 30)];
        assert!(cache.get(&chunks).is_none());

        cache.insert(&chunks, vec![record("1\t0\t1")]);
        assert_eq!(cache.get(&chunks).map(|r| r.len()), Some(1));
        assert!(cache.get(&chunks[..1]).is_none());
        assert!(cache.get(&[chunk(0, 10), chunk(20, 31)]).is_none());
    }

    #[test]
    fn test_insert_replaces() {
        let mut cache = BlockCache::new(100);
        cache.insert(&[chunk(0, 10)], vec![record("a")]);
        cache.insert(&[chunk(10, 20)], vec![record("b"), record("c")]);
        assert!(cache.get(&[chunk(0, 10)]).is_none());
        assert_eq!(cache.get(&[chunk(10, 20)]).map(|r| r.len()), Some(2));

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_uncacheable_chunks() {
        let mut cache = BlockCache::new(100);
        let chunks = [chunk(0, 10)];
        cache.insert(&chunks, vec![record("a")]);

        cache.mark_uncacheable(&chunks);
        assert!(cache.is_empty());
        assert!(cache.get(&chunks).is_none());
        assert!(cache.is_uncacheable(&chunks));
        assert!(!cache.is_uncacheable(&[chunk(0, 11)]));

        cache.insert(&[chunk(0, 11)], vec![record("b")]);
        assert!(!cache.is_uncacheable(&chunks));
        assert!(!cache.is_empty());
    }
}
