//! Lazy iteration over the records of one query.

use crate::classify::{Classification, Classifier, Fields, LineSplitter, SplitRule, trim_newline};
use crate::record::{Record, RecordBuilder};
use crate::stream::{BlockStream, Segment};
use crate::types::Region;
use crate::Result;
use bytes::Bytes;
use noodles::bgzf;
use std::io::{self, Read, Seek};
use std::sync::Arc;

/// Line source shared by the record and raw-text iterators.
pub(crate) struct Scanner<R> {
    stream: BlockStream<R>,
    splitter: LineSplitter,
    buf: Vec<u8>,
}

impl<R> Scanner<R>
where
    R: Read + Seek,
{
    pub(crate) fn new(stream: BlockStream<R>, rule: SplitRule) -> Self {
        Self {
            stream,
            splitter: LineSplitter::new(rule),
            buf: Vec::new(),
        }
    }

    /// Move to the next line, skipping blank body lines.
    pub(crate) fn advance(&mut self) -> io::Result<Option<Segment>> {
        loop {
            match self.stream.read_line(&mut self.buf)? {
                Some(Segment::Body) if trim_newline(&self.buf).is_empty() => continue,
                segment => return Ok(segment),
            }
        }
    }

    pub(crate) fn line(&self) -> &[u8] {
        trim_newline(&self.buf)
    }

    pub(crate) fn fields(&mut self) -> Fields<'_> {
        self.splitter.split(&self.buf)
    }

    /// Build every body line that is left.
    pub(crate) fn build_all(&mut self, builder: &RecordBuilder) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        while let Some(segment) = self.advance()? {
            if segment == Segment::Body {
                records.push(builder.build(&self.fields())?);
            }
        }
        Ok(records)
    }

    pub(crate) fn into_inner(self) -> bgzf::Reader<R> {
        self.stream.into_inner()
    }
}

enum Source<R> {
    Empty,
    Stream(Scanner<R>),
    Cached { records: Arc<[Record]>, next: usize },
}

/// Records overlapping a region, in file order.
///
/// Classification stops at the first line starting at or past the region
/// end; after that, or after the last chunk, the iterator only returns
/// `None`. Malformed lines are yielded as errors and iteration may continue
/// past them.
pub struct Query<R> {
    source: Source<R>,
    region: Option<Region>,
    builder: RecordBuilder,
    done: bool,
}

impl<R> Query<R>
where
    R: Read + Seek,
{
    pub(crate) fn empty(region: Option<Region>, builder: RecordBuilder) -> Self {
        Self::with_source(Source::Empty, region, builder)
    }

    pub(crate) fn streaming(
        stream: BlockStream<R>,
        region: Option<Region>,
        builder: RecordBuilder,
    ) -> Self {
        let scanner = Scanner::new(stream, builder.split_rule());
        Self::with_source(Source::Stream(scanner), region, builder)
    }

    pub(crate) fn cached(records: Arc<[Record]>, region: Region, builder: RecordBuilder) -> Self {
        Self::with_source(Source::Cached { records, next: 0 }, Some(region), builder)
    }

    fn with_source(source: Source<R>, region: Option<Region>, builder: RecordBuilder) -> Self {
        Self {
            source,
            region,
            builder,
            done: false,
        }
    }

    /// The region being queried; `None` for a full scan.
    pub fn region(&self) -> Option<&Region> {
        self.region.as_ref()
    }

    /// True when the records come from the block cache.
    pub fn is_cached(&self) -> bool {
        matches!(self.source, Source::Cached { .. })
    }

    /// Release the underlying reader.
    pub fn close(self) {}

    fn next_streamed(&mut self) -> Option<Result<Record>> {
        let Source::Stream(scanner) = &mut self.source else {
            return None;
        };
        let classifier = self.builder.classifier();

        loop {
            match scanner.advance() {
                Ok(Some(Segment::Body)) => {}
                Ok(Some(Segment::Header)) => continue,
                Ok(None) => return None,
                Err(e) => return Some(Err(e.into())),
            }

            let fields = scanner.fields();
            if let Some(region) = &self.region {
                match classifier.classify(&fields, region) {
                    Ok(Classification::Overlap) => {}
                    Ok(Classification::Skip) => continue,
                    Ok(Classification::Stop) => return None,
                    Err(e) => return Some(Err(e)),
                }
            }

            return Some(self.builder.build(&fields));
        }
    }

    fn next_cached(&mut self) -> Option<Result<Record>> {
        let Source::Cached { records, next } = &mut self.source else {
            return None;
        };
        let region = self.region.as_ref()?;
        let classifier = self.builder.classifier();

        while let Some(record) = records.get(*next) {
            *next += 1;
            match classifier.classify(record.fields(), region) {
                Ok(Classification::Overlap) => return Some(Ok(record.clone())),
                Ok(Classification::Skip) => continue,
                Ok(Classification::Stop) => return None,
                Err(e) => return Some(Err(e)),
            }
        }

        None
    }
}

impl<R> Iterator for Query<R>
where
    R: Read + Seek,
{
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let item = match self.source {
            Source::Empty => None,
            Source::Stream(_) => self.next_streamed(),
            Source::Cached { .. } => self.next_cached(),
        };

        if item.is_none() {
            self.done = true;
        }
        item
    }
}

impl<R> std::iter::FusedIterator for Query<R> where R: Read + Seek {}

/// Raw text of overlapping lines, newline stripped, optionally preceded by
/// the file header.
pub struct RawLines<R> {
    scanner: Option<Scanner<R>>,
    region: Option<Region>,
    classifier: Classifier,
}

impl<R> RawLines<R>
where
    R: Read + Seek,
{
    pub(crate) fn new(
        stream: BlockStream<R>,
        region: Option<Region>,
        classifier: Classifier,
        rule: SplitRule,
    ) -> Self {
        Self {
            scanner: Some(Scanner::new(stream, rule)),
            region,
            classifier,
        }
    }

    fn next_line(&mut self) -> Option<Result<Bytes>> {
        let scanner = self.scanner.as_mut()?;

        loop {
            match scanner.advance() {
                Ok(Some(Segment::Header)) => return Some(Ok(Bytes::copy_from_slice(scanner.line()))),
                Ok(Some(Segment::Body)) => {}
                Ok(None) => return None,
                Err(e) => return Some(Err(e.into())),
            }

            let Some(region) = &self.region else {
                return Some(Ok(Bytes::copy_from_slice(scanner.line())));
            };

            let classification = self.classifier.classify(&scanner.fields(), region);
            match classification {
                Ok(Classification::Overlap) => {
                    return Some(Ok(Bytes::copy_from_slice(scanner.line())));
                }
                Ok(Classification::Skip) => continue,
                Ok(Classification::Stop) => return None,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl<R> Iterator for RawLines<R>
where
    R: Read + Seek,
{
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = self.next_line();
        if line.is_none() {
            self.scanner = None;
        }
        line
    }
}
