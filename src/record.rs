//! Records built from overlapping lines.

use crate::classify::{AlleleColumns, Classifier, FieldAccess, Fields, SplitRule};
use crate::types::Region;
use crate::variant::{Variant, VariantHeader};
use crate::{Error, Result};
use bytes::Bytes;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// Owned copy of a split line. Kept inside every record so a cached record
/// can be classified again without re-reading the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFields {
    line: Bytes,
    spans: Vec<Range<usize>>,
}

impl RawFields {
    pub fn from_fields(fields: &Fields<'_>) -> Self {
        Self {
            line: Bytes::copy_from_slice(fields.line()),
            spans: fields.spans().to_vec(),
        }
    }

    /// The line, newline stripped.
    pub fn line(&self) -> &Bytes {
        &self.line
    }

    pub fn get(&self, i: usize) -> Option<&[u8]> {
        self.spans.get(i).map(|span| &self.line[span.clone()])
    }

    /// Field `i` as UTF-8, lossily converted.
    pub fn get_str(&self, i: usize) -> Option<String> {
        self.get(i)
            .map(|field| String::from_utf8_lossy(field).into_owned())
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.spans.iter().map(|span| &self.line[span.clone()])
    }
}

impl FieldAccess for RawFields {
    fn field(&self, i: usize) -> Option<&[u8]> {
        self.get(i)
    }
}

impl fmt::Display for RawFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.line))
    }
}

/// Generic located record: 0-based start, exclusive end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
    pub fields: RawFields,
}

impl Interval {
    pub fn overlaps(&self, region: &Region) -> bool {
        same_chrom(&self.chrom, &region.chrom) && self.start < region.end && self.end > region.start
    }
}

/// Interval from a file whose header names reference and alternate allele
/// columns.
#[derive(Debug, Clone)]
pub struct RefAltInterval {
    pub interval: Interval,
    /// 0-based column of the reference allele.
    pub reference: usize,
    /// 0-based column of the alternate allele.
    pub alternate: usize,
    /// The file has an end column distinct from its begin column.
    pub has_end: bool,
    classifier: Classifier,
}

impl RefAltInterval {
    pub fn reference_allele(&self) -> Option<&[u8]> {
        self.interval.fields.get(self.reference)
    }

    pub fn alternate_allele(&self) -> Option<&[u8]> {
        self.interval.fields.get(self.alternate)
    }

    /// Half-open interval test when the file has its own end column,
    /// otherwise the allele extents decide.
    pub fn overlaps(&self, region: &Region) -> Result<bool> {
        if self.has_end {
            return Ok(self.interval.overlaps(region));
        }

        if !same_chrom(&self.interval.chrom, &region.chrom) || self.interval.start >= region.end {
            return Ok(false);
        }

        self.classifier
            .alleles_reach(&self.interval.fields, self.interval.start, region.start)
    }
}

/// One overlapping line, materialized.
#[derive(Debug, Clone)]
pub enum Record {
    Interval(Interval),
    RefAlt(RefAltInterval),
    Variant(Variant),
}

impl Record {
    pub fn chrom(&self) -> &str {
        match self {
            Record::Interval(interval) => &interval.chrom,
            Record::RefAlt(record) => &record.interval.chrom,
            Record::Variant(variant) => &variant.chrom,
        }
    }

    /// 0-based start.
    pub fn start(&self) -> u64 {
        match self {
            Record::Interval(interval) => interval.start,
            Record::RefAlt(record) => record.interval.start,
            Record::Variant(variant) => variant.start,
        }
    }

    /// Exclusive end.
    pub fn end(&self) -> u64 {
        match self {
            Record::Interval(interval) => interval.end,
            Record::RefAlt(record) => record.interval.end,
            Record::Variant(variant) => variant.end,
        }
    }

    pub fn fields(&self) -> &RawFields {
        match self {
            Record::Interval(interval) => &interval.fields,
            Record::RefAlt(record) => &record.interval.fields,
            Record::Variant(variant) => &variant.fields,
        }
    }
}

/// What kind of record a file produces.
#[derive(Debug, Clone)]
pub enum Mode {
    Generic,
    RefAlt(AlleleColumns),
    Variant(Arc<VariantHeader>),
}

/// Turns classified lines into records.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    classifier: Classifier,
    mode: Mode,
}

impl RecordBuilder {
    pub fn new(classifier: Classifier, mode: Mode) -> Self {
        Self { classifier, mode }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn variant_header(&self) -> Option<&VariantHeader> {
        match &self.mode {
            Mode::Variant(header) => Some(header),
            Mode::Generic | Mode::RefAlt(_) => None,
        }
    }

    /// Copy-on-write access; records already built keep the old header.
    pub(crate) fn variant_header_mut(&mut self) -> Option<&mut VariantHeader> {
        match &mut self.mode {
            Mode::Variant(header) => Some(Arc::make_mut(header)),
            Mode::Generic | Mode::RefAlt(_) => None,
        }
    }

    pub fn split_rule(&self) -> SplitRule {
        match self.mode {
            Mode::Variant(_) => SplitRule::Variant,
            Mode::Generic | Mode::RefAlt(_) => SplitRule::All,
        }
    }

    pub fn build(&self, fields: &Fields<'_>) -> Result<Record> {
        let raw = RawFields::from_fields(fields);

        match &self.mode {
            Mode::Generic => self.interval(raw).map(Record::Interval),
            Mode::RefAlt(columns) => {
                let interval = self.interval(raw)?;
                Ok(Record::RefAlt(RefAltInterval {
                    interval,
                    reference: columns.reference,
                    alternate: columns.alternate,
                    has_end: self.classifier.layout().has_distinct_end(),
                    classifier: self.classifier.clone(),
                }))
            }
            Mode::Variant(header) => {
                let start = self.classifier.position(&raw)?;
                let end = self.classifier.end(&raw, start)?;
                header.parse_record(raw, start, end).map(Record::Variant)
            }
        }
    }

    fn interval(&self, fields: RawFields) -> Result<Interval> {
        let chrom = self.classifier.chrom(&fields)?;
        let chrom = std::str::from_utf8(chrom)
            .map_err(|e| Error::record("name", chrom, e))?
            .to_string();
        let start = self.classifier.position(&fields)?;
        let end = self.classifier.end(&fields, start)?;

        Ok(Interval {
            chrom,
            start,
            end,
            fields,
        })
    }
}

/// Chromosome names are equal up to a leading `chr`.
fn same_chrom(a: &str, b: &str) -> bool {
    let a = a.strip_prefix("chr").unwrap_or(a);
    let b = b.strip_prefix("chr").unwrap_or(b);
    a == b
}
