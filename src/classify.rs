//! Line-level overlap classification.
//!
//! A line is split into fields once; the same view drives classification
//! and, for overlapping lines, record building.
//!
//! Records whose file has an end column overlap a query `[start, end)` when
//! `pos < end` and `record_end >= start`. Files without an end column (VCF
//! and friends) only encode their extent through the alleles: the reference
//! allele covers `pos..pos + len(REF)`, and symbolic deletions,
//! duplications, inversions and copy-number changes reach to the `END=`
//! value of the annotation column.

use crate::index::ColumnLayout;
use crate::types::Region;
use crate::{Error, Result};
use std::ops::Range;
use tracing::warn;

/// Outcome of testing one line against a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Overlap,
    Skip,
    /// The line starts at or past the region end. Input is coordinate
    /// sorted, so nothing after it can overlap.
    Stop,
}

/// How eagerly a line is tokenized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SplitRule {
    /// Every tab separates a field.
    #[default]
    All,
    /// The first eight VCF columns are split, the INFO column stays one
    /// token, and FORMAT plus every sample column become a single ninth
    /// token.
    Variant,
}

const VARIANT_EAGER_COLUMNS: usize = 8;

/// Symbolic alleles whose extent comes from `END=`.
const STRUCTURAL_PREFIXES: [&[u8]; 4] = [b"<DEL", b"<DUP", b"<INV", b"<CN"];

/// Indexed access to tab-separated fields, borrowed or owned.
pub trait FieldAccess {
    fn field(&self, i: usize) -> Option<&[u8]>;
}

/// Reusable tokenizer; keeps its span buffer across lines.
#[derive(Debug, Default)]
pub struct LineSplitter {
    rule: SplitRule,
    spans: Vec<Range<usize>>,
}

impl LineSplitter {
    pub fn new(rule: SplitRule) -> Self {
        Self {
            rule,
            spans: Vec::new(),
        }
    }

    /// Split `line` (trailing newline tolerated) into fields.
    pub fn split<'a>(&'a mut self, line: &'a [u8]) -> Fields<'a> {
        let line = trim_newline(line);
        split_spans(line, self.rule, &mut self.spans);
        Fields {
            line,
            spans: &self.spans,
        }
    }
}

pub fn trim_newline(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn split_spans(line: &[u8], rule: SplitRule, spans: &mut Vec<Range<usize>>) {
    spans.clear();

    let limit = match rule {
        SplitRule::All => usize::MAX,
        SplitRule::Variant => VARIANT_EAGER_COLUMNS,
    };

    let mut start = 0;
    while let Some(offset) = line[start..].iter().position(|&b| b == b'\t') {
        if spans.len() == limit {
            break;
        }
        spans.push(start..start + offset);
        start += offset + 1;
    }
    spans.push(start..line.len());
}

/// Borrowed view of one line's fields.
#[derive(Debug, Clone, Copy)]
pub struct Fields<'a> {
    line: &'a [u8],
    spans: &'a [Range<usize>],
}

impl<'a> Fields<'a> {
    /// The line without its newline.
    pub fn line(&self) -> &'a [u8] {
        self.line
    }

    pub fn spans(&self) -> &'a [Range<usize>] {
        self.spans
    }

    pub fn get(&self, i: usize) -> Option<&'a [u8]> {
        self.spans.get(i).map(|span| &self.line[span.clone()])
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.line.is_empty()
    }
}

impl FieldAccess for Fields<'_> {
    fn field(&self, i: usize) -> Option<&[u8]> {
        self.get(i)
    }
}

/// Columns holding the alleles, for files without an end column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlleleColumns {
    pub reference: usize,
    pub alternate: usize,
    /// Semicolon-delimited `key=value` annotations, searched for `END=`.
    pub info: Option<usize>,
}

impl AlleleColumns {
    pub const VCF: AlleleColumns = AlleleColumns {
        reference: 3,
        alternate: 4,
        info: Some(7),
    };
}

/// Decides OVERLAP / SKIP / STOP for lines of one file.
#[derive(Debug, Clone)]
pub struct Classifier {
    layout: ColumnLayout,
    alleles: Option<AlleleColumns>,
}

impl Classifier {
    /// Without `alleles`, a file lacking an end column is treated as
    /// single-base records.
    pub fn new(layout: ColumnLayout, alleles: Option<AlleleColumns>) -> Self {
        Self { layout, alleles }
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    pub fn chrom<'a, F: FieldAccess + ?Sized>(&self, fields: &'a F) -> Result<&'a [u8]> {
        required(fields, self.layout.name, "name")
    }

    /// 0-based start of the record.
    pub fn position<F: FieldAccess + ?Sized>(&self, fields: &F) -> Result<u64> {
        let begin = parse_u64(required(fields, self.layout.begin, "begin")?, "begin")?;
        if self.layout.zero_based {
            Ok(begin)
        } else {
            Ok(begin.saturating_sub(1))
        }
    }

    /// Exclusive end of the record: the end column when there is one,
    /// otherwise the furthest allele extent.
    pub fn end<F: FieldAccess + ?Sized>(&self, fields: &F, pos: u64) -> Result<u64> {
        match self.layout.end {
            Some(column) => parse_u64(required(fields, column, "end")?, "end"),
            None => self.allele_end(fields, pos),
        }
    }

    pub fn classify<F: FieldAccess + ?Sized>(
        &self,
        fields: &F,
        region: &Region,
    ) -> Result<Classification> {
        let pos = self.position(fields)?;
        if pos >= region.end {
            return Ok(Classification::Stop);
        }

        let overlaps = match self.layout.end {
            Some(column) => parse_u64(required(fields, column, "end")?, "end")? >= region.start,
            None => self.alleles_reach(fields, pos, region.start)?,
        };

        if overlaps {
            Ok(Classification::Overlap)
        } else {
            Ok(Classification::Skip)
        }
    }

    /// True when the record at `pos` extends past `start`, judged by its
    /// alleles alone.
    pub fn alleles_reach<F: FieldAccess + ?Sized>(
        &self,
        fields: &F,
        pos: u64,
        start: u64,
    ) -> Result<bool> {
        let alleles = self.allele_view(fields)?;
        if start < alleles.reference_end(pos)? {
            return Ok(true);
        }

        for extent in alleles.extents(pos) {
            if extent?.is_some_and(|end| end > start) {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn allele_end<F: FieldAccess + ?Sized>(&self, fields: &F, pos: u64) -> Result<u64> {
        let alleles = self.allele_view(fields)?;
        let mut end = alleles.reference_end(pos)?;
        for extent in alleles.extents(pos) {
            if let Some(extent) = extent? {
                end = end.max(extent);
            }
        }
        Ok(end)
    }

    fn allele_view<'a, F: FieldAccess + ?Sized>(&self, fields: &'a F) -> Result<AlleleView<'a>> {
        let chrom = fields.field(self.layout.name).unwrap_or_default();

        let Some(columns) = self.alleles else {
            return Ok(AlleleView {
                chrom,
                reference_len: 1,
                alternates: b"",
                info: None,
            });
        };

        let reference = required(fields, columns.reference, "reference allele")?;
        let alternates = required(fields, columns.alternate, "alternate allele")?;
        let info = columns.info.and_then(|column| fields.field(column));

        Ok(AlleleView {
            chrom,
            reference_len: reference.len() as u64,
            alternates,
            info,
        })
    }
}

struct AlleleView<'a> {
    chrom: &'a [u8],
    reference_len: u64,
    alternates: &'a [u8],
    info: Option<&'a [u8]>,
}

impl<'a> AlleleView<'a> {
    fn reference_end(&self, pos: u64) -> Result<u64> {
        pos.checked_add(self.reference_len).ok_or_else(|| {
            Error::InvalidRecord(format!(
                "{} at {}: reference allele runs past the coordinate range",
                String::from_utf8_lossy(self.chrom),
                pos
            ))
        })
    }

    /// End position reached by each alternate allele; `None` when the
    /// allele carries no extent.
    fn extents(&self, pos: u64) -> impl Iterator<Item = Result<Option<u64>>> + '_ {
        self.alternates
            .split(|&b| b == b',')
            .filter(|allele| !allele.is_empty())
            .map(move |allele| self.extent(pos, allele))
    }

    fn extent(&self, pos: u64, allele: &[u8]) -> Result<Option<u64>> {
        if allele.first() != Some(&b'<') || allele == b"<CN0>" {
            return self.reference_end(pos).map(Some);
        }

        if !STRUCTURAL_PREFIXES
            .iter()
            .any(|prefix| allele.starts_with(prefix))
        {
            return Ok(None);
        }

        match self.info.and_then(info_end) {
            Some(value) => parse_u64(value, "END").map(Some),
            None => {
                warn!(
                    "no END for {} allele at {}:{}",
                    String::from_utf8_lossy(allele),
                    String::from_utf8_lossy(self.chrom),
                    pos + 1
                );
                Ok(None)
            }
        }
    }
}

/// Value of the `END` key in a `;`-delimited annotation field.
pub fn info_end(info: &[u8]) -> Option<&[u8]> {
    info.split(|&b| b == b';')
        .find_map(|entry| entry.strip_prefix(b"END="))
}

fn required<'a, F: FieldAccess + ?Sized>(fields: &'a F, i: usize, column: &str) -> Result<&'a [u8]> {
    fields
        .field(i)
        .ok_or_else(|| Error::missing_column(column, i))
}

pub(crate) fn parse_u64(value: &[u8], column: &str) -> Result<u64> {
    let text = std::str::from_utf8(value).map_err(|e| Error::record(column, value, e))?;
    text.parse().map_err(|e| Error::record(column, value, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_based(end: Option<usize>) -> ColumnLayout {
        ColumnLayout {
            name: 0,
            begin: 1,
            end,
            zero_based: false,
        }
    }

    fn vcf() -> Classifier {
        Classifier::new(ColumnLayout::vcf(), Some(AlleleColumns::VCF))
    }

    fn classify(classifier: &Classifier, line: &str, region: &Region) -> Classification {
        let mut splitter = LineSplitter::new(SplitRule::All);
        let fields = splitter.split(line.as_bytes());
        classifier.classify(&fields, region).unwrap()
    }

    #[test]
    fn test_one_based_begin_is_normalized() {
        let classifier = Classifier::new(one_based(Some(2)), None);
        let mut splitter = LineSplitter::default();
        let fields = splitter.split(b"1\t100\t200");
        assert_eq!(classifier.position(&fields).unwrap(), 99);

        let classifier = Classifier::new(ColumnLayout::bed(), None);
        assert_eq!(classifier.position(&fields).unwrap(), 100);
    }

    #[test]
    fn test_explicit_end_scenario() {
        let classifier = Classifier::new(one_based(Some(2)), None);
        let line = "1\t100\t200\tfoo";
        assert_eq!(
            classify(&classifier, line, &Region::new("1", 150, 160)),
            Classification::Overlap
        );

        let mut splitter = LineSplitter::default();
        let fields = splitter.split(line.as_bytes());
        assert_eq!(classifier.position(&fields).unwrap(), 99);
        assert_eq!(classifier.end(&fields, 99).unwrap(), 200);
    }

    #[test]
    fn test_explicit_end_matches_brute_force() {
        let classifier = Classifier::new(ColumnLayout::bed(), None);

        for pos in 0..12u64 {
            for end in pos..14 {
                let line = format!("1\t{}\t{}", pos, end);
                for qstart in 0..14u64 {
                    for qend in qstart + 1..16 {
                        let region = Region::new("1", qstart, qend);
                        let brute = (pos..=end).any(|x| x >= qstart && x < qend);
                        let got = classify(&classifier, &line, &region);
                        assert_eq!(
                            got == Classification::Overlap,
                            brute,
                            "[{}, {}] vs [{}, {})",
                            pos,
                            end,
                            qstart,
                            qend
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_stop_at_region_end() {
        let classifier = Classifier::new(ColumnLayout::bed(), None);
        let region = Region::new("1", 10, 20);
        assert_eq!(classify(&classifier, "1\t20\t30", &region), Classification::Stop);
        assert_eq!(classify(&classifier, "1\t19\t30", &region), Classification::Overlap);
    }

    #[test]
    fn test_no_overlap_after_stop() {
        let classifier = Classifier::new(ColumnLayout::bed(), None);
        let lines: Vec<String> = (0..200u64)
            .map(|i| format!("1\t{}\t{}", i * 10, i * 10 + 35))
            .collect();
        let region = Region::new("1", 400, 700);

        let mut stopped = false;
        let mut overlaps = 0;
        for line in &lines {
            match classify(&classifier, line, &region) {
                Classification::Stop => stopped = true,
                Classification::Overlap => {
                    assert!(!stopped, "overlap after stop: {}", line);
                    overlaps += 1;
                }
                Classification::Skip => {}
            }
        }
        assert!(stopped);
        assert_eq!(overlaps, 33);
    }

    #[test]
    fn test_structural_variant_extent() {
        let classifier = vcf();
        let line = "1\t101\t.\tN\t<DEL>\t.\t.\tSVTYPE=DEL;END=500";
        assert_eq!(
            classify(&classifier, line, &Region::new("1", 450, 460)),
            Classification::Overlap
        );
        assert_eq!(
            classify(&classifier, line, &Region::new("1", 600, 700)),
            Classification::Skip
        );
    }

    #[test]
    fn test_variant_extent_scenario() {
        let classifier = vcf();
        let line = "1\t1000\t.\tA\t<DEL>\t.\t.\tEND=2000";

        let mut splitter = LineSplitter::new(SplitRule::Variant);
        let fields = splitter.split(line.as_bytes());
        assert_eq!(classifier.position(&fields).unwrap(), 999);
        assert_eq!(classifier.end(&fields, 999).unwrap(), 2000);

        assert_eq!(
            classify(&classifier, line, &Region::new("1", 1500, 1600)),
            Classification::Overlap
        );
        assert_eq!(
            classify(&classifier, line, &Region::new("1", 2500, 2600)),
            Classification::Skip
        );
    }

    #[test]
    fn test_reference_span() {
        let classifier = vcf();
        let line = "1\t100\t.\tACGT\tA\t.\t.\t.";
        // pos 99, REF covers 99..103
        assert_eq!(
            classify(&classifier, line, &Region::new("1", 102, 110)),
            Classification::Overlap
        );
        assert_eq!(
            classify(&classifier, line, &Region::new("1", 103, 110)),
            Classification::Skip
        );
        assert_eq!(
            classify(&classifier, line, &Region::new("1", 90, 99)),
            Classification::Stop
        );
    }

    #[test]
    fn test_zero_copy_number_is_literal() {
        let classifier = vcf();
        let line = "1\t100\t.\tT\tC,<CN0>\t.\t.\tEND=900";
        assert_eq!(
            classify(&classifier, line, &Region::new("1", 200, 300)),
            Classification::Skip
        );
    }

    #[test]
    fn test_copy_number_uses_end() {
        let classifier = vcf();
        let line = "1\t100\t.\tT\t<CN3>\t.\t.\tEND=900";
        assert_eq!(
            classify(&classifier, line, &Region::new("1", 200, 300)),
            Classification::Overlap
        );
    }

    #[test]
    fn test_other_symbolic_alleles_have_no_extent() {
        let classifier = vcf();
        let line = "1\t100\t.\tT\t<INS>\t.\t.\tEND=900";
        assert_eq!(
            classify(&classifier, line, &Region::new("1", 200, 300)),
            Classification::Skip
        );
    }

    #[test]
    fn test_missing_end_keeps_evaluating() {
        let classifier = vcf();
        let line = "1\t100\t.\tT\t<DUP:TANDEM>,<INV>\t.\t.\tSVTYPE=DUP";
        assert_eq!(
            classify(&classifier, line, &Region::new("1", 200, 300)),
            Classification::Skip
        );

        let line = "1\t100\t.\tT\t<DUP>,C\t.\t.\t.";
        assert_eq!(
            classify(&classifier, line, &Region::new("1", 99, 300)),
            Classification::Overlap
        );
    }

    #[test]
    fn test_end_key_lookup() {
        assert_eq!(info_end(b"END=5"), Some(&b"5"[..]));
        assert_eq!(info_end(b"SVTYPE=DEL;END=500;SVLEN=-400"), Some(&b"500"[..]));
        assert_eq!(info_end(b"CIEND=-5,5;SVTYPE=DEL"), None);
        assert_eq!(info_end(b"."), None);
    }

    #[test]
    fn test_end_spans_all_alleles() {
        let classifier = vcf();
        let mut splitter = LineSplitter::new(SplitRule::Variant);
        let fields = splitter.split(b"1\t100\t.\tTAA\tT,<DEL>\t.\t.\tEND=150");
        assert_eq!(classifier.end(&fields, 99).unwrap(), 150);

        let fields = splitter.split(b"1\t100\t.\tTAA\tT\t.\t.\t.");
        assert_eq!(classifier.end(&fields, 99).unwrap(), 102);
    }

    #[test]
    fn test_point_records_without_alleles() {
        let classifier = Classifier::new(one_based(None), None);
        assert_eq!(
            classify(&classifier, "1\t100\tx", &Region::new("1", 99, 100)),
            Classification::Overlap
        );
        assert_eq!(
            classify(&classifier, "1\t100\tx", &Region::new("1", 100, 200)),
            Classification::Skip
        );
    }

    #[test]
    fn test_malformed_numbers_are_errors() {
        let bed = Classifier::new(ColumnLayout::bed(), None);
        let mut splitter = LineSplitter::default();
        let region = Region::new("1", 0, 100);

        let fields = splitter.split(b"1\tabc\t20");
        assert!(matches!(bed.classify(&fields, &region), Err(Error::InvalidRecord(_))));

        let fields = splitter.split(b"1\t10\t2O");
        assert!(matches!(bed.classify(&fields, &region), Err(Error::InvalidRecord(_))));

        let fields = splitter.split(b"1");
        assert!(matches!(bed.classify(&fields, &region), Err(Error::InvalidRecord(_))));

        let fields = splitter.split(b"1\t10\t.\tA\t<DEL>\t.\t.\tEND=x");
        let region = Region::new("1", 50, 100);
        assert!(matches!(vcf().classify(&fields, &region), Err(Error::InvalidRecord(_))));
    }

    #[test]
    fn test_begin_at_coordinate_limit_is_an_error() {
        let mut splitter = LineSplitter::default();

        let fields = splitter.split(b"1\t18446744073709551615\t.\tACGT\tA\t.\t.\t.");
        let region = Region::whole("1");
        assert!(matches!(vcf().classify(&fields, &region), Err(Error::InvalidRecord(_))));
        assert!(matches!(vcf().end(&fields, u64::MAX), Err(Error::InvalidRecord(_))));

        let point = Classifier::new(one_based(None), None);
        let fields = splitter.split(b"1\t18446744073709551615\tx");
        assert!(matches!(point.end(&fields, u64::MAX), Err(Error::InvalidRecord(_))));
    }

    #[test]
    fn test_variant_split_rule() {
        let mut splitter = LineSplitter::new(SplitRule::Variant);
        let fields = splitter.split(b"1\t5\t.\tA\tG\t50\tPASS\tDP=3;AF=0.5\tGT:DP\t0/1:3\t1/1:4\r\n");
        assert_eq!(fields.len(), 9);
        assert_eq!(fields.get(7), Some(&b"DP=3;AF=0.5"[..]));
        assert_eq!(fields.get(8), Some(&b"GT:DP\t0/1:3\t1/1:4"[..]));

        let fields = splitter.split(b"1\t5\t.\tA\tG\t50\tPASS\tDP=3");
        assert_eq!(fields.len(), 8);
        assert_eq!(fields.get(7), Some(&b"DP=3"[..]));
    }

    #[test]
    fn test_split_all() {
        let mut splitter = LineSplitter::new(SplitRule::All);
        let fields = splitter.split(b"a\t\tc\n");
        assert_eq!(fields.len(), 3);
        assert_eq!(fields.get(1), Some(&b""[..]));
        assert_eq!(fields.get(2), Some(&b"c"[..]));
        assert_eq!(fields.line(), b"a\t\tc");
    }
}
