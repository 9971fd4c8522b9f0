//! Open handle on an indexed file.

use crate::cache::BlockCache;
use crate::classify::{AlleleColumns, Classifier, trim_newline};
use crate::config::Options;
use crate::index::{FileFormat, IndexDescriptor};
use crate::query::{Query, RawLines, Scanner};
use crate::record::{Mode, RecordBuilder};
use crate::stream::BlockStream;
use crate::types::Region;
use crate::variant::VariantHeader;
use crate::{Error, Result};
use bytes::Bytes;
use noodles::bgzf::{self, VirtualPosition};
use noodles::csi::binning_index::index::reference_sequence::bin::Chunk;
use std::fs::File;
use std::io::{self, BufRead, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

/// Random-access reader over a bgzipped, coordinate-sorted text file and
/// its `.tbi` or `.csi` index.
///
/// `query` opens a fresh file handle per call, so a shared `TabixReader`
/// serves concurrent queries. `query_mut` reuses the handle's own file and
/// so allows one live query at a time.
///
/// ```no_run
/// use tabixr::{Region, TabixReader};
///
/// let reader = TabixReader::open("calls.vcf.gz")?;
/// for record in reader.query(Some(&"chr1:1000-2000".parse::<Region>()?))? {
///     let record = record?;
///     println!("{}\t{}\t{}", record.chrom(), record.start(), record.end());
/// }
/// # Ok::<(), tabixr::Error>(())
/// ```
#[derive(Debug)]
pub struct TabixReader {
    engine: Engine,
    file: File,
}

/// Everything a query reads besides the file itself.
#[derive(Debug)]
struct Engine {
    path: PathBuf,
    descriptor: Arc<IndexDescriptor>,
    header: Bytes,
    data_start: VirtualPosition,
    ref_alt: Option<AlleleColumns>,
    builder: RecordBuilder,
    cache: Option<Mutex<BlockCache>>,
}

impl TabixReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, Options::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, options: Options) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let descriptor = IndexDescriptor::open(&path)?;

        let mut file = File::open(&path)?;
        let (header, data_start) = {
            let mut reader = bgzf::Reader::new(&mut file);
            capture_header(&mut reader, descriptor.meta_char(), descriptor.skip_lines())?
        };

        let is_vcf = descriptor.file_format() == FileFormat::Vcf
            || path.to_string_lossy().ends_with(".vcf.gz");

        let variant_header = if is_vcf && !header.is_empty() {
            let text = std::str::from_utf8(&header)
                .map_err(|e| Error::InvalidHeader(format!("{}: {}", path.display(), e)))?;
            Some(Arc::new(VariantHeader::parse(text)?))
        } else {
            None
        };

        let ref_alt = if is_vcf {
            None
        } else {
            sniff_ref_alt(&header, descriptor.meta_char())
        };

        let alleles = if is_vcf { Some(AlleleColumns::VCF) } else { ref_alt };
        let classifier = Classifier::new(descriptor.layout(), alleles);
        let mode = match (variant_header, ref_alt) {
            (Some(header), _) => Mode::Variant(header),
            (None, Some(columns)) => Mode::RefAlt(columns),
            (None, None) => Mode::Generic,
        };

        let cache = options.cache.then(|| {
            let threshold = options
                .dense_threshold
                .unwrap_or_else(|| BlockCache::default_threshold(descriptor.min_shift()));
            Mutex::new(BlockCache::new(threshold))
        });

        debug!(
            path = %path.display(),
            index = descriptor.index_format().extension(),
            header_bytes = header.len(),
            vcf = is_vcf,
            ref_alt = ref_alt.is_some(),
            cache = cache.is_some(),
            "opened indexed file"
        );

        Ok(Self {
            engine: Engine {
                path,
                descriptor: Arc::new(descriptor),
                header,
                data_start,
                ref_alt,
                builder: RecordBuilder::new(classifier, mode),
                cache,
            },
            file,
        })
    }

    /// Records overlapping `region`, or every record when `region` is
    /// `None`.
    pub fn query(&self, region: Option<&Region>) -> Result<Query<File>> {
        let file = File::open(&self.engine.path)?;
        self.engine.query(bgzf::Reader::new(file), region)
    }

    /// Like [`query`](Self::query), reading through the handle's own file.
    pub fn query_mut(&mut self, region: Option<&Region>) -> Result<Query<&mut File>> {
        let Self { engine, file } = self;
        file.rewind()?;
        engine.query(bgzf::Reader::new(file), region)
    }

    /// Raw text of the lines overlapping `region`, optionally preceded by
    /// the header lines.
    pub fn fetch(&self, region: Option<&Region>, include_header: bool) -> Result<RawLines<File>> {
        let engine = &self.engine;
        let reader = bgzf::Reader::new(File::open(&engine.path)?);

        let stream = match region {
            Some(region) => BlockStream::new(reader, &engine.descriptor.chunks(region)?),
            None => BlockStream::from_position(reader, engine.data_start),
        };
        let stream = if include_header {
            stream.with_header(engine.header.clone())
        } else {
            stream
        };

        Ok(RawLines::new(
            stream,
            region.cloned(),
            engine.builder.classifier().clone(),
            engine.builder.split_rule(),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.engine.path
    }

    /// Header lines captured at open, newlines included.
    pub fn header(&self) -> &[u8] {
        &self.engine.header
    }

    pub fn descriptor(&self) -> &IndexDescriptor {
        &self.engine.descriptor
    }

    /// Reference and alternate allele columns found in the column-name
    /// header line.
    pub fn ref_alt_columns(&self) -> Option<AlleleColumns> {
        self.engine.ref_alt
    }

    pub fn variant_header(&self) -> Option<&VariantHeader> {
        self.engine.builder.variant_header()
    }

    /// Declare an INFO field on the VCF header. A no-op for files without
    /// one.
    pub fn add_annotation_metadata(
        &mut self,
        id: &str,
        number: &str,
        ty: &str,
        description: &str,
    ) -> Result<()> {
        match self.engine.builder.variant_header_mut() {
            Some(header) => header.add_info(id, number, ty, description),
            None => Ok(()),
        }
    }

    /// Declared type of INFO field `id`; empty when unknown.
    pub fn field_type(&self, id: &str) -> String {
        self.variant_header()
            .and_then(|header| header.field_type(id))
            .unwrap_or_default()
    }

    pub fn field_description(&self, id: &str) -> String {
        self.variant_header()
            .and_then(|header| header.field_description(id))
            .unwrap_or_default()
    }

    /// Declared cardinality of INFO field `id`; `.` when unknown.
    pub fn field_number(&self, id: &str) -> String {
        self.variant_header()
            .and_then(|header| header.field_number(id))
            .unwrap_or_else(|| ".".to_string())
    }

    pub fn close(self) -> Result<()> {
        debug!(path = %self.engine.path.display(), "closing");
        Ok(())
    }
}

impl Engine {
    fn query<R>(&self, reader: bgzf::Reader<R>, region: Option<&Region>) -> Result<Query<R>>
    where
        R: Read + Seek,
    {
        let builder = self.builder.clone();

        let Some(region) = region else {
            let stream = BlockStream::from_position(reader, self.data_start);
            return Ok(Query::streaming(stream, None, builder));
        };

        let chunks = self.descriptor.chunks(region)?;
        if chunks.is_empty() {
            return Ok(Query::empty(Some(region.clone()), builder));
        }

        if let Some(cache) = &self.cache {
            let mut cache = cache
                .lock()
                .map_err(|_| Error::Internal("block cache lock poisoned".to_string()))?;
            if cache.is_dense(region) {
                return Ok(self.dense_query(&mut cache, reader, &chunks, region));
            }
        }

        let stream = BlockStream::new(reader, &chunks);
        Ok(Query::streaming(stream, Some(region.clone()), builder))
    }

    fn dense_query<R>(
        &self,
        cache: &mut BlockCache,
        reader: bgzf::Reader<R>,
        chunks: &[Chunk],
        region: &Region,
    ) -> Query<R>
    where
        R: Read + Seek,
    {
        let builder = self.builder.clone();

        if let Some(records) = cache.get(chunks) {
            trace!(region = %region, "block cache hit");
            return Query::cached(records, region.clone(), builder);
        }

        if cache.is_uncacheable(chunks) {
            trace!(region = %region, "chunks known uncacheable, streaming directly");
            return Query::streaming(BlockStream::new(reader, chunks), Some(region.clone()), builder);
        }

        cache.clear();
        let mut scanner = Scanner::new(BlockStream::new(reader, chunks), builder.split_rule());
        match scanner.build_all(&builder) {
            Ok(records) => {
                let records = cache.insert(chunks, records);
                Query::cached(records, region.clone(), builder)
            }
            Err(e) => {
                debug!(region = %region, error = %e, "chunks not cacheable, streaming directly");
                cache.mark_uncacheable(chunks);
                let stream = BlockStream::new(scanner.into_inner(), chunks);
                Query::streaming(stream, Some(region.clone()), builder)
            }
        }
    }
}

/// Read the leading header lines: the first `skip` lines, then every line
/// starting with `meta`. Returns the header and the position of the first
/// data line.
fn capture_header<R: Read>(
    reader: &mut bgzf::Reader<R>,
    meta: u8,
    skip: u32,
) -> io::Result<(Bytes, VirtualPosition)> {
    let mut header = Vec::new();
    let mut line = Vec::new();
    let mut data_start = reader.virtual_position();
    let mut count = 0;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if count >= skip && line.first() != Some(&meta) {
            break;
        }

        header.extend_from_slice(&line);
        data_start = reader.virtual_position();
        count += 1;
    }

    Ok((Bytes::from(header), data_start))
}

/// Find `ref`/`reference` and `alt`/`alternate` in the last header line.
/// Both or neither.
fn sniff_ref_alt(header: &[u8], meta: u8) -> Option<AlleleColumns> {
    let line = header
        .split(|&b| b == b'\n')
        .map(trim_newline)
        .filter(|line| !line.is_empty())
        .last()?;
    let names = match line.iter().position(|&b| b != meta) {
        Some(i) => &line[i..],
        None => return None,
    };

    let mut reference = None;
    let mut alternate = None;
    for (i, name) in names.split(|&b| b == b'\t').enumerate() {
        let name = String::from_utf8_lossy(name).trim().to_ascii_lowercase();
        match name.as_str() {
            "ref" | "reference" if reference.is_none() => reference = Some(i),
            "alt" | "alternate" if alternate.is_none() => alternate = Some(i),
            _ => {}
        }
    }

    Some(AlleleColumns {
        reference: reference?,
        alternate: alternate?,
        info: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{bgzf_blocks, reader};

    #[test]
    fn test_capture_meta_lines() {
        let data = bgzf_blocks(&[&["#a", "#b"], &["1\t2\t3", "#not header"]]);
        let mut reader = reader(&data.bytes);
        let (header, start) = capture_header(&mut reader, b'#', 0).unwrap();
        assert_eq!(&header[..], b"#a\n#b\n");

        let mut stream = BlockStream::from_position(crate::testing::reader(&data.bytes), start);
        let mut line = Vec::new();
        stream.read_line(&mut line).unwrap();
        assert_eq!(line, b"1\t2\t3\n");
    }

    #[test]
    fn test_capture_skip_lines() {
        let data = bgzf_blocks(&[&["track name=x", "#cols", "1\t2\t3"]]);
        let mut reader = reader(&data.bytes);
        let (header, start) = capture_header(&mut reader, b'#', 1).unwrap();
        assert_eq!(&header[..], b"track name=x\n#cols\n");
        assert_eq!(start, data.lines[2].0);
    }

    #[test]
    fn test_capture_without_header() {
        let data = bgzf_blocks(&[&["1\t2\t3"]]);
        let mut reader = reader(&data.bytes);
        let (header, start) = capture_header(&mut reader, b'#', 0).unwrap();
        assert!(header.is_empty());
        assert_eq!(start, data.lines[0].0);
    }

    #[test]
    fn test_capture_header_only() {
        let data = bgzf_blocks(&[&["#only"]]);
        let mut reader = reader(&data.bytes);
        let (header, _) = capture_header(&mut reader, b'#', 0).unwrap();
        assert_eq!(&header[..], b"#only\n");
    }

    #[test]
    fn test_sniff_ref_alt() {
        let header = b"##source=x\n#Chrom\tPos\tREF\tAlternate\tscore\n";
        assert_eq!(
            sniff_ref_alt(header, b'#'),
            Some(AlleleColumns {
                reference: 2,
                alternate: 3,
                info: None,
            })
        );
    }

    #[test]
    fn test_sniff_needs_both_columns() {
        assert_eq!(sniff_ref_alt(b"#chrom\tpos\tref\tscore\n", b'#'), None);
        assert_eq!(sniff_ref_alt(b"#chrom\tstart\tend\n", b'#'), None);
        assert_eq!(sniff_ref_alt(b"", b'#'), None);
    }

    #[test]
    fn test_sniff_ignores_partial_names() {
        assert_eq!(sniff_ref_alt(b"#chrom\tpos\tref_seq\talt_count\n", b'#'), None);
    }

    #[test]
    fn test_reader_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TabixReader>();
    }
}
