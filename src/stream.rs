//! One continuous line stream over discontiguous BGZF byte ranges.

use bytes::Bytes;
use noodles::bgzf::{self, VirtualPosition};
use noodles::csi::binning_index::index::reference_sequence::bin::Chunk;
use std::io::{self, BufRead, Cursor, Read, Seek};
use std::vec;
use tracing::trace;

/// Which part of the stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// Captured header text, replayed ahead of the body.
    Header,
    Body,
}

#[derive(Debug, Clone, Copy)]
struct Span {
    start: VirtualPosition,
    end: Option<VirtualPosition>,
}

/// Sequential line reader over an ordered list of chunks.
///
/// Chunk boundaries are invisible to callers: lines come out in chunk
/// order, each chunk read from its start until the decompressor reaches its
/// end position.
pub struct BlockStream<R> {
    reader: bgzf::Reader<R>,
    header: Option<Cursor<Bytes>>,
    spans: vec::IntoIter<Span>,
    active: Option<Span>,
}

impl<R> BlockStream<R>
where
    R: Read + Seek,
{
    pub fn new(reader: bgzf::Reader<R>, chunks: &[Chunk]) -> Self {
        let spans: Vec<_> = chunks
            .iter()
            .map(|chunk| Span {
                start: chunk.start(),
                end: Some(chunk.end()),
            })
            .collect();

        Self::from_spans(reader, spans)
    }

    /// Stream everything from `start` to the end of the file.
    pub fn from_position(reader: bgzf::Reader<R>, start: VirtualPosition) -> Self {
        Self::from_spans(reader, vec![Span { start, end: None }])
    }

    fn from_spans(reader: bgzf::Reader<R>, spans: Vec<Span>) -> Self {
        Self {
            reader,
            header: None,
            spans: spans.into_iter(),
            active: None,
        }
    }

    /// Emit `header` before the first body line.
    pub fn with_header(mut self, header: Bytes) -> Self {
        self.header = (!header.is_empty()).then(|| Cursor::new(header));
        self
    }

    /// Read the next line, newline included, into `buf`.
    ///
    /// Returns `None` once every chunk is exhausted.
    pub fn read_line(&mut self, buf: &mut Vec<u8>) -> io::Result<Option<Segment>> {
        buf.clear();

        if let Some(header) = &mut self.header {
            if header.read_until(b'\n', buf)? > 0 {
                return Ok(Some(Segment::Header));
            }
            self.header = None;
        }

        loop {
            let Some(span) = self.active else {
                match self.spans.next() {
                    Some(span) => {
                        if self.reader.virtual_position() != span.start {
                            trace!(
                                start = u64::from(span.start),
                                "seeking to chunk start"
                            );
                            self.reader.seek(span.start)?;
                        }
                        self.active = Some(span);
                        continue;
                    }
                    None => return Ok(None),
                }
            };

            if span
                .end
                .is_some_and(|end| self.reader.virtual_position() >= end)
            {
                self.active = None;
                continue;
            }

            if self.reader.read_until(b'\n', buf)? == 0 {
                self.active = None;
                continue;
            }

            return Ok(Some(Segment::Body));
        }
    }

    pub fn into_inner(self) -> bgzf::Reader<R> {
        self.reader
    }
}
