//! In-memory BGZF fixtures shared by the unit tests.

use noodles::bgzf::{self, VirtualPosition};
use noodles::csi::binning_index::index::reference_sequence::bin::Chunk;
use std::io::{Cursor, Write};

pub(crate) struct BgzfData {
    pub bytes: Vec<u8>,
    /// Start and end virtual position of every line, in write order.
    pub lines: Vec<(VirtualPosition, VirtualPosition)>,
}

/// Compress `blocks`, one BGZF block per inner slice, one line per string.
pub(crate) fn bgzf_blocks(blocks: &[&[&str]]) -> BgzfData {
    let mut writer = bgzf::Writer::new(Vec::new());
    let mut lines = Vec::new();

    for block in blocks {
        for line in block.iter() {
            let start = writer.virtual_position();
            writer.write_all(line.as_bytes()).unwrap();
            writer.write_all(b"\n").unwrap();
            lines.push((start, writer.virtual_position()));
        }
        writer.flush().unwrap();
    }

    BgzfData {
        bytes: writer.finish().unwrap(),
        lines,
    }
}

pub(crate) fn reader(bytes: &[u8]) -> bgzf::Reader<Cursor<Vec<u8>>> {
    bgzf::Reader::new(Cursor::new(bytes.to_vec()))
}

/// Chunk covering lines `first..=last`.
pub(crate) fn chunk(data: &BgzfData, first: usize, last: usize) -> Chunk {
    Chunk::new(data.lines[first].0, data.lines[last].1)
}

/// Chunk covering every line.
pub(crate) fn whole(data: &BgzfData) -> Chunk {
    chunk(data, 0, data.lines.len() - 1)
}
