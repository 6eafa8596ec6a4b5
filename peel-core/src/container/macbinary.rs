use crate::container::sit;
use crate::domain::{ExtractedFile, FileMeta, FourCC};
use crate::error::{PeelError, Result};
use crate::util::crc;

const TAG: &str = "MacBinary";

const BLOCK: usize = 128;

/// Receiver-side Finder state, cleared on decode.
const STALE_FLAGS: u16 = (1 << 10) | (1 << 9) | (1 << 8) | (1 << 1) | 1;

const FORK_LIMIT: u32 = 0x7FFF_FFFF;

struct Header<'a> {
    name: &'a [u8],
    file_type: FourCC,
    creator: FourCC,
    finder_flags: u16,
    data_len: u32,
    rsrc_len: u32,
    secondary_len: u16,
}

fn pad_to_block(len: usize) -> usize {
    len.div_ceil(BLOCK) * BLOCK
}

/// Validate the fixed 128-byte header. A CRC match makes it MacBinary II;
/// a failed CRC with byte 82 still zero is accepted as MacBinary I.
fn parse_header(data: &[u8]) -> Option<Header<'_>> {
    if data.len() < BLOCK || data[0] != 0 || data[74] != 0 {
        return None;
    }
    let name_len = usize::from(data[1]);
    if !(1..=63).contains(&name_len) {
        return None;
    }

    let stored = u16::from_be_bytes([data[124], data[125]]);
    if crc::xmodem(&data[..124]) != stored && data[82] != 0 {
        return None;
    }

    Some(Header {
        name: &data[2..2 + name_len],
        file_type: FourCC(u32::from_be_bytes([data[65], data[66], data[67], data[68]])),
        creator: FourCC(u32::from_be_bytes([data[69], data[70], data[71], data[72]])),
        finder_flags: u16::from_be_bytes([data[73], data[101]]),
        data_len: u32::from_be_bytes([data[83], data[84], data[85], data[86]]),
        rsrc_len: u32::from_be_bytes([data[87], data[88], data[89], data[90]]),
        secondary_len: u16::from_be_bytes([data[120], data[121]]),
    })
}

pub fn detect(data: &[u8]) -> bool {
    parse_header(data).is_some()
}

fn read_fork(data: &[u8], start: usize, len: u32) -> Result<(Vec<u8>, usize)> {
    if len > FORK_LIMIT {
        return Err(PeelError::format(TAG, format!("fork length {len} out of range")));
    }
    let len = len as usize;
    let end = start.checked_add(len).filter(|&e| e <= data.len());
    let end = end.ok_or(PeelError::Truncated(TAG))?;
    // padding to the next 128-byte boundary may be absent on the last fork
    let next = (start + pad_to_block(len)).min(data.len());
    Ok((data[start..end].to_vec(), next))
}

pub fn decode_file(data: &[u8]) -> Result<ExtractedFile> {
    let header =
        parse_header(data).ok_or_else(|| PeelError::format(TAG, "not a MacBinary header"))?;

    let mut offset = BLOCK;
    if header.secondary_len != 0 {
        offset += pad_to_block(usize::from(header.secondary_len));
    }
    let (data_fork, offset) = read_fork(data, offset, header.data_len)?;
    let (rsrc_fork, _) = read_fork(data, offset, header.rsrc_len)?;

    let meta = FileMeta::new(
        header.name,
        header.file_type,
        header.creator,
        header.finder_flags & !STALE_FLAGS,
    );
    Ok(ExtractedFile {
        meta,
        data_fork,
        rsrc_fork,
    })
}

/// Wrapper variant. A `.sea.bin` style file keeps its archive in the
/// resource fork, so when the data fork does not open with a StuffIt
/// signature and a resource fork exists, the resource fork is the payload.
pub fn peel_data(data: &[u8]) -> Result<Vec<u8>> {
    let file = decode_file(data)?;
    if !sit::matches_at_start(&file.data_fork) && !file.rsrc_fork.is_empty() {
        Ok(file.rsrc_fork)
    } else {
        Ok(file.data_fork)
    }
}
