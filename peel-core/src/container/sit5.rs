use log::debug;

use crate::codec::{self, Method};
use crate::domain::{ExtractedFile, FileMeta};
use crate::error::{PeelError, Result};
use crate::util::buf::ByteCursor;
use crate::util::crc;

const TAG: &str = "sit5";

const BANNER_HEAD: &[u8; 16] = b"StuffIt (c)1997-";
const BANNER_TAIL: &[u8] = b" Aladdin Systems, Inc., http://www.aladdinsys.com/StuffIt/";
const BANNER_LEN: usize = 80;

const TOP_HEADER_LEN: usize = 100;

const ENTRY_MAGIC: u32 = 0xA5A5_A5A5;
const ENTRY_FIXED_LEN: usize = 48;

const FLAG_ENCRYPTED: u8 = 1 << 5;
const FLAG_FOLDER: u8 = 1 << 6;

const FLAGS2_RSRC_PRESENT: u16 = 1;

/// Entries whose declared size carries this marker are not files at all.
const SKIP_MARKER: u32 = 0xFFFF_FFFF;

const FOLDER_LIMIT: usize = 32;

pub(crate) fn banner_at(data: &[u8], at: usize) -> bool {
    data.len() >= at + BANNER_LEN
        && data[at..at + 16] == *BANNER_HEAD
        && data[at + 20..at + 20 + BANNER_TAIL.len()] == *BANNER_TAIL
}

pub(crate) fn find_banner(data: &[u8]) -> Option<usize> {
    if data.len() < BANNER_LEN {
        return None;
    }
    (0..=data.len() - BANNER_LEN).find(|&i| banner_at(data, i))
}

struct Header1 {
    header_size: usize,
    flags: u8,
    parent_offset: u32,
    data_uncomp: u32,
    data_comp: usize,
    data_crc: u16,
    /// Method byte for files, high byte of the child count for folders.
    byte_46: u8,
    byte_47: u8,
    name: Vec<u8>,
}

fn read_header1(data: &[u8], at: usize) -> Result<Header1> {
    let entry = data.get(at..).ok_or(PeelError::Truncated(TAG))?;
    let mut cur = ByteCursor::new(entry, TAG);
    if cur.read_u32be()? != ENTRY_MAGIC {
        return Err(PeelError::format(TAG, format!("bad entry magic at offset {at}")));
    }
    let version = cur.read_u8()?;
    if version != 1 {
        return Err(PeelError::format(
            TAG,
            format!("unsupported entry version {version}"),
        ));
    }
    cur.skip(1)?;
    let header_size = usize::from(cur.read_u16be()?);
    cur.skip(1)?;
    let flags = cur.read_u8()?;
    cur.skip(16)?; // timestamps and offsets with no bearing on extraction
    let parent_offset = cur.read_u32be()?;
    let name_len = usize::from(cur.read_u16be()?);
    let stored_crc = cur.read_u16be()?;
    let data_uncomp = cur.read_u32be()?;
    let data_comp = cur.read_u32be()? as usize;
    let data_crc = cur.read_u16be()?;
    cur.skip(2)?;
    let byte_46 = cur.read_u8()?;
    let byte_47 = cur.read_u8()?;

    if header_size < ENTRY_FIXED_LEN + name_len {
        return Err(PeelError::format(
            TAG,
            format!("entry header size {header_size} cannot hold the name"),
        ));
    }
    let name = cur.read_slice(name_len)?.to_vec();

    // CRC covers the whole first header with its own field zeroed
    let mut shadow = entry
        .get(..header_size)
        .ok_or(PeelError::Truncated(TAG))?
        .to_vec();
    shadow[32] = 0;
    shadow[33] = 0;
    if crc::arc(&shadow) != stored_crc {
        return Err(PeelError::Crc(TAG, "entry header"));
    }

    Ok(Header1 {
        header_size,
        flags,
        parent_offset,
        data_uncomp,
        data_comp,
        data_crc,
        byte_46,
        byte_47,
        name,
    })
}

struct RsrcBlock {
    uncomp: u32,
    comp: usize,
    crc: u16,
    method: u8,
}

/// StuffIt 5: entries chained by cursor offsets from the top header, each
/// a CRC-checked header pair followed by the resource then data payloads.
pub(crate) fn extract(data: &[u8]) -> Result<Vec<ExtractedFile>> {
    if data.len() < TOP_HEADER_LEN {
        return Err(PeelError::Truncated(TAG));
    }
    let declared = usize::from(u16::from_be_bytes([data[92], data[93]]));
    // the 4-byte field at offset 88 also claims to locate the first
    // entry; the traversal cursor at 94 is the one that holds up
    let mut cursor = u32::from_be_bytes([data[94], data[95], data[96], data[97]]) as usize;
    debug!("sit5: {declared} declared entries, first at {cursor}");

    let mut folders: Vec<(u32, Vec<u8>)> = Vec::new();
    let mut files = Vec::new();

    for _ in 0..declared {
        let h1 = read_header1(data, cursor)?;
        if h1.flags & FLAG_ENCRYPTED != 0 {
            return Err(PeelError::Encrypted(TAG));
        }

        let parent_path = folders
            .iter()
            .find(|(off, _)| *off == h1.parent_offset)
            .map(|(_, p)| p.clone())
            .unwrap_or_default();

        if h1.flags & FLAG_FOLDER != 0 {
            if folders.len() >= FOLDER_LIMIT {
                return Err(PeelError::format(TAG, "too many folders"));
            }
            let _children = u16::from_be_bytes([h1.byte_46, h1.byte_47]);
            let mut path = parent_path;
            path.extend_from_slice(&h1.name);
            path.push(b'/');
            folders.push((cursor as u32, path));
            cursor += h1.header_size;
            continue;
        }

        // second header: Finder metadata and the optional resource block
        let h2_at = cursor + h1.header_size;
        let rest = data.get(h2_at..).ok_or(PeelError::Truncated(TAG))?;
        let mut h2 = ByteCursor::new(rest, TAG);
        let flags2 = h2.read_u16be()?;
        let file_type = h2.read_fourcc()?;
        let creator = h2.read_fourcc()?;
        let finder_flags = h2.read_u16be()?;
        h2.skip(22)?;

        let rsrc_block = if flags2 & FLAGS2_RSRC_PRESENT != 0 {
            let uncomp = h2.read_u32be()?;
            let comp = h2.read_u32be()? as usize;
            let crc = h2.read_u16be()?;
            h2.skip(2)?;
            let method = h2.read_u8()?;
            let password_len = usize::from(h2.read_u8()?);
            h2.skip(password_len)?;
            Some(RsrcBlock {
                uncomp,
                comp,
                crc,
                method,
            })
        } else {
            None
        };

        let payload_at = h2_at + h2.pos();
        let rsrc_comp = rsrc_block.as_ref().map_or(0, |r| r.comp);
        let payload_end = payload_at
            .checked_add(rsrc_comp)
            .and_then(|e| e.checked_add(h1.data_comp))
            .filter(|&e| e <= data.len())
            .ok_or(PeelError::Truncated(TAG))?;
        cursor = payload_end;

        if h1.data_uncomp == SKIP_MARKER {
            continue;
        }

        let rsrc_fork = match &rsrc_block {
            Some(r) => read_fork(
                r.method,
                &data[payload_at..payload_at + r.comp],
                r.uncomp as usize,
                r.crc,
                "resource fork",
            )?,
            None => Vec::new(),
        };
        let data_fork = read_fork(
            h1.byte_46,
            &data[payload_at + rsrc_comp..payload_end],
            h1.data_uncomp as usize,
            h1.data_crc,
            "data fork",
        )?;

        let mut full_name = parent_path;
        full_name.extend_from_slice(&h1.name);
        let file = ExtractedFile {
            meta: FileMeta::new(&full_name, file_type, creator, finder_flags),
            data_fork,
            rsrc_fork,
        };
        if !file.is_empty() {
            files.push(file);
        }
    }
    Ok(files)
}

fn read_fork(
    method_byte: u8,
    src: &[u8],
    uncomp: usize,
    stored_crc: u16,
    what: &'static str,
) -> Result<Vec<u8>> {
    if src.is_empty() && uncomp == 0 {
        return Ok(Vec::new());
    }
    let method = Method::from_id(TAG, method_byte & 0x0F)?;
    let fork = codec::decompress(TAG, method, src, uncomp)?;
    if !method.self_checking() && crc::arc(&fork) != stored_crc {
        return Err(PeelError::Crc(TAG, what));
    }
    Ok(fork)
}
