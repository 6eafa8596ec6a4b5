use log::debug;

use crate::codec::{self, Method};
use crate::container::sit5;
use crate::domain::{ExtractedFile, FileMeta, FourCC};
use crate::error::{PeelError, Result};
use crate::util::buf::ByteCursor;
use crate::util::crc;

const TAG: &str = "sit";

const SIGNATURES: [&[u8; 4]; 9] = [
    b"SIT!", b"ST46", b"ST50", b"ST60", b"ST65", b"STin", b"STi2", b"STi3", b"STi4",
];
const SECONDARY: &[u8; 4] = b"rLau";

const TOP_HEADER_LEN: usize = 22;
const ENTRY_LEN: usize = 112;

const METHOD_FOLDER_START: u8 = 0x20;
const METHOD_FOLDER_END: u8 = 0x21;
const METHOD_ENCRYPTED_BIT: u8 = 0x10;
const METHOD_SKIP_MASK: u8 = 0xE0;

const FOLDER_DEPTH_LIMIT: usize = 10;

fn find_classic(data: &[u8]) -> Option<usize> {
    if data.len() < TOP_HEADER_LEN {
        return None;
    }
    (0..=data.len() - TOP_HEADER_LEN).find(|&i| {
        SIGNATURES.iter().any(|sig| &data[i..i + 4] == *sig) && &data[i + 10..i + 14] == SECONDARY
    })
}

/// Strict start-of-buffer probe used for MacBinary fork selection.
pub(crate) fn matches_at_start(data: &[u8]) -> bool {
    (data.len() >= 14
        && SIGNATURES.iter().any(|sig| data.starts_with(*sig))
        && &data[10..14] == SECONDARY)
        || sit5::banner_at(data, 0)
}

/// Either StuffIt generation, anywhere in the buffer.
pub fn detect(data: &[u8]) -> bool {
    find_classic(data).is_some() || sit5::find_banner(data).is_some()
}

/// Dispatch on whichever signature appears first.
pub fn extract(data: &[u8]) -> Result<Vec<ExtractedFile>> {
    match (find_classic(data), sit5::find_banner(data)) {
        (Some(c), Some(f)) if f < c => sit5::extract(&data[f..]),
        (Some(c), _) => extract_classic(&data[c..]),
        (None, Some(f)) => sit5::extract(&data[f..]),
        (None, None) => Err(PeelError::format(TAG, "no StuffIt signature found")),
    }
}

/// Classic StuffIt: a 22-byte top header followed by fixed 112-byte entry
/// headers in sequence, with folder markers bracketing nested names.
fn extract_classic(data: &[u8]) -> Result<Vec<ExtractedFile>> {
    let mut cur = ByteCursor::new(data, TAG);
    cur.skip(4)?; // signature
    let num_entries = usize::from(cur.read_u16be()?);
    let _total_size = cur.read_u32be()?;
    cur.skip(4)?; // secondary signature
    let _version = cur.read_u8()?;
    cur.skip(7)?;
    debug!("sit: {num_entries} entries");

    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut files = Vec::new();

    for _ in 0..num_entries {
        let hdr = cur.read_slice(ENTRY_LEN)?;
        let stored = u16::from_be_bytes([hdr[110], hdr[111]]);
        if crc::arc(&hdr[..110]) != stored {
            return Err(PeelError::Crc(TAG, "entry header"));
        }

        let rsrc_method = hdr[0];
        let data_method = hdr[1];
        let name_len = usize::from(hdr[2]).min(63);
        let name = &hdr[3..3 + name_len];

        if rsrc_method == METHOD_FOLDER_START {
            if stack.len() >= FOLDER_DEPTH_LIMIT {
                return Err(PeelError::format(TAG, "folder nesting too deep"));
            }
            stack.push(name.to_vec());
            continue;
        }
        if rsrc_method == METHOD_FOLDER_END {
            if stack.pop().is_none() {
                return Err(PeelError::format(TAG, "folder end without start"));
            }
            continue;
        }

        let rsrc_uncomp = u32::from_be_bytes([hdr[84], hdr[85], hdr[86], hdr[87]]) as usize;
        let data_uncomp = u32::from_be_bytes([hdr[88], hdr[89], hdr[90], hdr[91]]) as usize;
        let rsrc_comp = u32::from_be_bytes([hdr[92], hdr[93], hdr[94], hdr[95]]) as usize;
        let data_comp = u32::from_be_bytes([hdr[96], hdr[97], hdr[98], hdr[99]]) as usize;

        // resource fork payload sits right after the header, data fork
        // after it; the cursor advances past both no matter what
        let rsrc_src = cur.read_slice(rsrc_comp)?;
        let data_src = cur.read_slice(data_comp)?;

        if (rsrc_method | data_method) & METHOD_SKIP_MASK != 0 {
            continue;
        }

        let rsrc_crc = u16::from_be_bytes([hdr[100], hdr[101]]);
        let data_crc = u16::from_be_bytes([hdr[102], hdr[103]]);
        let rsrc_fork = read_fork(rsrc_method, rsrc_src, rsrc_uncomp, rsrc_crc, "resource fork")?;
        let data_fork = read_fork(data_method, data_src, data_uncomp, data_crc, "data fork")?;

        let mut full_name = Vec::new();
        for part in &stack {
            full_name.extend_from_slice(part);
            full_name.push(b'/');
        }
        full_name.extend_from_slice(name);

        let file = ExtractedFile {
            meta: FileMeta::new(
                &full_name,
                FourCC(u32::from_be_bytes([hdr[66], hdr[67], hdr[68], hdr[69]])),
                FourCC(u32::from_be_bytes([hdr[70], hdr[71], hdr[72], hdr[73]])),
                u16::from_be_bytes([hdr[74], hdr[75]]),
            ),
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
    if method_byte & METHOD_ENCRYPTED_BIT != 0 {
        return Err(PeelError::Encrypted(TAG));
    }
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
