use log::debug;

use crate::codec::huffman::Tree;
use crate::domain::{ExtractedFile, FileMeta};
use crate::error::{PeelError, Result};
use crate::util::bits::MsbReader;
use crate::util::buf::ByteCursor;
use crate::util::crc;

const TAG: &str = "cpt";

const FLAG_ENCRYPTED: u16 = 1 << 0;
const FLAG_RSRC_LZH: u16 = 1 << 1;
const FLAG_DATA_LZH: u16 = 1 << 2;

/// Directory offsets beyond this are taken as corruption, not size.
const DIR_OFFSET_LIMIT: u32 = 256 << 20;

const DIR_DEPTH_LIMIT: usize = 32;

fn parse_top(data: &[u8]) -> Result<usize> {
    if data.len() < 8 {
        return Err(PeelError::Truncated(TAG));
    }
    if data[0] != 0x01 {
        return Err(PeelError::format(TAG, "bad magic byte"));
    }
    if data[1] != 0x01 {
        return Err(PeelError::format(TAG, "bad volume number"));
    }
    let offset = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    if offset < 8 || offset > DIR_OFFSET_LIMIT || offset as usize >= data.len() {
        return Err(PeelError::format(
            TAG,
            format!("directory offset {offset} out of bounds"),
        ));
    }
    Ok(offset as usize)
}

pub fn detect(data: &[u8]) -> bool {
    parse_top(data).is_ok()
}

/// The archive must be fully in memory: entry metadata carries absolute
/// fork offsets back into the buffer.
pub fn extract(data: &[u8]) -> Result<Vec<ExtractedFile>> {
    let dir_offset = parse_top(data)?;
    let mut cur = ByteCursor::new(data, TAG);
    cur.seek(dir_offset)?;

    let _dir_crc = cur.read_u32be()?; // directory CRC, not checked here
    let count = usize::from(cur.read_u16be()?);
    let comment_len = usize::from(cur.read_u8()?);
    cur.skip(comment_len)?;
    debug!("cpt: {count} directory entries at offset {dir_offset}");

    let mut files = Vec::new();
    walk(data, &mut cur, count, &[], 0, &mut files)?;
    Ok(files)
}

/// Depth-first over the entry tree. A directory's subtree count covers its
/// children, and the directory itself consumes one more of the parent's
/// budget.
fn walk(
    data: &[u8],
    cur: &mut ByteCursor<'_>,
    count: usize,
    path: &[u8],
    depth: usize,
    out: &mut Vec<ExtractedFile>,
) -> Result<()> {
    if depth > DIR_DEPTH_LIMIT {
        return Err(PeelError::format(TAG, "directory nesting too deep"));
    }
    let mut remaining = count;
    while remaining > 0 {
        let first = cur.read_u8()?;
        let name = cur.read_slice(usize::from(first & 0x7F))?;
        if first & 0x80 != 0 {
            let children = usize::from(cur.read_u16be()?);
            if children + 1 > remaining {
                return Err(PeelError::format(
                    TAG,
                    format!("directory claims {children} children with {remaining} entries left"),
                ));
            }
            let mut sub = path.to_vec();
            sub.extend_from_slice(name);
            sub.push(b'/');
            walk(data, cur, children, &sub, depth + 1, out)?;
            remaining -= children + 1;
        } else {
            let file = read_file(data, cur, path, name)?;
            if !file.is_empty() {
                out.push(file);
            }
            remaining -= 1;
        }
    }
    Ok(())
}

fn read_file(
    data: &[u8],
    cur: &mut ByteCursor<'_>,
    path: &[u8],
    name: &[u8],
) -> Result<ExtractedFile> {
    let _volume = cur.read_u8()?;
    let offset = cur.read_u32be()? as usize;
    let file_type = cur.read_fourcc()?;
    let creator = cur.read_fourcc()?;
    let _created = cur.read_u32be()?;
    let _modified = cur.read_u32be()?;
    let finder_flags = cur.read_u16be()?;
    let stored_crc = cur.read_u32be()?;
    let flags = cur.read_u16be()?;
    let rsrc_len = cur.read_u32be()? as usize;
    let data_len = cur.read_u32be()? as usize;
    let rsrc_comp = cur.read_u32be()? as usize;
    let data_comp = cur.read_u32be()? as usize;

    if flags & FLAG_ENCRYPTED != 0 {
        return Err(PeelError::Encrypted(TAG));
    }

    let end = offset
        .checked_add(rsrc_comp)
        .and_then(|e| e.checked_add(data_comp))
        .filter(|&e| e <= data.len())
        .ok_or(PeelError::Truncated(TAG))?;
    // resource fork payload first, data fork directly after it
    let rsrc_src = &data[offset..offset + rsrc_comp];
    let data_src = &data[offset + rsrc_comp..end];

    let rsrc_fork = decode_fork(rsrc_src, rsrc_len, flags & FLAG_RSRC_LZH != 0)?;
    let data_fork = decode_fork(data_src, data_len, flags & FLAG_DATA_LZH != 0)?;

    let mut digest = crc::JAMCRC.digest();
    digest.update(&rsrc_fork);
    digest.update(&data_fork);
    if digest.finalize() != stored_crc {
        return Err(PeelError::Crc(TAG, "file"));
    }

    let mut full_name = path.to_vec();
    full_name.extend_from_slice(name);
    let meta = FileMeta::new(&full_name, file_type, creator, finder_flags);
    Ok(ExtractedFile {
        meta,
        data_fork,
        rsrc_fork,
    })
}

fn decode_fork(src: &[u8], out_len: usize, lzh: bool) -> Result<Vec<u8>> {
    if lzh {
        let expanded = lzh_decode(src)?;
        rle_expand(&expanded, out_len)
    } else {
        rle_expand(src, out_len)
    }
}

/// Stateful run-length layer, escape byte 0x81. `saved` is the last
/// literal, `run_left` the pending copies, and `half_escape` a phantom
/// 0x81 that re-enters escape detection without consuming input.
fn rle_expand(src: &[u8], out_len: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(out_len);
    let mut iter = src.iter().copied();
    let mut saved = 0u8;
    let mut run_left = 0usize;
    let mut half_escape = false;

    while out.len() < out_len {
        if run_left > 0 {
            out.push(saved);
            run_left -= 1;
            continue;
        }
        let b = if half_escape {
            half_escape = false;
            0x81
        } else {
            iter.next().ok_or(PeelError::Truncated(TAG))?
        };
        if b != 0x81 {
            saved = b;
            out.push(b);
            continue;
        }
        match iter.next().ok_or(PeelError::Truncated(TAG))? {
            0x82 => {
                let n = iter.next().ok_or(PeelError::Truncated(TAG))?;
                if n == 0 {
                    out.push(0x81);
                    saved = 0x82;
                    run_left = 1;
                } else {
                    run_left = usize::from(n).saturating_sub(2);
                }
            }
            0x81 => {
                out.push(0x81);
                saved = 0x81;
                half_escape = true;
            }
            other => {
                out.push(0x81);
                saved = other;
                run_left = 1;
            }
        }
    }
    Ok(out)
}

/// Demote bitstream exhaustion to a normal end-of-stream signal; anything
/// else stays fatal.
fn or_end<T>(r: Result<T>) -> Result<Option<T>> {
    match r {
        Ok(v) => Ok(Some(v)),
        Err(PeelError::Truncated(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

const LZH_WINDOW: usize = 8192;
const LZH_MASK: usize = LZH_WINDOW - 1;

/// Accounting threshold at which a block's tables are rebuilt.
const LZH_COST_LIMIT: u32 = 0x1FFF0;

fn read_lzh_table(bits: &mut MsbReader<'_>, symbols: usize) -> Result<Tree> {
    let numbytes = bits.read_bits(8)? as usize;
    let mut lengths = vec![0u8; symbols];
    for i in 0..numbytes * 2 {
        let nibble = bits.read_bits(4)? as u8;
        if i < symbols {
            lengths[i] = nibble;
        }
    }
    Tree::from_lengths(&lengths)
}

/// Block-structured LZSS with canonical Huffman tables for literals,
/// match lengths, and the upper offset bits. The 8 KiB window starts
/// zeroed; running out of bits ends the final block.
fn lzh_decode(src: &[u8]) -> Result<Vec<u8>> {
    let mut bits = MsbReader::new(src, TAG);
    let mut window = vec![0u8; LZH_WINDOW];
    let mut pos = 0usize;
    let mut out = Vec::new();

    'blocks: loop {
        if !bits.has_bits(8) {
            break;
        }
        let Some(literals) = or_end(read_lzh_table(&mut bits, 256))? else {
            break;
        };
        let Some(lengths) = or_end(read_lzh_table(&mut bits, 64))? else {
            break;
        };
        let Some(offsets) = or_end(read_lzh_table(&mut bits, 128))? else {
            break;
        };
        let data_start = bits.bit_pos();

        let mut cost = 0u32;
        while cost < LZH_COST_LIMIT {
            let Some(flag) = or_end(bits.read_bits(1))? else {
                break 'blocks;
            };
            if flag == 1 {
                let Some(sym) = or_end(literals.decode(&mut bits))? else {
                    break 'blocks;
                };
                let b = sym as u8;
                window[pos & LZH_MASK] = b;
                pos += 1;
                out.push(b);
                cost += 2;
            } else {
                let Some(len) = or_end(lengths.decode(&mut bits))? else {
                    break 'blocks;
                };
                if len == 0 {
                    return Err(PeelError::decode(TAG, "zero-length match"));
                }
                let Some(hi) = or_end(offsets.decode(&mut bits))? else {
                    break 'blocks;
                };
                let Some(lo) = or_end(bits.read_bits(6))? else {
                    break 'blocks;
                };
                let offset = ((usize::from(hi) << 6) | lo as usize) + 1;
                // byte-by-byte so an overlapping source replicates
                for _ in 0..len {
                    let b = window[pos.wrapping_sub(offset) & LZH_MASK];
                    window[pos & LZH_MASK] = b;
                    pos += 1;
                    out.push(b);
                }
                cost += 3;
            }
        }

        bits.align_byte();
        let data_bytes = (bits.bit_pos() - data_start).div_ceil(8);
        bits.skip_bytes(if data_bytes % 2 == 1 { 3 } else { 2 });
    }
    Ok(out)
}
