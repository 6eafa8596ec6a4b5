use crate::domain::{ExtractedFile, FileMeta};
use crate::error::{PeelError, Result};
use crate::util::buf::ByteCursor;
use crate::util::crc;

const TAG: &str = "BinHex";

const PREAMBLE: &[u8] = b"(This file must be converted with BinHex";

/// The 64-character BinHex 4.0 alphabet, index = 6-bit value.
const ALPHABET: &[u8; 64] = b"!\"#$%&'()*+,-012345689@ABCDEFGHIJKLMNPQRSTUVXYZ[`abcdefhijklmpqr";

/// Finder flags that describe desktop state, not the file: cleared on
/// decode.
const STALE_FLAGS: u16 = (1 << 14) | (1 << 7) | (1 << 2);

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn reverse_table() -> [u8; 256] {
    let mut table = [0xFFu8; 256];
    for (v, &ch) in ALPHABET.iter().enumerate() {
        table[usize::from(ch)] = v as u8;
    }
    table
}

pub fn detect(data: &[u8]) -> bool {
    find(data, PREAMBLE).is_some()
}

/// Strip the text envelope and undo the 6-bit layer: everything between
/// the opening and closing colons, whitespace ignored.
fn unwrap_envelope(data: &[u8]) -> Result<Vec<u8>> {
    let at = find(data, PREAMBLE).ok_or_else(|| PeelError::format(TAG, "missing preamble"))?;

    let mut pos = at;
    while pos < data.len() && data[pos] != b'\r' && data[pos] != b'\n' {
        pos += 1;
    }
    let open = data[pos..]
        .iter()
        .position(|&b| b == b':')
        .ok_or(PeelError::Truncated(TAG))?
        + pos;

    let table = reverse_table();
    let mut raw = Vec::with_capacity((data.len() - open) * 3 / 4);
    let mut acc = 0u32;
    let mut nbits = 0u32;
    let mut closed = false;
    for &ch in &data[open + 1..] {
        match ch {
            b'\r' | b'\n' | b'\t' | b' ' => continue,
            b':' => {
                closed = true;
                break;
            }
            _ => {
                let v = table[usize::from(ch)];
                if v == 0xFF {
                    return Err(PeelError::format(
                        TAG,
                        format!("invalid character 0x{ch:02x} in encoded stream"),
                    ));
                }
                acc = (acc << 6) | u32::from(v);
                nbits += 6;
                if nbits >= 8 {
                    nbits -= 8;
                    raw.push((acc >> nbits) as u8);
                }
            }
        }
    }
    if !closed {
        return Err(PeelError::Truncated(TAG));
    }
    Ok(raw)
}

/// BinHex run-length layer. 0x90 marks a repeat of the previous byte;
/// `0x90 0x00` is a literal 0x90 which also becomes the repeat byte, and a
/// count of one is unrepresentable.
fn expand_rle(src: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(src.len());
    let mut prev = 0u8;
    let mut iter = src.iter().copied();
    while let Some(b) = iter.next() {
        if b != 0x90 {
            out.push(b);
            prev = b;
            continue;
        }
        match iter.next().ok_or(PeelError::Truncated(TAG))? {
            0x00 => {
                out.push(0x90);
                prev = 0x90;
            }
            0x01 => {
                return Err(PeelError::decode(TAG, "illegal run marker 0x90 0x01".to_string()));
            }
            n => {
                out.resize(out.len() + usize::from(n) - 1, prev);
            }
        }
    }
    Ok(out)
}

/// Parse the decoded container: header, data fork, resource fork, each
/// with a self-checking CRC (content followed by its stored CRC must sum
/// to zero).
fn parse_container(bytes: &[u8]) -> Result<ExtractedFile> {
    let mut cur = ByteCursor::new(bytes, TAG);

    let name_len = cur.read_u8()?;
    if !(1..=63).contains(&name_len) {
        return Err(PeelError::format(
            TAG,
            format!("invalid filename length {name_len}"),
        ));
    }
    let name = cur.read_slice(usize::from(name_len))?;
    cur.skip(1)?; // terminating nul
    let file_type = cur.read_fourcc()?;
    let creator = cur.read_fourcc()?;
    let finder_flags = cur.read_u16be()?;
    let data_len = cur.read_u32be()? as usize;
    let rsrc_len = cur.read_u32be()? as usize;
    cur.skip(2)?; // header CRC
    if crc::xmodem(&bytes[..cur.pos()]) != 0 {
        return Err(PeelError::Crc(TAG, "header"));
    }

    let data_start = cur.pos();
    let data_fork = cur.read_slice(data_len)?.to_vec();
    cur.skip(2)?;
    if crc::xmodem(&bytes[data_start..cur.pos()]) != 0 {
        return Err(PeelError::Crc(TAG, "data fork"));
    }

    let rsrc_start = cur.pos();
    let rsrc_fork = cur.read_slice(rsrc_len)?.to_vec();
    cur.skip(2)?;
    if crc::xmodem(&bytes[rsrc_start..cur.pos()]) != 0 {
        return Err(PeelError::Crc(TAG, "resource fork"));
    }

    let meta = FileMeta::new(name, file_type, creator, finder_flags & !STALE_FLAGS);
    Ok(ExtractedFile {
        meta,
        data_fork,
        rsrc_fork,
    })
}

/// Full decode: envelope, 6-bit layer, run-length layer, container.
pub fn decode_file(data: &[u8]) -> Result<ExtractedFile> {
    let raw = unwrap_envelope(data)?;
    let expanded = expand_rle(&raw)?;
    parse_container(&expanded)
}

/// Wrapper variant: the chained peel continues with the data fork.
pub fn peel_data(data: &[u8]) -> Result<Vec<u8>> {
    Ok(decode_file(data)?.data_fork)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::FourCC;

    /// Build a syntactically valid .hqx around the given container fields.
    pub(crate) fn encode_hqx(name: &[u8], file_type: &[u8; 4], data: &[u8], rsrc: &[u8]) -> Vec<u8> {
        let mut c = Vec::new();
        c.push(name.len() as u8);
        c.extend_from_slice(name);
        c.push(0);
        c.extend_from_slice(file_type);
        c.extend_from_slice(b"pMak");
        c.extend_from_slice(&0u16.to_be_bytes());
        c.extend_from_slice(&(data.len() as u32).to_be_bytes());
        c.extend_from_slice(&(rsrc.len() as u32).to_be_bytes());
        let hcrc = crc::xmodem(&c);
        c.extend_from_slice(&hcrc.to_be_bytes());
        c.extend_from_slice(data);
        c.extend_from_slice(&crc::xmodem(data).to_be_bytes());
        c.extend_from_slice(rsrc);
        c.extend_from_slice(&crc::xmodem(rsrc).to_be_bytes());
        wrap_text(&c)
    }

    /// Escape raw 0x90 bytes, apply the 6-bit layer, and wrap in the text
    /// envelope.
    pub(crate) fn wrap_text(container: &[u8]) -> Vec<u8> {
        let mut rle = Vec::new();
        for &b in container {
            rle.push(b);
            if b == 0x90 {
                rle.push(0x00);
            }
        }

        let mut text = b"(This file must be converted with BinHex 4.0)\r\n:".to_vec();
        let mut acc = 0u32;
        let mut nbits = 0u32;
        for &b in &rle {
            acc = (acc << 8) | u32::from(b);
            nbits += 8;
            while nbits >= 6 {
                nbits -= 6;
                text.push(ALPHABET[((acc >> nbits) & 0x3F) as usize]);
            }
        }
        if nbits > 0 {
            text.push(ALPHABET[((acc << (6 - nbits)) & 0x3F) as usize]);
        }
        text.push(b':');
        text
    }

    #[test]
    fn decodes_a_round_tripped_file() {
        let hqx = encode_hqx(b"Read Me", b"TEXT", b"hello from 1994\r", b"\x90\x01rsrc");
        let file = decode_file(&hqx).unwrap();
        assert_eq!(file.meta.name, b"Read Me");
        assert_eq!(file.meta.file_type, FourCC::from_bytes(*b"TEXT"));
        assert_eq!(file.data_fork, b"hello from 1994\r");
        assert_eq!(file.rsrc_fork, b"\x90\x01rsrc");
    }

    #[test]
    fn empty_forks_still_carry_zero_crcs() {
        let hqx = encode_hqx(b"empty", b"TEXT", b"", b"");
        let file = decode_file(&hqx).unwrap();
        assert!(file.data_fork.is_empty());
        assert!(file.rsrc_fork.is_empty());
    }

    #[test]
    fn missing_closing_colon_is_premature_end() {
        let mut hqx = encode_hqx(b"x", b"TEXT", b"payload", b"");
        hqx.pop();
        let err = decode_file(&hqx).unwrap_err();
        assert_eq!(err.to_string(), "BinHex: premature end of stream");
    }

    #[test]
    fn corrupt_fork_crc_is_detected() {
        // flip a data byte in the container, keeping the stored CRCs
        let mut c = Vec::new();
        let (name, data) = (b"x", b"payload");
        c.push(1u8);
        c.extend_from_slice(name);
        c.push(0);
        c.extend_from_slice(b"TEXTpMak");
        c.extend_from_slice(&0u16.to_be_bytes());
        c.extend_from_slice(&(data.len() as u32).to_be_bytes());
        c.extend_from_slice(&0u32.to_be_bytes());
        let hcrc = crc::xmodem(&c);
        c.extend_from_slice(&hcrc.to_be_bytes());
        let fork_at = c.len();
        c.extend_from_slice(data);
        c.extend_from_slice(&crc::xmodem(data).to_be_bytes());
        c.extend_from_slice(&[0, 0]); // empty resource fork CRC
        c[fork_at] ^= 0x20;
        let err = decode_file(&wrap_text(&c)).unwrap_err();
        assert_eq!(err.to_string(), "BinHex: data fork CRC mismatch");
    }

    #[test]
    fn zero_length_fork_with_nonzero_crc_is_rejected() {
        let good = encode_hqx(b"x", b"TEXT", b"d", b"");
        let file = decode_file(&good).unwrap();
        assert!(file.rsrc_fork.is_empty());

        // same container with a corrupted trailing resource CRC
        let mut c = Vec::new();
        c.push(1u8);
        c.push(b'x');
        c.push(0);
        c.extend_from_slice(b"TEXTpMak");
        c.extend_from_slice(&0u16.to_be_bytes());
        c.extend_from_slice(&1u32.to_be_bytes());
        c.extend_from_slice(&0u32.to_be_bytes());
        let hcrc = crc::xmodem(&c);
        c.extend_from_slice(&hcrc.to_be_bytes());
        c.push(b'd');
        c.extend_from_slice(&crc::xmodem(b"d").to_be_bytes());
        c.extend_from_slice(&[0xBE, 0xEF]);
        let err = decode_file(&wrap_text(&c)).unwrap_err();
        assert_eq!(err.to_string(), "BinHex: resource fork CRC mismatch");
    }

    #[test]
    fn bad_filename_length_is_rejected() {
        let mut c = vec![0u8]; // length 0 is outside 1..=63
        c.extend_from_slice(&[0; 21]);
        let err = parse_container(&c).unwrap_err();
        assert_eq!(err.to_string(), "BinHex: invalid filename length 0");
    }

    #[test]
    fn rle_count_one_is_illegal() {
        let err = expand_rle(&[0x41, 0x90, 0x01]).unwrap_err();
        assert!(err.to_string().contains("0x90 0x01"));
    }

    #[test]
    fn rle_escaped_literal_becomes_repeat_byte() {
        // 0x90 0x00 then 0x90 0x04: three more copies of 0x90
        assert_eq!(
            expand_rle(&[0x90, 0x00, 0x90, 0x04]).unwrap(),
            [0x90, 0x90, 0x90, 0x90]
        );
        assert_eq!(expand_rle(&[0x41, 0x90, 0x03]).unwrap(), [0x41, 0x41, 0x41]);
    }

    #[test]
    fn unknown_character_in_stream_is_fatal() {
        let mut hqx = encode_hqx(b"x", b"TEXT", b"d", b"");
        let colon = hqx.iter().position(|&b| b == b':').unwrap();
        hqx[colon + 2] = b'~'; // not in the alphabet, not whitespace
        assert!(matches!(
            decode_file(&hqx).unwrap_err(),
            PeelError::Format(..)
        ));
    }
}
