use crate::error::{PeelError, Result};
use crate::util::bits::LsbReader;

const DICT_SIZE: usize = 16384;
const CLEAR: usize = 256;
const FIRST_FREE: usize = 257;
const MAX_WIDTH: u32 = 14;

/// StuffIt LZW, compression method 2. Little-endian bit packing, 9 to 14
/// bit codes, block-mode clear: codes travel in blocks of eight, and a
/// clear code discards the rest of its block before the width resets.
pub fn decode(src: &[u8], out_len: usize) -> Result<Vec<u8>> {
    let mut bits = LsbReader::new(src, "lzw");
    let mut out = Vec::with_capacity(out_len);

    // dictionary as parallel arrays: chain parent, final byte, first byte,
    // chain length
    let mut parent = vec![0u16; DICT_SIZE];
    let mut suffix = vec![0u8; DICT_SIZE];
    let mut head = vec![0u8; DICT_SIZE];
    let mut length = vec![0u16; DICT_SIZE];
    for c in 0..CLEAR {
        suffix[c] = c as u8;
        head[c] = c as u8;
        length[c] = 1;
    }

    let mut next_free = FIRST_FREE;
    let mut width = 9u32;
    let mut block_count = 0u32;
    let mut prev: Option<usize> = None;
    let mut staging: Vec<u8> = Vec::new();

    while out.len() < out_len {
        let code = bits.read_bits(width)? as usize;
        block_count += 1;

        if code == CLEAR {
            let skip = (8 - block_count % 8) % 8;
            bits.skip_bits(skip as usize * width as usize)?;
            next_free = FIRST_FREE;
            width = 9;
            block_count = 0;
            prev = None;
            continue;
        }

        staging.clear();
        if code < CLEAR {
            staging.push(code as u8);
        } else if code < next_free {
            let n = usize::from(length[code]);
            staging.resize(n, 0);
            let mut c = code;
            for i in (0..n).rev() {
                staging[i] = suffix[c];
                c = usize::from(parent[c]);
            }
        } else if code == next_free
            && next_free < DICT_SIZE
            && let Some(p) = prev
        {
            // KwKwK: the previous expansion followed by its own first byte
            let n = usize::from(length[p]) + 1;
            staging.resize(n, 0);
            staging[n - 1] = head[p];
            let mut c = p;
            for i in (0..n - 1).rev() {
                staging[i] = suffix[c];
                c = usize::from(parent[c]);
            }
        } else {
            return Err(PeelError::decode(
                "lzw",
                format!("code {code} references a nonexistent dictionary entry"),
            ));
        }

        if let Some(p) = prev
            && next_free < DICT_SIZE
        {
            parent[next_free] = p as u16;
            suffix[next_free] = staging[0];
            head[next_free] = head[p];
            length[next_free] = length[p] + 1;
            next_free += 1;
            if next_free >= (1 << width) && width < MAX_WIDTH {
                width += 1;
            }
        }
        prev = Some(code);

        for &b in &staging {
            if out.len() == out_len {
                break;
            }
            out.push(b);
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BitWriter {
        bytes: Vec<u8>,
        bit: usize,
    }

    impl BitWriter {
        fn new() -> Self {
            BitWriter {
                bytes: Vec::new(),
                bit: 0,
            }
        }

        /// Append a value low bit first, matching the decoder's packing.
        fn put(&mut self, value: u32, n: u32) {
            for i in 0..n {
                if self.bit % 8 == 0 {
                    self.bytes.push(0);
                }
                if (value >> i) & 1 == 1 {
                    let last = self.bytes.len() - 1;
                    self.bytes[last] |= 1 << (self.bit % 8);
                }
                self.bit += 1;
            }
        }
    }

    #[test]
    fn kwkwk_decodes_ababab() {
        // codes for "ABABABA": A, B, AB, then the KwKwK case where code
        // 259 is decoded before the slot exists
        let mut w = BitWriter::new();
        for code in [65u32, 66, 257, 259] {
            w.put(code, 9);
        }
        assert_eq!(decode(&w.bytes, 7).unwrap(), b"ABABABA");
    }

    #[test]
    fn clear_skips_rest_of_code_block() {
        let mut w = BitWriter::new();
        w.put(65, 9);
        w.put(256, 9); // clear as 2nd code: 6 codes of the block remain
        for _ in 0..6 {
            w.put(0x1FF, 9); // garbage that must never be interpreted
        }
        w.put(66, 9);
        assert_eq!(decode(&w.bytes, 2).unwrap(), b"AB");
    }

    #[test]
    fn forward_reference_is_rejected() {
        let mut w = BitWriter::new();
        w.put(65, 9);
        w.put(300, 9);
        let err = decode(&w.bytes, 8).unwrap_err();
        assert!(err.to_string().contains("nonexistent dictionary entry"));
    }

    #[test]
    fn first_code_must_be_a_literal() {
        let mut w = BitWriter::new();
        w.put(257, 9);
        assert!(decode(&w.bytes, 1).is_err());
    }
}
