use crate::codec::huffman::Tree;
use crate::error::{PeelError, Result};
use crate::util::bits::LsbReader;

const TAG: &str = "sit13";

const WINDOW_SIZE: usize = 1 << 16;
const WINDOW_MASK: usize = WINDOW_SIZE - 1;

/// Literal/length alphabet: 256 literals, 62 direct lengths, two extra-bit
/// length escapes, one forbidden terminator.
const LIT_SYMBOLS: usize = 321;

/// The meta-code used to serialize dynamic tables. These (codeword, length)
/// pairs are inserted verbatim, MSB-first; the assignment is deliberately
/// not canonical, so rebuilding it from lengths alone gives a wrong tree.
#[rustfmt::skip]
const META_CODE: [(u16, u8); 37] = [
    (0b01111, 5), (0b10001, 5), (0b01110, 5), (0b100100, 6), (0b100101, 6),
    (0b100110, 6), (0b100111, 6), (0b101000, 6), (0b101001, 6), (0b101010, 6),
    (0b101011, 6), (0b101100, 6), (0b101101, 6), (0b101110, 6), (0b101111, 6),
    (0b110000, 6), (0b110001, 6), (0b110010, 6), (0b110011, 6), (0b110100, 6),
    (0b110101, 6), (0b110110, 6), (0b110111, 6), (0b111000, 6), (0b111001, 6),
    (0b111010, 6), (0b111011, 6), (0b111100, 6), (0b111101, 6), (0b111110, 6),
    (0b111111, 6), (0b001, 3),   (0b000, 3),   (0b0101, 4),  (0b0110, 4),
    (0b0100, 4),  (0b10000, 5),
];

fn meta_tree() -> Result<Tree> {
    let mut tree = Tree::new();
    for (sym, &(code, len)) in META_CODE.iter().enumerate() {
        tree.insert(u32::from(code), len, sym as u16)?;
    }
    Ok(tree)
}

/// Complete two-level length table: the first `2^(b+1) - n` symbols
/// (starting at `offset`, wrapping) take the shorter code.
fn stock_lengths(n: usize, offset: usize) -> Vec<u8> {
    let base = (usize::BITS - 1 - n.leading_zeros()) as u8;
    let short = (1usize << (base + 1)) - n;
    let mut v = vec![base + 1; n];
    for i in 0..short {
        v[(offset + i) % n] = base;
    }
    v
}

fn predefined_set(set: u8) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
    match set {
        1 => (
            stock_lengths(LIT_SYMBOLS, 0),
            stock_lengths(LIT_SYMBOLS, 64),
            stock_lengths(11, 0),
        ),
        2 => (
            stock_lengths(LIT_SYMBOLS, 64),
            stock_lengths(LIT_SYMBOLS, 128),
            stock_lengths(13, 0),
        ),
        3 => (
            stock_lengths(LIT_SYMBOLS, 128),
            stock_lengths(LIT_SYMBOLS, 192),
            stock_lengths(14, 0),
        ),
        4 => (
            stock_lengths(LIT_SYMBOLS, 192),
            stock_lengths(LIT_SYMBOLS, 0),
            stock_lengths(11, 4),
        ),
        _ => (
            stock_lengths(LIT_SYMBOLS, 256),
            stock_lengths(LIT_SYMBOLS, 32),
            stock_lengths(13, 4),
        ),
    }
}

/// Decode one dynamic length table: a command stream over the meta-code
/// edits a running length value and emits it one or more times per command.
fn read_lengths(bits: &mut LsbReader<'_>, meta: &Tree, n: usize) -> Result<Vec<u8>> {
    let mut lengths: Vec<u8> = Vec::with_capacity(n);
    let mut current: i32 = 0;

    let push = |lengths: &mut Vec<u8>, current: i32| -> Result<()> {
        if !(0..=15).contains(&current) {
            return Err(PeelError::decode(
                TAG,
                format!("code length {current} out of range"),
            ));
        }
        if lengths.len() >= n {
            return Err(PeelError::decode(TAG, "length table overflow".to_string()));
        }
        lengths.push(current as u8);
        Ok(())
    };

    while lengths.len() < n {
        let cmd = meta.decode(bits)?;
        match cmd {
            0..=30 => current = i32::from(cmd) + 1,
            31 => current = 0,
            32 => current += 1,
            33 => current -= 1,
            34 => {
                if bits.read_bits(1)? == 1 {
                    push(&mut lengths, current)?;
                }
            }
            35 => {
                let extra = bits.read_bits(3)? + 2;
                for _ in 0..extra {
                    push(&mut lengths, current)?;
                }
            }
            36 => {
                let extra = bits.read_bits(6)? + 10;
                for _ in 0..extra {
                    push(&mut lengths, current)?;
                }
            }
            _ => unreachable!("meta-code has 37 symbols"),
        }
        push(&mut lengths, current)?;
    }
    Ok(lengths)
}

/// StuffIt compression method 13: LZSS over a 64 KiB zero-initialized
/// window with two alternating literal/length trees. The bitstream is
/// LSB-first; Huffman codes are walked a bit at a time.
pub fn decode(src: &[u8], out_len: usize) -> Result<Vec<u8>> {
    let mut bits = LsbReader::new(src, TAG);

    let header = bits.read_bits(8)? as u8;
    let set = header >> 4;
    let aliased = (header >> 3) & 1 == 1;
    let dist_extra = header & 7;

    let (lit1, lit2, dist) = if set == 0 {
        let meta = meta_tree()?;
        let lit1 = read_lengths(&mut bits, &meta, LIT_SYMBOLS)?;
        let lit2 = if aliased {
            lit1.clone()
        } else {
            read_lengths(&mut bits, &meta, LIT_SYMBOLS)?
        };
        let dist = read_lengths(&mut bits, &meta, usize::from(dist_extra) + 10)?;
        (lit1, lit2, dist)
    } else if set <= 5 {
        predefined_set(set)
    } else {
        return Err(PeelError::decode(TAG, format!("invalid code set {set}")));
    };

    let tree1 = Tree::from_lengths(&lit1)?;
    let tree2 = Tree::from_lengths(&lit2)?;
    let dist_tree = Tree::from_lengths(&dist)?;

    let mut window = vec![0u8; WINDOW_SIZE];
    let mut pos = 0usize;
    let mut out = Vec::with_capacity(out_len);
    let mut second = false;

    while out.len() < out_len {
        let tree = if second { &tree2 } else { &tree1 };
        let sym = tree.decode(&mut bits)?;

        if sym < 256 {
            let b = sym as u8;
            window[pos & WINDOW_MASK] = b;
            pos += 1;
            out.push(b);
            second = false;
            continue;
        }

        let len = match sym {
            256..=317 => u32::from(sym) - 253,
            318 => bits.read_bits(10)? + 65,
            319 => bits.read_bits(15)? + 65,
            _ => return Err(PeelError::decode(TAG, "invalid symbol 320".to_string())),
        };

        let dsym = dist_tree.decode(&mut bits)?;
        let distance = if dsym == 0 {
            1
        } else {
            let extra = bits.read_bits(u32::from(dsym) - 1)?;
            (1usize << (dsym - 1)) + extra as usize + 1
        };

        // streamed byte-by-byte so overlapping matches replicate
        for _ in 0..len {
            if out.len() == out_len {
                break;
            }
            let b = window[pos.wrapping_sub(distance) & WINDOW_MASK];
            window[pos & WINDOW_MASK] = b;
            pos += 1;
            out.push(b);
        }
        second = true;
    }

    Ok(out)
}
