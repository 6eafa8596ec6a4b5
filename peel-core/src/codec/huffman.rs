use crate::error::{PeelError, Result};
use crate::util::bits::BitSource;

pub const MAX_CODE_LEN: u8 = 15;

/// Upper bound on tree nodes. Any well-formed code table in these formats
/// fits comfortably; running out means the table is malformed.
const POOL_LIMIT: usize = 2048;

const VACANT: i32 = -1;

fn leaf(symbol: u16) -> i32 {
    -(i32::from(symbol)) - 2
}

/// Binary decode tree over a pool of index nodes: children are indices into
/// the pool, `VACANT` marks absence, negative values below `VACANT` are
/// leaves. Decoding walks one bit at a time, so the same tree serves both
/// MSB-first and LSB-first bitstreams.
pub struct Tree {
    nodes: Vec<[i32; 2]>,
    single: Option<u16>,
}

impl Tree {
    pub fn new() -> Self {
        Tree {
            nodes: vec![[VACANT; 2]],
            single: None,
        }
    }

    /// Place one codeword, MSB-first. Used directly for the non-canonical
    /// meta-code tables whose (codeword, length) pairs are normative.
    pub fn insert(&mut self, code: u32, len: u8, symbol: u16) -> Result<()> {
        if len == 0 || len > MAX_CODE_LEN || code >= (1u32 << len) {
            return Err(PeelError::decode(
                "huffman",
                format!("bad codeword {code:#x} of length {len}"),
            ));
        }
        let mut node = 0usize;
        for i in (0..len).rev() {
            let bit = ((code >> i) & 1) as usize;
            let next = self.nodes[node][bit];
            if i == 0 {
                if next != VACANT {
                    return Err(PeelError::decode("huffman", "over-subscribed code table"));
                }
                self.nodes[node][bit] = leaf(symbol);
            } else if next == VACANT {
                if self.nodes.len() >= POOL_LIMIT {
                    return Err(PeelError::decode("huffman", "node pool exhausted"));
                }
                self.nodes.push([VACANT; 2]);
                let idx = (self.nodes.len() - 1) as i32;
                self.nodes[node][bit] = idx;
                node = idx as usize;
            } else if next < VACANT {
                return Err(PeelError::decode("huffman", "over-subscribed code table"));
            } else {
                node = next as usize;
            }
        }
        Ok(())
    }

    /// Canonical construction: codewords of a given length are consecutive,
    /// assigned in symbol order, shorter lengths first. Zero lengths mark
    /// absent symbols. A table with a single live symbol produces a tree
    /// that decodes it without consuming bits.
    pub fn from_lengths(lengths: &[u8]) -> Result<Tree> {
        let mut tree = Tree::new();
        let mut live = lengths.iter().enumerate().filter(|&(_, &l)| l != 0);
        if let Some((sym, _)) = live.next()
            && live.next().is_none()
        {
            tree.single = Some(sym as u16);
            return Ok(tree);
        }

        let mut code = 0u32;
        for len in 1..=MAX_CODE_LEN {
            for (sym, &l) in lengths.iter().enumerate() {
                if l == len {
                    tree.insert(code, len, sym as u16)?;
                    code += 1;
                }
            }
            code <<= 1;
        }
        Ok(tree)
    }

    pub fn decode<B: BitSource>(&self, bits: &mut B) -> Result<u16> {
        if let Some(s) = self.single {
            return Ok(s);
        }
        let mut node = 0usize;
        loop {
            let bit = bits.read_bit()? as usize;
            match self.nodes[node][bit] {
                VACANT => return Err(PeelError::decode("huffman", "invalid code in stream")),
                v if v < VACANT => return Ok((-v - 2) as u16),
                v => node = v as usize,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::bits::MsbReader;

    #[test]
    fn canonical_build_and_decode() {
        // lengths: a=1, b=2, c=3, d=3  ->  a=0, b=10, c=110, d=111
        let tree = Tree::from_lengths(&[1, 2, 3, 3]).unwrap();
        // 0 10 110 111 -> 0101_1011 1...
        let mut bits = MsbReader::new(&[0b0101_1011, 0b1000_0000], "test");
        assert_eq!(tree.decode(&mut bits).unwrap(), 0);
        assert_eq!(tree.decode(&mut bits).unwrap(), 1);
        assert_eq!(tree.decode(&mut bits).unwrap(), 2);
        assert_eq!(tree.decode(&mut bits).unwrap(), 3);
    }

    #[test]
    fn single_symbol_consumes_no_bits() {
        let tree = Tree::from_lengths(&[0, 0, 4, 0]).unwrap();
        let mut bits = MsbReader::new(&[], "test");
        assert_eq!(tree.decode(&mut bits).unwrap(), 2);
        assert_eq!(tree.decode(&mut bits).unwrap(), 2);
    }

    #[test]
    fn over_subscribed_table_is_rejected() {
        // three one-bit codes cannot coexist
        assert!(Tree::from_lengths(&[1, 1, 1]).is_err());
    }

    #[test]
    fn direct_insertion_keeps_given_codewords() {
        // deliberately non-canonical assignment
        let mut tree = Tree::new();
        tree.insert(0b11, 2, 7).unwrap();
        tree.insert(0b0, 1, 9).unwrap();
        tree.insert(0b10, 2, 3).unwrap();
        let mut bits = MsbReader::new(&[0b1101_0000], "test");
        assert_eq!(tree.decode(&mut bits).unwrap(), 7);
        assert_eq!(tree.decode(&mut bits).unwrap(), 9);
        assert_eq!(tree.decode(&mut bits).unwrap(), 3);
    }

    #[test]
    fn incomplete_code_fails_at_decode() {
        let tree = Tree::from_lengths(&[2, 2]).unwrap(); // 00, 01; 1x vacant
        let mut bits = MsbReader::new(&[0b1000_0000], "test");
        assert!(tree.decode(&mut bits).is_err());
    }
}
