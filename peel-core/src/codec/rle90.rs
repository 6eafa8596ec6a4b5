use crate::error::{PeelError, Result};

/// StuffIt run-length coding, compression method 1. 0x90 escapes a repeat
/// count for the previous literal; `0x90 0x00` is a literal 0x90 and leaves
/// the repeat byte untouched, so a run can still extend the literal that
/// preceded the escape.
pub fn decode(src: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(src.len());
    let mut last = 0u8;
    let mut iter = src.iter().copied();
    while let Some(b) = iter.next() {
        if b != 0x90 {
            out.push(b);
            last = b;
            continue;
        }
        match iter.next().ok_or(PeelError::Truncated("rle90"))? {
            0 => out.push(0x90),
            1 => {}
            n => {
                let n = usize::from(n) - 1;
                out.resize(out.len() + n, last);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_escape_keeps_repeat_byte() {
        assert_eq!(decode(&[0x90, 0x00]).unwrap(), [0x90]);
        // the run after the escaped 0x90 still repeats 0x42, not 0x90
        assert_eq!(
            decode(&[0x41, 0x42, 0x42, 0x90, 0x05, 0x90, 0x00, 0x43]).unwrap(),
            [0x41, 0x42, 0x42, 0x42, 0x42, 0x42, 0x42, 0x90, 0x43]
        );
    }

    #[test]
    fn count_one_emits_nothing() {
        assert_eq!(decode(&[0x41, 0x90, 0x01, 0x42]).unwrap(), [0x41, 0x42]);
    }

    #[test]
    fn dangling_escape_is_truncation() {
        let err = decode(&[0x41, 0x90]).unwrap_err();
        assert_eq!(err.to_string(), "rle90: premature end of stream");
    }
}
