use crate::error::{PeelError, Result};

pub mod arsenic;
pub mod huffman;
pub mod lzw;
pub mod rle90;
pub mod sit13;

/// Fork compression methods shared by both StuffIt generations. The id is
/// the low nibble of the method byte.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Method {
    Store = 0,
    Rle90 = 1,
    Lzw = 2,
    Huffman13 = 13,
    Arsenic = 15,
}

impl Method {
    pub fn from_id(tag: &'static str, id: u8) -> Result<Method> {
        match id {
            0 => Ok(Method::Store),
            1 => Ok(Method::Rle90),
            2 => Ok(Method::Lzw),
            13 => Ok(Method::Huffman13),
            15 => Ok(Method::Arsenic),
            other => Err(PeelError::UnsupportedMethod(tag, other)),
        }
    }

    /// Arsenic carries its own integrity data; the container CRC is not
    /// consulted for it.
    pub fn self_checking(self) -> bool {
        matches!(self, Method::Arsenic)
    }
}

/// Decompress one fork payload to its declared uncompressed size.
pub fn decompress(
    tag: &'static str,
    method: Method,
    src: &[u8],
    out_len: usize,
) -> Result<Vec<u8>> {
    let out = match method {
        Method::Store => src.to_vec(),
        Method::Rle90 => rle90::decode(src)?,
        Method::Lzw => lzw::decode(src, out_len)?,
        Method::Huffman13 => sit13::decode(src, out_len)?,
        Method::Arsenic => arsenic::decode(src, out_len)?,
    };
    if out.len() != out_len {
        return Err(PeelError::decode(
            tag,
            format!(
                "decompressed size {} does not match declared size {}",
                out.len(),
                out_len
            ),
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_ids_map_to_engines() {
        assert_eq!(Method::from_id("sit", 0).unwrap(), Method::Store);
        assert_eq!(Method::from_id("sit", 13).unwrap(), Method::Huffman13);
        assert!(Method::from_id("sit", 15).unwrap().self_checking());
        let err = Method::from_id("sit5", 3).unwrap_err();
        assert_eq!(err.to_string(), "sit5: unsupported compression method 3");
    }

    #[test]
    fn store_enforces_declared_size() {
        assert_eq!(
            decompress("sit", Method::Store, b"abc", 3).unwrap(),
            b"abc"
        );
        assert!(decompress("sit", Method::Store, b"abc", 4).is_err());
    }
}
