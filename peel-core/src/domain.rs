use core::fmt::{self, Display, Formatter};

/// Longest filename a classic Mac catalog entry can carry. Longer names are
/// truncated, never rejected.
pub const MAX_NAME_LEN: usize = 255;

/// A four-character code: a 32-bit number holding 4 ASCII bytes, used for
/// file type and creator codes. Eg. 'TEXT' 'SIT!' 'APPL'.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct FourCC(pub u32);

impl FourCC {
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        FourCC(u32::from_be_bytes(bytes))
    }
}

impl Display for FourCC {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let bytes = self.0.to_be_bytes();
        if bytes.iter().all(|c| c.is_ascii() && !c.is_ascii_control()) {
            // unwrap safe due to above check
            core::str::from_utf8(&bytes).unwrap().fmt(f)
        } else {
            write!(f, "0x{:08x}", self.0)
        }
    }
}

/// Finder metadata attached to an extracted file. Fields a format cannot
/// provide are zero. The name is opaque bytes; classic Mac filenames carry
/// no mandated encoding.
#[derive(Debug, Default, Clone)]
pub struct FileMeta {
    pub name: Vec<u8>,
    pub file_type: FourCC,
    pub creator: FourCC,
    pub finder_flags: u16,
}

impl FileMeta {
    pub fn new(name: &[u8], file_type: FourCC, creator: FourCC, finder_flags: u16) -> Self {
        let name = name[..name.len().min(MAX_NAME_LEN)].to_vec();
        FileMeta {
            name,
            file_type,
            creator,
            finder_flags,
        }
    }

    /// Lossy UTF-8 rendering for logs and path construction.
    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

/// One file recovered from an archive: metadata plus both forks. Empty
/// forks are zero-length buffers, not absent.
#[derive(Debug, Default, Clone)]
pub struct ExtractedFile {
    pub meta: FileMeta,
    pub data_fork: Vec<u8>,
    pub rsrc_fork: Vec<u8>,
}

impl ExtractedFile {
    /// Files with two empty forks never appear in a result list.
    pub fn is_empty(&self) -> bool {
        self.data_fork.is_empty() && self.rsrc_fork.is_empty()
    }
}
